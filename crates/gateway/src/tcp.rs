//! TCP-Signaling-Server
//!
//! Nimmt Signaling-Verbindungen an und startet pro Verbindung eine
//! Bedien-Task. Das Wire-Format (Laenge + JSON) liegt in
//! `trunkline_protocol::wire`.

use std::sync::Arc;
use tokio::net::TcpListener;
use trunkline_core::Result;
use trunkline_protocol::wire::DEFAULT_MAX_FRAME_SIZE;

use crate::connection;
use crate::dispatcher::GatewayDispatcher;

/// Der Signaling-Server des Gateways
pub struct GatewayServer {
    dispatcher: Arc<GatewayDispatcher>,
    max_frame_size: usize,
}

impl GatewayServer {
    /// Erstellt einen Server mit Standard-Frame-Limit
    pub fn neu(dispatcher: Arc<GatewayDispatcher>) -> Arc<Self> {
        Self::mit_frame_limit(dispatcher, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Erstellt einen Server mit benutzerdefiniertem Frame-Limit
    pub fn mit_frame_limit(dispatcher: Arc<GatewayDispatcher>, max_frame_size: usize) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            max_frame_size,
        })
    }

    pub fn dispatcher(&self) -> &Arc<GatewayDispatcher> {
        &self.dispatcher
    }

    /// Bindet die Adresse und bedient Verbindungen bis zum Abbruch
    pub async fn starten(self: &Arc<Self>, adresse: &str) -> Result<()> {
        let listener = TcpListener::bind(adresse).await?;
        tracing::info!(adresse = %adresse, "Signaling-Server lauscht");
        Arc::clone(self).bedienen(listener).await;
        Ok(())
    }

    /// Bedient Verbindungen auf einem bereits gebundenen Listener
    pub async fn bedienen(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, von)) => {
                    tracing::debug!(von = %von, "Neue Signaling-Verbindung");
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let max_frame_size = self.max_frame_size;
                    tokio::spawn(async move {
                        connection::bedienen(dispatcher, stream, max_frame_size).await;
                    });
                }
                Err(fehler) => {
                    tracing::warn!(fehler = %fehler, "Accept fehlgeschlagen");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::time::timeout;
    use trunkline_core::SessionId;
    use trunkline_endpoint::{LoopbackEndpointFactory, LoopbackPeerFactory};
    use trunkline_protocol::signal::BridgeRef;
    use trunkline_protocol::wire::{read_frame, write_frame};
    use trunkline_protocol::{SignalEnvelope, SignalPayload};

    async fn server_starten() -> (Arc<GatewayServer>, std::net::SocketAddr) {
        let dispatcher = GatewayDispatcher::neu(
            LoopbackPeerFactory::neu(),
            LoopbackEndpointFactory::neu("trunk.local"),
        );
        let server = GatewayServer::neu(dispatcher);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let adresse = listener.local_addr().unwrap();
        tokio::spawn(Arc::clone(&server).bedienen(listener));
        (server, adresse)
    }

    async fn lesen(stream: &mut TcpStream) -> SignalEnvelope {
        timeout(
            Duration::from_secs(2),
            read_frame(stream, DEFAULT_MAX_FRAME_SIZE),
        )
        .await
        .expect("Frame erwartet")
        .unwrap()
    }

    async fn senden(stream: &mut TcpStream, nachricht: &SignalEnvelope) {
        write_frame(stream, nachricht, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();
    }

    async fn verbinden(adresse: std::net::SocketAddr) -> (TcpStream, SessionId) {
        let mut stream = TcpStream::connect(adresse).await.unwrap();
        let bereit = lesen(&mut stream).await;
        let session_id = match bereit.payload {
            SignalPayload::SessionReady(data) => data.session_id,
            andere => panic!("Erwartet session-ready, war {andere:?}"),
        };
        (stream, session_id)
    }

    #[tokio::test]
    async fn client_erhaelt_session_ready() {
        let (server, adresse) = server_starten().await;
        let (_stream, _sid) = verbinden(adresse).await;
        assert_eq!(server.dispatcher().registry().anzahl(), 1);
    }

    #[tokio::test]
    async fn brueckenaufbau_ueber_tcp() {
        let (_server, adresse) = server_starten().await;
        let (mut a, _sid_a) = verbinden(adresse).await;
        let (mut b, sid_b) = verbinden(adresse).await;

        senden(
            &mut a,
            &SignalEnvelope::neu(SignalPayload::MakeCall(sid_b.inner().to_string())),
        )
        .await;

        let einladung_a = lesen(&mut a).await;
        let bridge_id = match einladung_a.payload {
            SignalPayload::BridgeCall(data) => {
                assert!(data.is_initiator);
                data.bridge_id
            }
            andere => panic!("Erwartet bridge-call, war {andere:?}"),
        };
        let einladung_b = lesen(&mut b).await;
        assert!(matches!(einladung_b.payload, SignalPayload::BridgeCall(_)));

        let zustimmung =
            SignalEnvelope::neu(SignalPayload::AcceptBridgeCall(BridgeRef { bridge_id }));
        senden(&mut a, &zustimmung).await;
        // Erst zustimmen wenn die Zustimmung von A verbucht ist
        let an_b = lesen(&mut b).await;
        assert!(matches!(an_b.payload, SignalPayload::BridgeAccepted(_)));
        senden(&mut b, &zustimmung).await;

        // B: establishing, sip-call-established, established
        let mut letzte = None;
        for _ in 0..3 {
            letzte = Some(lesen(&mut b).await.payload);
        }
        assert!(matches!(letzte, Some(SignalPayload::BridgeEstablished(_))));
    }

    #[tokio::test]
    async fn trennung_informiert_die_gegenseite() {
        let (_server, adresse) = server_starten().await;
        let (mut a, _sid_a) = verbinden(adresse).await;
        let (b, sid_b) = verbinden(adresse).await;

        senden(
            &mut a,
            &SignalEnvelope::neu(SignalPayload::MakeCall(sid_b.inner().to_string())),
        )
        .await;
        let einladung = lesen(&mut a).await;
        assert!(matches!(einladung.payload, SignalPayload::BridgeCall(_)));

        // B trennt waehrend der Verhandlung
        drop(b);

        let meldung = lesen(&mut a).await;
        if let SignalPayload::BridgeFailed(data) = meldung.payload {
            assert_eq!(data.reason, "peer-disconnected");
        } else {
            panic!("Erwartet bridge-failed, war {:?}", meldung.payload);
        }
    }

    #[tokio::test]
    async fn anruf_zu_unbekanntem_ziel_ueber_tcp() {
        let (_server, adresse) = server_starten().await;
        let (mut a, _sid) = verbinden(adresse).await;

        senden(
            &mut a,
            &SignalEnvelope::neu(SignalPayload::MakeCall(SessionId::new().inner().to_string())),
        )
        .await;
        let antwort = lesen(&mut a).await;
        if let SignalPayload::CallFailed(data) = antwort.payload {
            assert_eq!(data.reason, "unknown destination");
        } else {
            panic!("Erwartet call-failed");
        }
    }
}
