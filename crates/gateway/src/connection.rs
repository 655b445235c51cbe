//! Client-Verbindung – eine Signaling-Verbindung bedienen
//!
//! Pro Verbindung laeuft eine Lese-Schleife (Frames dekodieren, an den
//! Dispatcher reichen) und eine Schreib-Task (Sendewarteschlange der
//! Session auf den Socket). Die Session lebt genau so lange wie die
//! Verbindung; beim Trennen raeumt der Dispatcher alles auf.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use trunkline_protocol::SignalCodec;
use trunkline_session::MpscSignalChannel;

use crate::dispatcher::GatewayDispatcher;

/// Bedient eine Signaling-Verbindung bis zum Trennen
pub async fn bedienen(
    dispatcher: Arc<GatewayDispatcher>,
    stream: TcpStream,
    max_frame_size: usize,
) {
    let framed = Framed::new(stream, SignalCodec::with_max_size(max_frame_size));
    let (mut schreiber, mut leser) = framed.split();

    let (kanal, mut ausgang) = MpscSignalChannel::neu();
    let session = dispatcher.verbindung_geoeffnet(kanal).await;
    let session_id = session.id();

    let schreib_task = tokio::spawn(async move {
        while let Some(nachricht) = ausgang.recv().await {
            if let Err(fehler) = schreiber.send(nachricht).await {
                tracing::debug!(session = %session_id, fehler = %fehler, "Schreiben fehlgeschlagen");
                break;
            }
        }
    });

    while let Some(ergebnis) = leser.next().await {
        match ergebnis {
            Ok(nachricht) => {
                if let Err(fehler) = dispatcher
                    .nachricht_verarbeiten(session_id, nachricht)
                    .await
                {
                    tracing::warn!(session = %session_id, fehler = %fehler, "Nachricht nicht verarbeitet");
                }
            }
            Err(fehler) => {
                tracing::warn!(session = %session_id, fehler = %fehler, "Lesefehler, Verbindung wird getrennt");
                break;
            }
        }
    }

    dispatcher.verbindung_geschlossen(session_id).await;
    schreib_task.abort();
}
