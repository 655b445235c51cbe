//! Anruf-Bruecke – eine befoerderte Verhandlung mit laufenden Medien
//!
//! Jede Partei hat ihr eigenes Leg-Paar: ihr Realtime Peer ist mit ihrem
//! Telefonie-Leg verdrahtet, der platzierte Telefonie-Anruf verbindet die
//! beiden Legs im Netz. Pakete kreuzen nie die Parteien innerhalb des
//! Gateways.
//!
//! Der Abbau ist idempotent: der erste Aufrufer beansprucht das
//! Aufgelegt-Flag und schliesst die Relay-Tore noch vor dem ersten await,
//! danach kann kein Paket mehr fliessen.

use parking_lot::Mutex;
use std::sync::Arc;
use trunkline_core::{BridgeId, LinkId, SessionId};
use trunkline_endpoint::{RealtimePeer, TelephonyEndpoint};
use trunkline_relay::RelayFabric;

/// Die Medien-Seite einer Partei
pub struct PartyLeg {
    pub session_id: SessionId,
    pub peer: Arc<dyn RealtimePeer>,
    pub endpoint: Arc<dyn TelephonyEndpoint>,
}

#[derive(Debug)]
struct BridgeZustand {
    /// Der Telefonie-Anruf zwischen den Legs steht
    telefonie_steht: bool,
    /// Die Relay-Links sind aktiv (impliziert telefonie_steht)
    relay_aktiv: bool,
    /// Der Abbau wurde beansprucht
    aufgelegt: bool,
}

/// Eine laufende Anruf-Bruecke zwischen zwei Sessions
pub struct CallBridge {
    bridge_id: BridgeId,
    initiator: PartyLeg,
    responder: PartyLeg,
    links: Vec<LinkId>,
    zustand: Mutex<BridgeZustand>,
}

impl CallBridge {
    /// Erstellt eine laufende Bruecke
    ///
    /// Wird erst gerufen wenn der Telefonie-Anruf platziert und alle
    /// Links installiert und aktiviert sind.
    pub fn neu(
        bridge_id: BridgeId,
        initiator: PartyLeg,
        responder: PartyLeg,
        links: Vec<LinkId>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bridge_id,
            initiator,
            responder,
            links,
            zustand: Mutex::new(BridgeZustand {
                telefonie_steht: true,
                relay_aktiv: true,
                aufgelegt: false,
            }),
        })
    }

    pub fn bridge_id(&self) -> BridgeId {
        self.bridge_id
    }

    pub fn initiator(&self) -> &PartyLeg {
        &self.initiator
    }

    pub fn responder(&self) -> &PartyLeg {
        &self.responder
    }

    /// Gibt true zurueck wenn die Session Partei dieser Bruecke ist
    pub fn ist_partei(&self, session_id: SessionId) -> bool {
        session_id == self.initiator.session_id || session_id == self.responder.session_id
    }

    /// Die Gegenseite der gegebenen Partei
    pub fn gegenseite(&self, session_id: SessionId) -> Option<SessionId> {
        if session_id == self.initiator.session_id {
            Some(self.responder.session_id)
        } else if session_id == self.responder.session_id {
            Some(self.initiator.session_id)
        } else {
            None
        }
    }

    /// Gibt true zurueck solange die Relay-Links aktiv sind
    pub fn relay_aktiv(&self) -> bool {
        self.zustand.lock().relay_aktiv
    }

    /// Gibt true zurueck solange der Telefonie-Anruf steht
    pub fn telefonie_steht(&self) -> bool {
        self.zustand.lock().telefonie_steht
    }

    /// Baut die Bruecke ab
    ///
    /// Gibt `false` zurueck wenn der Abbau bereits lief (zweiter Aufrufer).
    /// Die Relay-Tore werden synchron vor dem ersten await geschlossen;
    /// Fehler beim Auflegen werden geloggt, nie weitergereicht.
    pub async fn abbauen(&self, fabric: &RelayFabric) -> bool {
        {
            let mut zustand = self.zustand.lock();
            if zustand.aufgelegt {
                return false;
            }
            zustand.aufgelegt = true;
            zustand.relay_aktiv = false;
            zustand.telefonie_steht = false;
        }

        // Tore zu bevor irgendetwas awaited wird
        for link in &self.links {
            if let Err(e) = fabric.deaktivieren(*link) {
                tracing::debug!(bruecke = %self.bridge_id, link = %link, fehler = %e, "Link bereits weg");
            }
        }
        fabric.alle_entfernen(&self.links);

        for partei in [&self.initiator, &self.responder] {
            if let Err(e) = partei.endpoint.auflegen().await {
                tracing::warn!(
                    bruecke = %self.bridge_id,
                    session = %partei.session_id,
                    fehler = %e,
                    "Auflegen fehlgeschlagen, Abbau laeuft weiter"
                );
            }
            partei.peer.schliessen();
        }

        tracing::info!(bruecke = %self.bridge_id, "Bruecke abgebaut");
        true
    }
}

impl std::fmt::Debug for CallBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallBridge")
            .field("bridge_id", &self.bridge_id)
            .field("initiator", &self.initiator.session_id)
            .field("responder", &self.responder.session_id)
            .field("links", &self.links.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
