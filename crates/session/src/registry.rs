//! Session-Registry – alle verbundenen Signaling-Clients
//!
//! Lock-freie Registry via DashMap. Sessions werden beim Verbindungsaufbau
//! registriert und beim Trennen entfernt; jede Session haelt ihren
//! Sendekanal und die optional angehaengten Medien-Endpunkte.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use trunkline_core::{BridgeId, GatewayError, Result, SessionId};
use trunkline_endpoint::{RealtimePeer, TelephonyEndpoint};
use trunkline_protocol::SignalEnvelope;

use crate::kanal::SignalChannel;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Ein verbundener Signaling-Client
///
/// Die ID ist stabil fuer die Lebensdauer des Signaling-Kanals. Anhaenge
/// (Telefonie-Leg, Realtime Peer, aktive Bruecke) sind nachtraeglich
/// setzbar und werden beim Trennen mit der Session entsorgt.
pub struct Session {
    id: SessionId,
    kanal: Arc<dyn SignalChannel>,
    telefonie: RwLock<Option<Arc<dyn TelephonyEndpoint>>>,
    peer: RwLock<Option<Arc<dyn RealtimePeer>>>,
    aktive_bruecke: RwLock<Option<BridgeId>>,
    /// Absender eines noch unbeantworteten eingehenden Telefonie-Anrufs
    eingehender_anruf: RwLock<Option<String>>,
}

impl Session {
    /// Erstellt eine neue Session mit frischer ID
    pub fn neu(kanal: Arc<dyn SignalChannel>) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::new(),
            kanal,
            telefonie: RwLock::new(None),
            peer: RwLock::new(None),
            aktive_bruecke: RwLock::new(None),
            eingehender_anruf: RwLock::new(None),
        })
    }

    /// Stabile ID dieser Session
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Sendet eine Nachricht an den Client dieser Session
    pub async fn senden(&self, nachricht: SignalEnvelope) -> Result<()> {
        self.kanal.senden(nachricht).await
    }

    /// Schliesst den Sendekanal der Session
    pub fn kanal_schliessen(&self) {
        self.kanal.schliessen();
    }

    // ---------- Anhaenge ----------

    /// Haengt ein Telefonie-Leg an (ersetzt ein vorhandenes)
    pub fn telefonie_setzen(&self, leg: Arc<dyn TelephonyEndpoint>) {
        *self.telefonie.write() = Some(leg);
    }

    /// Angehaengtes Telefonie-Leg, falls vorhanden
    pub fn telefonie(&self) -> Option<Arc<dyn TelephonyEndpoint>> {
        self.telefonie.read().clone()
    }

    /// Haengt einen Realtime Peer an (ersetzt einen vorhandenen)
    pub fn peer_setzen(&self, peer: Arc<dyn RealtimePeer>) {
        *self.peer.write() = Some(peer);
    }

    /// Angehaengter Realtime Peer, falls vorhanden
    pub fn peer(&self) -> Option<Arc<dyn RealtimePeer>> {
        self.peer.read().clone()
    }

    /// Loest beide Medien-Anhaenge und gibt sie zurueck
    pub fn anhaenge_loesen(
        &self,
    ) -> (
        Option<Arc<dyn TelephonyEndpoint>>,
        Option<Arc<dyn RealtimePeer>>,
    ) {
        (self.telefonie.write().take(), self.peer.write().take())
    }

    // ---------- Bruecken-Zuordnung ----------

    /// Reserviert die Session fuer eine Bruecke, aber nur wenn sie frei ist
    ///
    /// Pruefung und Reservierung laufen unter demselben Write-Lock, damit
    /// zwei gleichzeitige Anforderungen fuer dasselbe Paar nicht beide
    /// durch die Belegt-Pruefung rutschen.
    pub fn bruecke_setzen_wenn_frei(&self, bridge_id: BridgeId) -> bool {
        let mut aktiv = self.aktive_bruecke.write();
        if aktiv.is_some() {
            return false;
        }
        *aktiv = Some(bridge_id);
        true
    }

    /// Bruecke an der diese Session beteiligt ist, falls vorhanden
    pub fn bruecke(&self) -> Option<BridgeId> {
        *self.aktive_bruecke.read()
    }

    /// Loest die Bruecken-Zuordnung (nur wenn sie noch auf `bridge_id` zeigt)
    pub fn bruecke_loesen(&self, bridge_id: BridgeId) {
        let mut aktiv = self.aktive_bruecke.write();
        if *aktiv == Some(bridge_id) {
            *aktiv = None;
        }
    }

    // ---------- Eingehender Telefonie-Anruf (Direktmodus) ----------

    /// Vermerkt einen unbeantworteten eingehenden Anruf
    pub fn eingehenden_anruf_setzen(&self, von: impl Into<String>) {
        *self.eingehender_anruf.write() = Some(von.into());
    }

    /// Nimmt den vermerkten eingehenden Anruf heraus
    pub fn eingehenden_anruf_nehmen(&self) -> Option<String> {
        self.eingehender_anruf.write().take()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("bruecke", &self.bruecke())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Registry aller aktiven Sessions
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registriert einen neuen Client und gibt seine Session zurueck
    pub fn registrieren(&self, kanal: Arc<dyn SignalChannel>) -> Arc<Session> {
        let session = Session::neu(kanal);
        self.sessions.insert(session.id(), Arc::clone(&session));
        tracing::info!(session = %session.id(), "Session registriert");
        session
    }

    /// Entfernt eine Session; gibt sie zurueck falls sie existierte
    pub fn entfernen(&self, session_id: SessionId) -> Option<Arc<Session>> {
        let entfernt = self.sessions.remove(&session_id).map(|(_, s)| s);
        if entfernt.is_some() {
            tracing::info!(session = %session_id, "Session entfernt");
        }
        entfernt
    }

    /// Schlaegt eine Session nach
    pub fn abrufen(&self, session_id: SessionId) -> Result<Arc<Session>> {
        self.sessions
            .get(&session_id)
            .map(|e| Arc::clone(&e))
            .ok_or(GatewayError::UnbekannteSession(session_id))
    }

    /// Gibt true zurueck wenn die Session existiert
    pub fn enthaelt(&self, session_id: SessionId) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Sendet eine Nachricht an eine bestimmte Session
    pub async fn senden_an(&self, session_id: SessionId, nachricht: SignalEnvelope) -> Result<()> {
        self.abrufen(session_id)?.senden(nachricht).await
    }

    /// Anzahl aktiver Sessions
    pub fn anzahl(&self) -> usize {
        self.sessions.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
