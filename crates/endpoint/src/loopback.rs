//! Loopback-Endpunkte – In-Prozess-Implementierungen der Kollaborator-Traits
//!
//! Ersetzen im Demo-Betrieb und in Tests die echten Browser-Peers und
//! Telefonie-Stacks: Pakete werden ueber broadcast-Kanaele eingespeist und
//! abgegriffen, Anrufplatzierung und Auflegen sind schaltbar erfolgreich
//! oder fehlschlagend.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use trunkline_core::{EndpointId, GatewayError, Result, SessionId};
use trunkline_protocol::media::MediaPacket;
use trunkline_protocol::signal::{IceCandidate, SessionDescription};

use crate::traits::{
    MediaEndpoint, MediaSink, MediaSource, RealtimePeer, RealtimePeerFactory, TelephonyEndpoint,
    TelephonyEndpointFactory,
};

/// Kapazitaet der Paket-Kanaele (Pakete)
pub const PAKET_KANAL_KAPAZITAET: usize = 128;

// ---------------------------------------------------------------------------
// LoopbackPeer
// ---------------------------------------------------------------------------

/// Verhandlungszustand eines Loopback-Peers
#[derive(Debug, Default)]
struct PeerZustand {
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    kandidaten: Vec<IceCandidate>,
}

/// In-Prozess-Realtime-Peer
///
/// `einspeisen` simuliert Pakete die vom Browser eintreffen;
/// `ausgang_abonnieren` liefert was der Kern Richtung Browser sendet.
pub struct LoopbackPeer {
    id: EndpointId,
    produziert: broadcast::Sender<MediaPacket>,
    ausgang: broadcast::Sender<MediaPacket>,
    zustand: Mutex<PeerZustand>,
    geschlossen: AtomicBool,
}

impl LoopbackPeer {
    /// Erstellt einen neuen Loopback-Peer
    pub fn neu() -> Arc<Self> {
        let (produziert, _) = broadcast::channel(PAKET_KANAL_KAPAZITAET);
        let (ausgang, _) = broadcast::channel(PAKET_KANAL_KAPAZITAET);
        Arc::new(Self {
            id: EndpointId::new(),
            produziert,
            ausgang,
            zustand: Mutex::new(PeerZustand::default()),
            geschlossen: AtomicBool::new(false),
        })
    }

    /// Speist ein Paket ein als kaeme es vom Browser
    ///
    /// Ohne Abonnenten wird das Paket verworfen (kein Puffern).
    pub fn einspeisen(&self, paket: MediaPacket) {
        let _ = self.produziert.send(paket);
    }

    /// Abonniert den Ausgang Richtung Browser
    pub fn ausgang_abonnieren(&self) -> broadcast::Receiver<MediaPacket> {
        self.ausgang.subscribe()
    }

    /// Gibt true zurueck wenn der Peer geschlossen wurde
    pub fn ist_geschlossen(&self) -> bool {
        self.geschlossen.load(Ordering::SeqCst)
    }

    /// Anzahl der hinzugefuegten ICE-Kandidaten
    pub fn kandidaten_anzahl(&self) -> usize {
        self.zustand.lock().kandidaten.len()
    }

    /// Zuletzt gesetzte Remote-Description
    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.zustand.lock().remote.clone()
    }

    fn geschlossen_pruefen(&self) -> Result<()> {
        if self.ist_geschlossen() {
            return Err(GatewayError::intern(format!(
                "Peer {} bereits geschlossen",
                self.id
            )));
        }
        Ok(())
    }
}

impl MediaEndpoint for LoopbackPeer {
    fn endpoint_id(&self) -> EndpointId {
        self.id
    }
}

impl MediaSource for LoopbackPeer {
    fn abonnieren(&self) -> broadcast::Receiver<MediaPacket> {
        self.produziert.subscribe()
    }
}

impl MediaSink for LoopbackPeer {
    fn paket_senden(&self, paket: MediaPacket) {
        if self.ist_geschlossen() {
            return;
        }
        // Ohne Abonnenten verworfen (best-effort)
        let _ = self.ausgang.send(paket);
    }
}

#[async_trait]
impl RealtimePeer for LoopbackPeer {
    async fn offer_erstellen(&self) -> Result<SessionDescription> {
        self.geschlossen_pruefen()?;
        Ok(SessionDescription::offer(format!("v=0 loopback {}", self.id)))
    }

    async fn answer_erstellen(&self) -> Result<SessionDescription> {
        self.geschlossen_pruefen()?;
        if self.zustand.lock().remote.is_none() {
            return Err(GatewayError::intern(
                "Answer ohne Remote-Description angefordert",
            ));
        }
        Ok(SessionDescription::answer(format!(
            "v=0 loopback {}",
            self.id
        )))
    }

    async fn local_description_setzen(&self, sdp: SessionDescription) -> Result<()> {
        self.geschlossen_pruefen()?;
        self.zustand.lock().local = Some(sdp);
        Ok(())
    }

    async fn remote_description_setzen(&self, sdp: SessionDescription) -> Result<()> {
        self.geschlossen_pruefen()?;
        self.zustand.lock().remote = Some(sdp);
        Ok(())
    }

    fn ice_kandidat_hinzufuegen(&self, kandidat: IceCandidate) -> Result<()> {
        self.geschlossen_pruefen()?;
        self.zustand.lock().kandidaten.push(kandidat);
        Ok(())
    }

    fn schliessen(&self) {
        if !self.geschlossen.swap(true, Ordering::SeqCst) {
            tracing::debug!(peer = %self.id, "Loopback-Peer geschlossen");
        }
    }
}

// ---------------------------------------------------------------------------
// LoopbackEndpoint
// ---------------------------------------------------------------------------

/// In-Prozess-Telefonie-Leg
///
/// `anrufe_ablehnen` laesst `anrufen` fehlschlagen (Netz nicht erreichbar),
/// `auflegen_verweigern` laesst `auflegen` fehlschlagen – beides fuer die
/// Fehlerpfade des Brueckenaufbaus bzw. -abbaus.
pub struct LoopbackEndpoint {
    id: EndpointId,
    adresse: String,
    produziert: broadcast::Sender<MediaPacket>,
    ausgang: broadcast::Sender<MediaPacket>,
    verbunden: AtomicBool,
    anrufe_ablehnen: AtomicBool,
    auflegen_verweigern: AtomicBool,
}

impl LoopbackEndpoint {
    /// Erstellt ein neues Loopback-Leg mit der gegebenen Rufadresse
    pub fn neu(adresse: impl Into<String>) -> Arc<Self> {
        let (produziert, _) = broadcast::channel(PAKET_KANAL_KAPAZITAET);
        let (ausgang, _) = broadcast::channel(PAKET_KANAL_KAPAZITAET);
        Arc::new(Self {
            id: EndpointId::new(),
            adresse: adresse.into(),
            produziert,
            ausgang,
            verbunden: AtomicBool::new(false),
            anrufe_ablehnen: AtomicBool::new(false),
            auflegen_verweigern: AtomicBool::new(false),
        })
    }

    /// Speist ein Paket ein als kaeme es aus dem Telefonnetz
    pub fn einspeisen(&self, paket: MediaPacket) {
        let _ = self.produziert.send(paket);
    }

    /// Abonniert den Ausgang Richtung Telefonnetz
    pub fn ausgang_abonnieren(&self) -> broadcast::Receiver<MediaPacket> {
        self.ausgang.subscribe()
    }

    /// Gibt true zurueck solange das Leg verbunden ist
    pub fn ist_verbunden(&self) -> bool {
        self.verbunden.load(Ordering::SeqCst)
    }

    /// Laesst kuenftige `anrufen`-Versuche fehlschlagen
    pub fn anrufe_ablehnen(&self, ablehnen: bool) {
        self.anrufe_ablehnen.store(ablehnen, Ordering::SeqCst);
    }

    /// Laesst kuenftige `auflegen`-Versuche fehlschlagen
    pub fn auflegen_verweigern(&self, verweigern: bool) {
        self.auflegen_verweigern.store(verweigern, Ordering::SeqCst);
    }
}

impl MediaEndpoint for LoopbackEndpoint {
    fn endpoint_id(&self) -> EndpointId {
        self.id
    }
}

impl MediaSource for LoopbackEndpoint {
    fn abonnieren(&self) -> broadcast::Receiver<MediaPacket> {
        self.produziert.subscribe()
    }
}

impl MediaSink for LoopbackEndpoint {
    fn paket_senden(&self, paket: MediaPacket) {
        let _ = self.ausgang.send(paket);
    }
}

#[async_trait]
impl TelephonyEndpoint for LoopbackEndpoint {
    fn adresse(&self) -> String {
        self.adresse.clone()
    }

    async fn anrufen(&self, ziel: &str) -> Result<()> {
        if self.anrufe_ablehnen.load(Ordering::SeqCst) {
            return Err(GatewayError::TelefonieAnrufFehlgeschlagen(format!(
                "{ziel} nicht erreichbar"
            )));
        }
        self.verbunden.store(true, Ordering::SeqCst);
        tracing::debug!(leg = %self.id, ziel = %ziel, "Loopback-Anruf platziert");
        Ok(())
    }

    async fn annehmen(&self) -> Result<()> {
        self.verbunden.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn auflegen(&self) -> Result<()> {
        if self.auflegen_verweigern.load(Ordering::SeqCst) {
            return Err(GatewayError::intern(format!(
                "Leg {} verweigert das Auflegen",
                self.id
            )));
        }
        self.verbunden.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fabriken
// ---------------------------------------------------------------------------

/// Stellt Loopback-Peers bereit und merkt sich die Vergabe pro Session
#[derive(Default)]
pub struct LoopbackPeerFactory {
    vergeben: DashMap<SessionId, Arc<LoopbackPeer>>,
}

impl LoopbackPeerFactory {
    /// Erstellt eine neue Fabrik
    pub fn neu() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Gibt den zuletzt fuer die Session vergebenen Peer zurueck
    pub fn vergebener_peer(&self, session_id: &SessionId) -> Option<Arc<LoopbackPeer>> {
        self.vergeben.get(session_id).map(|e| Arc::clone(&e))
    }
}

#[async_trait]
impl RealtimePeerFactory for LoopbackPeerFactory {
    async fn bereitstellen(&self, session_id: SessionId) -> Result<Arc<dyn RealtimePeer>> {
        let peer = LoopbackPeer::neu();
        self.vergeben.insert(session_id, Arc::clone(&peer));
        tracing::debug!(session = %session_id, peer = %peer.endpoint_id(), "Loopback-Peer vergeben");
        Ok(peer)
    }
}

/// Stellt Loopback-Telefonie-Legs bereit
///
/// `bereitstellung_verweigern` simuliert einen Gateway ohne freie
/// Telefonie-Transports (TransportUnavailable-Pfad).
pub struct LoopbackEndpointFactory {
    trunk_adresse: String,
    vergeben: DashMap<SessionId, Arc<LoopbackEndpoint>>,
    verweigern: AtomicBool,
}

impl LoopbackEndpointFactory {
    /// Erstellt eine neue Fabrik; `trunk_adresse` ist das Adress-Praefix der Legs
    pub fn neu(trunk_adresse: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            trunk_adresse: trunk_adresse.into(),
            vergeben: DashMap::new(),
            verweigern: AtomicBool::new(false),
        })
    }

    /// Gibt das zuletzt fuer die Session vergebene Leg zurueck
    pub fn vergebenes_leg(&self, session_id: &SessionId) -> Option<Arc<LoopbackEndpoint>> {
        self.vergeben.get(session_id).map(|e| Arc::clone(&e))
    }

    /// Laesst kuenftige Bereitstellungen fehlschlagen
    pub fn bereitstellung_verweigern(&self, verweigern: bool) {
        self.verweigern.store(verweigern, Ordering::SeqCst);
    }
}

#[async_trait]
impl TelephonyEndpointFactory for LoopbackEndpointFactory {
    async fn bereitstellen(&self, session_id: SessionId) -> Result<Arc<dyn TelephonyEndpoint>> {
        if self.verweigern.load(Ordering::SeqCst) {
            return Err(GatewayError::TransportNichtVerfuegbar(session_id));
        }
        let leg = LoopbackEndpoint::neu(format!(
            "sip:{}@{}",
            session_id.inner(),
            self.trunk_adresse
        ));
        self.vergeben.insert(session_id, Arc::clone(&leg));
        tracing::debug!(session = %session_id, leg = %leg.endpoint_id(), "Loopback-Leg vergeben");
        Ok(leg)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
