//! Gateway-Dispatcher – Nachrichten in Operationen uebersetzen
//!
//! Eine Dispatcher-Instanz pro Gateway. Jede eingehende Signaling-Nachricht
//! wird hier in Operationen auf Registry, Bruecken-Manager und Relay Fabric
//! umgesetzt. Veraltete Referenzen (Bruecke oder Session schon weg) werden
//! geloggt und nie an den Client eskaliert.
//!
//! ## Zwei Betriebsarten
//! - Direktmodus: ein Browser gegen das Telefonnetz (`make-call` mit
//!   Rufnummer, `accept-call`)
//! - Brueckenmodus: zwei Browser ueber je ein eigenes Telefonie-Leg
//!   (`make-call` mit Session-ID, `accept-bridge-call`, ...)

use dashmap::DashMap;
use std::sync::Arc;
use trunkline_bridge::BridgeManager;
use trunkline_core::{LinkId, Result, SessionId};
use trunkline_endpoint::{
    MediaSink, MediaSource, RealtimePeer, RealtimePeerFactory, TelephonyEndpoint,
    TelephonyEndpointFactory,
};
use trunkline_protocol::signal::{
    IceCandidate, IncomingCallData, SessionDescription, SessionReadyData,
};
use trunkline_protocol::{SignalEnvelope, SignalPayload};
use trunkline_relay::RelayFabric;
use trunkline_session::{Session, SessionRegistry, SignalChannel};

/// Der zentrale Nachrichten-Verteiler des Gateways
pub struct GatewayDispatcher {
    registry: Arc<SessionRegistry>,
    fabric: Arc<RelayFabric>,
    manager: Arc<BridgeManager>,
    peer_fabrik: Arc<dyn RealtimePeerFactory>,
    telefonie_fabrik: Arc<dyn TelephonyEndpointFactory>,
    /// Direktmodus-Links pro Session (Peer <-> eigenes Leg)
    direkt_links: DashMap<SessionId, Vec<LinkId>>,
}

impl GatewayDispatcher {
    /// Erstellt einen Dispatcher mit frischer Registry und Fabric
    pub fn neu(
        peer_fabrik: Arc<dyn RealtimePeerFactory>,
        telefonie_fabrik: Arc<dyn TelephonyEndpointFactory>,
    ) -> Arc<Self> {
        let registry = SessionRegistry::neu();
        let fabric = RelayFabric::neu();
        let manager = BridgeManager::neu(
            Arc::clone(&registry),
            Arc::clone(&fabric),
            Arc::clone(&peer_fabrik),
            Arc::clone(&telefonie_fabrik),
        );
        Arc::new(Self {
            registry,
            fabric,
            manager,
            peer_fabrik,
            telefonie_fabrik,
            direkt_links: DashMap::new(),
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn fabric(&self) -> &Arc<RelayFabric> {
        &self.fabric
    }

    pub fn manager(&self) -> &Arc<BridgeManager> {
        &self.manager
    }

    // -----------------------------------------------------------------
    // Verbindungs-Lebenszyklus
    // -----------------------------------------------------------------

    /// Registriert einen neuen Client und teilt ihm seine Session-ID mit
    pub async fn verbindung_geoeffnet(&self, kanal: Arc<dyn SignalChannel>) -> Arc<Session> {
        let session = self.registry.registrieren(kanal);
        let nachricht = SignalEnvelope::mit_session(
            SignalPayload::SessionReady(SessionReadyData {
                session_id: session.id(),
            }),
            session.id(),
        );
        if let Err(fehler) = session.senden(nachricht).await {
            tracing::warn!(session = %session.id(), fehler = %fehler, "session-ready nicht zustellbar");
        }
        session
    }

    /// Raeumt eine getrennte Session vollstaendig auf
    ///
    /// Reihenfolge: erst Bruecken/Verhandlungen dieser Partei beenden
    /// (Gegenseite informieren), dann Direktmodus-Links, dann Anhaenge.
    pub async fn verbindung_geschlossen(&self, session_id: SessionId) {
        self.manager.session_getrennt(session_id).await;

        if let Some((_, links)) = self.direkt_links.remove(&session_id) {
            self.fabric.alle_entfernen(&links);
        }

        if let Some(session) = self.registry.entfernen(session_id) {
            session.kanal_schliessen();
            let (leg, peer) = session.anhaenge_loesen();
            if let Some(leg) = leg {
                if let Err(fehler) = leg.auflegen().await {
                    tracing::warn!(session = %session_id, fehler = %fehler, "Auflegen beim Trennen fehlgeschlagen");
                }
            }
            if let Some(peer) = peer {
                peer.schliessen();
            }
        }
        tracing::info!(session = %session_id, "Verbindung geschlossen");
    }

    /// Meldet einen eingehenden Anruf aus dem Telefonnetz an eine Session
    pub async fn eingehender_anruf(&self, von: &str, ziel: SessionId) -> Result<()> {
        let session = self.registry.abrufen(ziel)?;
        session.eingehenden_anruf_setzen(von);
        session
            .senden(SignalEnvelope::mit_session(
                SignalPayload::IncomingCall(IncomingCallData {
                    from: von.to_string(),
                    session_id: ziel,
                }),
                ziel,
            ))
            .await?;
        tracing::info!(session = %ziel, von = %von, "Eingehender Anruf gemeldet");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Nachrichten-Verteilung
    // -----------------------------------------------------------------

    /// Verarbeitet eine Nachricht eines verbundenen Clients
    pub async fn nachricht_verarbeiten(
        &self,
        session_id: SessionId,
        nachricht: SignalEnvelope,
    ) -> Result<()> {
        let session = self.registry.abrufen(session_id)?;
        match nachricht.payload {
            SignalPayload::MakeCall(ziel) => self.make_call(&session, &ziel).await,
            SignalPayload::AcceptCall(sdp) => self.accept_call(&session, sdp).await,
            SignalPayload::RejectCall => self.reject_call(&session),
            SignalPayload::HangUp => self.hang_up(&session).await,

            SignalPayload::Offer(sdp) => self.offer(&session, sdp, false).await,
            SignalPayload::BridgeOffer(sdp) => self.offer(&session, sdp, true).await,
            SignalPayload::Answer(sdp) | SignalPayload::BridgeAnswer(sdp) => {
                self.answer(&session, sdp).await
            }
            SignalPayload::IceCandidate(kandidat)
            | SignalPayload::BridgeIceCandidate(kandidat) => self.ice_kandidat(&session, kandidat),

            SignalPayload::AcceptBridgeCall(referenz) => {
                self.veraltet_tolerieren(
                    session_id,
                    self.manager.zustimmen(referenz.bridge_id, session_id).await,
                )
            }
            SignalPayload::RejectBridgeCall(referenz) => {
                self.veraltet_tolerieren(
                    session_id,
                    self.manager.ablehnen(referenz.bridge_id, session_id).await,
                )
            }

            // Server-Nachrichten von einem Client sind Protokollverstoesse
            andere => {
                tracing::warn!(session = %session_id, "Unerwartete Nachricht vom Client: {andere:?}");
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------
    // Brueckenmodus
    // -----------------------------------------------------------------

    /// Waehlt anhand des Ziels: Session-IDs starten eine Bruecke, alles
    /// andere wird als Rufnummer ins Telefonnetz gewaehlt
    async fn make_call(&self, session: &Arc<Session>, ziel: &str) -> Result<()> {
        if let Some(ziel_id) = SessionId::parse(ziel) {
            if !self.registry.enthaelt(ziel_id) {
                tracing::info!(session = %session.id(), ziel = %ziel, "Anrufziel unbekannt");
                return session
                    .senden(SignalEnvelope::call_failed("unknown destination"))
                    .await;
            }
            if let Err(fehler) = self.manager.anfordern(session.id(), ziel_id).await {
                tracing::info!(session = %session.id(), fehler = %fehler, "Brueckenanfrage verweigert");
                session
                    .senden(SignalEnvelope::call_failed(fehler.grund()))
                    .await?;
            }
            return Ok(());
        }

        match self.direkt_anrufen(session, ziel).await {
            Ok(()) => {
                tracing::info!(session = %session.id(), ziel = %ziel, "Telefonie-Anruf platziert");
                Ok(())
            }
            Err(fehler) => {
                tracing::warn!(session = %session.id(), fehler = %fehler, "Telefonie-Anruf fehlgeschlagen");
                session
                    .senden(SignalEnvelope::call_failed(fehler.grund()))
                    .await
            }
        }
    }

    /// Veraltete Bruecken-Referenzen nur loggen; Befoerderungs-Fehler hat
    /// der Manager bereits an beide Parteien gemeldet
    fn veraltet_tolerieren(&self, session_id: SessionId, ergebnis: Result<()>) -> Result<()> {
        if let Err(fehler) = ergebnis {
            if fehler.ist_veraltet() {
                tracing::debug!(session = %session_id, fehler = %fehler, "Veraltete Bruecken-Referenz ignoriert");
            } else {
                tracing::warn!(session = %session_id, fehler = %fehler, "Bruecken-Operation fehlgeschlagen");
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Direktmodus
    // -----------------------------------------------------------------

    /// Platziert einen ausgehenden Telefonie-Anruf und verdrahtet die Medien
    ///
    /// Der Browser erhaelt das Offer des beschafften Peers und antwortet
    /// mit `answer`; das Leg waehlt parallel die Rufnummer.
    async fn direkt_anrufen(&self, session: &Arc<Session>, ziel: &str) -> Result<()> {
        let peer = self.peer_beschaffen(session).await?;
        let offer = peer.offer_erstellen().await?;
        peer.local_description_setzen(offer.clone()).await?;
        session
            .senden(SignalEnvelope::neu(SignalPayload::Offer(offer)))
            .await?;

        let leg = self.telefonie_beschaffen(session).await?;
        leg.anrufen(ziel).await?;

        self.medien_verdrahten(session, peer, leg)
    }

    /// Beantwortet ein Browser-Offer mit einem Answer
    ///
    /// `als_bruecke` entscheidet nur ueber den Antwort-Nachrichtentyp;
    /// die Peer-Verhandlung ist identisch. Ohne angehaengten Peer ist die
    /// Nachricht ein Protokollverstoss und wird nur geloggt.
    async fn offer(
        &self,
        session: &Arc<Session>,
        sdp: SessionDescription,
        als_bruecke: bool,
    ) -> Result<()> {
        let Some(peer) = session.peer() else {
            tracing::warn!(session = %session.id(), "Offer ohne Peer-Verbindung");
            return Ok(());
        };
        peer.remote_description_setzen(sdp).await?;
        let antwort = peer.answer_erstellen().await?;
        peer.local_description_setzen(antwort.clone()).await?;

        let payload = if als_bruecke {
            SignalPayload::BridgeAnswer(antwort)
        } else {
            SignalPayload::Answer(antwort)
        };
        session.senden(SignalEnvelope::neu(payload)).await
    }

    async fn answer(&self, session: &Arc<Session>, sdp: SessionDescription) -> Result<()> {
        match session.peer() {
            Some(peer) => peer.remote_description_setzen(sdp).await,
            None => {
                tracing::warn!(session = %session.id(), "Answer ohne Peer-Verbindung");
                Ok(())
            }
        }
    }

    fn ice_kandidat(&self, session: &Arc<Session>, kandidat: IceCandidate) -> Result<()> {
        match session.peer() {
            Some(peer) => peer.ice_kandidat_hinzufuegen(kandidat),
            None => {
                tracing::debug!(session = %session.id(), "ICE-Kandidat ohne Peer-Verbindung verworfen");
                Ok(())
            }
        }
    }

    /// Nimmt einen gemeldeten Telefonie-Anruf an und verdrahtet die Medien
    async fn accept_call(&self, session: &Arc<Session>, sdp: SessionDescription) -> Result<()> {
        let Some(von) = session.eingehenden_anruf_nehmen() else {
            tracing::info!(session = %session.id(), "accept-call ohne gemeldeten Anruf");
            return session
                .senden(SignalEnvelope::call_failed("no pending call"))
                .await;
        };

        match self.anruf_annehmen(session, sdp).await {
            Ok(()) => {
                tracing::info!(session = %session.id(), von = %von, "Anruf angenommen");
                Ok(())
            }
            Err(fehler) => {
                tracing::warn!(session = %session.id(), fehler = %fehler, "Anrufannahme fehlgeschlagen");
                session
                    .senden(SignalEnvelope::call_failed(fehler.grund()))
                    .await
            }
        }
    }

    async fn anruf_annehmen(&self, session: &Arc<Session>, sdp: SessionDescription) -> Result<()> {
        let peer = self.peer_beschaffen(session).await?;
        peer.remote_description_setzen(sdp).await?;
        let antwort = peer.answer_erstellen().await?;
        peer.local_description_setzen(antwort.clone()).await?;
        session
            .senden(SignalEnvelope::neu(SignalPayload::Answer(antwort)))
            .await?;

        let leg = self.telefonie_beschaffen(session).await?;
        leg.annehmen().await?;

        self.medien_verdrahten(session, peer, leg)
    }

    /// Verdrahtet Peer und Leg einer Session in beide Richtungen
    fn medien_verdrahten(
        &self,
        session: &Arc<Session>,
        peer: Arc<dyn RealtimePeer>,
        leg: Arc<dyn TelephonyEndpoint>,
    ) -> Result<()> {
        let mut links = Vec::with_capacity(2);
        let verdrahtung: [(Arc<dyn MediaSource>, Arc<dyn MediaSink>); 2] = [
            (peer.clone(), leg.clone()),
            (leg.clone(), peer.clone()),
        ];
        for (quelle, senke) in verdrahtung {
            match self.fabric.installieren(quelle, senke) {
                Ok(link) => links.push(link),
                Err(fehler) => {
                    self.fabric.alle_entfernen(&links);
                    return Err(fehler);
                }
            }
        }
        for link in &links {
            self.fabric.aktivieren(*link)?;
        }
        self.direkt_links.insert(session.id(), links);
        Ok(())
    }

    fn reject_call(&self, session: &Arc<Session>) -> Result<()> {
        match session.eingehenden_anruf_nehmen() {
            Some(von) => {
                tracing::info!(session = %session.id(), von = %von, "Anruf abgelehnt")
            }
            None => tracing::debug!(session = %session.id(), "reject-call ohne gemeldeten Anruf"),
        }
        Ok(())
    }

    async fn hang_up(&self, session: &Arc<Session>) -> Result<()> {
        if let Some(bridge_id) = session.bruecke() {
            return self.veraltet_tolerieren(
                session.id(),
                self.manager.auflegen(bridge_id, session.id()).await,
            );
        }

        // Direktmodus: eigene Links und Anhaenge abbauen
        if let Some((_, links)) = self.direkt_links.remove(&session.id()) {
            self.fabric.alle_entfernen(&links);
        }
        let (leg, peer) = session.anhaenge_loesen();
        if let Some(leg) = leg {
            if let Err(fehler) = leg.auflegen().await {
                tracing::warn!(session = %session.id(), fehler = %fehler, "Auflegen fehlgeschlagen");
            }
        }
        if let Some(peer) = peer {
            peer.schliessen();
        }
        tracing::info!(session = %session.id(), "Aufgelegt");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Beschaffung
    // -----------------------------------------------------------------

    async fn peer_beschaffen(&self, session: &Arc<Session>) -> Result<Arc<dyn RealtimePeer>> {
        if let Some(peer) = session.peer() {
            return Ok(peer);
        }
        let peer = self.peer_fabrik.bereitstellen(session.id()).await?;
        session.peer_setzen(Arc::clone(&peer));
        Ok(peer)
    }

    async fn telefonie_beschaffen(
        &self,
        session: &Arc<Session>,
    ) -> Result<Arc<dyn TelephonyEndpoint>> {
        if let Some(leg) = session.telefonie() {
            return Ok(leg);
        }
        let leg = self.telefonie_fabrik.bereitstellen(session.id()).await?;
        session.telefonie_setzen(Arc::clone(&leg));
        Ok(leg)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use trunkline_endpoint::{LoopbackEndpointFactory, LoopbackPeer, LoopbackPeerFactory};
    use trunkline_protocol::signal::BridgeRef;
    use trunkline_protocol::MediaPacket;
    use trunkline_session::MpscSignalChannel;

    struct Pruefstand {
        dispatcher: Arc<GatewayDispatcher>,
        peer_fabrik: Arc<LoopbackPeerFactory>,
        telefonie_fabrik: Arc<LoopbackEndpointFactory>,
    }

    fn pruefstand() -> Pruefstand {
        let peer_fabrik = LoopbackPeerFactory::neu();
        let telefonie_fabrik = LoopbackEndpointFactory::neu("trunk.local");
        let dispatcher = GatewayDispatcher::neu(peer_fabrik.clone(), telefonie_fabrik.clone());
        Pruefstand {
            dispatcher,
            peer_fabrik,
            telefonie_fabrik,
        }
    }

    async fn client(
        p: &Pruefstand,
    ) -> (SessionId, mpsc::Receiver<SignalEnvelope>) {
        let (kanal, mut rx) = MpscSignalChannel::neu();
        let session = p.dispatcher.verbindung_geoeffnet(kanal).await;
        // session-ready konsumieren
        let bereit = naechste(&mut rx).await;
        assert!(matches!(bereit.payload, SignalPayload::SessionReady(_)));
        (session.id(), rx)
    }

    async fn naechste(rx: &mut mpsc::Receiver<SignalEnvelope>) -> SignalEnvelope {
        timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("Nachricht erwartet")
            .expect("Kanal offen erwartet")
    }

    fn make_call(ziel: SessionId) -> SignalEnvelope {
        SignalEnvelope::neu(SignalPayload::MakeCall(ziel.inner().to_string()))
    }

    #[tokio::test]
    async fn session_ready_traegt_die_id() {
        let p = pruefstand();
        let (kanal, mut rx) = MpscSignalChannel::neu();
        let session = p.dispatcher.verbindung_geoeffnet(kanal).await;

        let bereit = naechste(&mut rx).await;
        if let SignalPayload::SessionReady(data) = bereit.payload {
            assert_eq!(data.session_id, session.id());
        } else {
            panic!("Erwartet session-ready");
        }
    }

    #[tokio::test]
    async fn make_call_mit_unbekanntem_ziel() {
        let p = pruefstand();
        let (anrufer, mut rx) = client(&p).await;

        p.dispatcher
            .nachricht_verarbeiten(anrufer, make_call(SessionId::new()))
            .await
            .unwrap();
        let antwort = naechste(&mut rx).await;
        if let SignalPayload::CallFailed(data) = antwort.payload {
            assert_eq!(data.reason, "unknown destination");
        } else {
            panic!("Erwartet call-failed");
        }
        assert_eq!(p.dispatcher.manager().verhandlungen_anzahl(), 0);
    }

    #[tokio::test]
    async fn vollstaendiger_brueckenaufbau_ueber_den_dispatcher() {
        let p = pruefstand();
        let (a, mut rx_a) = client(&p).await;
        let (b, mut rx_b) = client(&p).await;

        p.dispatcher
            .nachricht_verarbeiten(a, make_call(b))
            .await
            .unwrap();

        let einladung_a = naechste(&mut rx_a).await;
        let bridge_id = match einladung_a.payload {
            SignalPayload::BridgeCall(data) => data.bridge_id,
            andere => panic!("Erwartet bridge-call, war {andere:?}"),
        };
        naechste(&mut rx_b).await; // bridge-call an B

        for wer in [a, b] {
            p.dispatcher
                .nachricht_verarbeiten(
                    wer,
                    SignalEnvelope::neu(SignalPayload::AcceptBridgeCall(BridgeRef { bridge_id })),
                )
                .await
                .unwrap();
        }

        // B: accepted(A), establishing, sip, established
        let mut letzte = None;
        for _ in 0..4 {
            letzte = Some(naechste(&mut rx_b).await.payload);
        }
        assert!(matches!(letzte, Some(SignalPayload::BridgeEstablished(_))));
        assert!(p.dispatcher.manager().bruecke(bridge_id).is_some());
    }

    #[tokio::test]
    async fn offer_wird_mit_answer_beantwortet() {
        let p = pruefstand();
        let (s, mut rx) = client(&p).await;

        // Peer vorab anhaengen (Neuverhandlung einer bestehenden Verbindung)
        let peer = LoopbackPeer::neu();
        p.dispatcher
            .registry()
            .abrufen(s)
            .unwrap()
            .peer_setzen(peer.clone());

        p.dispatcher
            .nachricht_verarbeiten(
                s,
                SignalEnvelope::neu(SignalPayload::Offer(SessionDescription::offer("v=0..."))),
            )
            .await
            .unwrap();

        let antwort = naechste(&mut rx).await;
        if let SignalPayload::Answer(sdp) = antwort.payload {
            assert_eq!(sdp.typ, "answer");
        } else {
            panic!("Erwartet answer");
        }
        assert_eq!(peer.remote_description().unwrap().typ, "offer");
    }

    #[tokio::test]
    async fn bridge_offer_wird_mit_bridge_answer_beantwortet() {
        let p = pruefstand();
        let (s, mut rx) = client(&p).await;
        p.dispatcher
            .registry()
            .abrufen(s)
            .unwrap()
            .peer_setzen(LoopbackPeer::neu());

        p.dispatcher
            .nachricht_verarbeiten(
                s,
                SignalEnvelope::neu(SignalPayload::BridgeOffer(SessionDescription::offer("v=0"))),
            )
            .await
            .unwrap();

        let antwort = naechste(&mut rx).await;
        assert!(matches!(antwort.payload, SignalPayload::BridgeAnswer(_)));
    }

    #[tokio::test]
    async fn offer_ohne_peer_wird_ignoriert() {
        let p = pruefstand();
        let (s, mut rx) = client(&p).await;

        // Weder offer noch bridge-offer duerfen einen frischen Peer anlegen
        for payload in [
            SignalPayload::Offer(SessionDescription::offer("v=0")),
            SignalPayload::BridgeOffer(SessionDescription::offer("v=0")),
        ] {
            p.dispatcher
                .nachricht_verarbeiten(s, SignalEnvelope::neu(payload))
                .await
                .unwrap();
        }

        assert!(p.peer_fabrik.vergebener_peer(&s).is_none());
        assert!(p.dispatcher.registry().abrufen(s).unwrap().peer().is_none());
        assert!(
            timeout(Duration::from_millis(100), rx.recv()).await.is_err(),
            "keine Antwort an den Client"
        );
    }

    #[tokio::test]
    async fn ice_kandidaten_erreichen_den_peer() {
        let p = pruefstand();
        let (s, _rx) = client(&p).await;

        let peer = LoopbackPeer::neu();
        p.dispatcher
            .registry()
            .abrufen(s)
            .unwrap()
            .peer_setzen(peer.clone());

        p.dispatcher
            .nachricht_verarbeiten(
                s,
                SignalEnvelope::neu(SignalPayload::IceCandidate(IceCandidate {
                    candidate: "candidate:1 1 UDP ...".into(),
                    sdp_mid: Some("0".into()),
                    sdp_mline_index: Some(0),
                })),
            )
            .await
            .unwrap();

        assert_eq!(peer.kandidaten_anzahl(), 1);
    }

    #[tokio::test]
    async fn make_call_mit_rufnummer_platziert_den_anruf() {
        let p = pruefstand();
        let (s, mut rx) = client(&p).await;

        p.dispatcher
            .nachricht_verarbeiten(
                s,
                SignalEnvelope::neu(SignalPayload::MakeCall("sip:7001@trunk.local".into())),
            )
            .await
            .unwrap();

        // Der Browser erhaelt das Offer des frischen Peers
        let antwort = naechste(&mut rx).await;
        if let SignalPayload::Offer(sdp) = antwort.payload {
            assert_eq!(sdp.typ, "offer");
        } else {
            panic!("Erwartet offer, war {:?}", antwort.payload);
        }

        let leg = p.telefonie_fabrik.vergebenes_leg(&s).unwrap();
        assert!(leg.ist_verbunden());
        assert_eq!(p.dispatcher.fabric().anzahl(), 2);

        // Medien fliessen vom Browser-Peer zum Leg
        let peer = p.peer_fabrik.vergebener_peer(&s).unwrap();
        let mut ausgang = leg.ausgang_abonnieren();
        peer.einspeisen(MediaPacket::neu(vec![2], 9, false, 0));
        let paket = timeout(Duration::from_millis(200), ausgang.recv())
            .await
            .expect("Zustellung erwartet")
            .unwrap();
        assert_eq!(paket.timestamp, 9);
    }

    #[tokio::test]
    async fn make_call_mit_rufnummer_ohne_transport() {
        let p = pruefstand();
        let (s, mut rx) = client(&p).await;
        p.telefonie_fabrik.bereitstellung_verweigern(true);

        p.dispatcher
            .nachricht_verarbeiten(
                s,
                SignalEnvelope::neu(SignalPayload::MakeCall("sip:7001@trunk.local".into())),
            )
            .await
            .unwrap();

        // Offer geht noch raus, dann scheitert die Leg-Beschaffung
        let offer = naechste(&mut rx).await;
        assert!(matches!(offer.payload, SignalPayload::Offer(_)));
        let antwort = naechste(&mut rx).await;
        if let SignalPayload::CallFailed(data) = antwort.payload {
            assert_eq!(data.reason, "transport-unavailable");
        } else {
            panic!("Erwartet call-failed");
        }
        assert_eq!(p.dispatcher.fabric().anzahl(), 0);
    }

    #[tokio::test]
    async fn eingehender_anruf_annehmen_verdrahtet_die_medien() {
        let p = pruefstand();
        let (s, mut rx) = client(&p).await;

        p.dispatcher
            .eingehender_anruf("sip:7001@trunk", s)
            .await
            .unwrap();
        let meldung = naechste(&mut rx).await;
        if let SignalPayload::IncomingCall(data) = meldung.payload {
            assert_eq!(data.from, "sip:7001@trunk");
            assert_eq!(data.session_id, s);
        } else {
            panic!("Erwartet incoming-call");
        }

        p.dispatcher
            .nachricht_verarbeiten(
                s,
                SignalEnvelope::neu(SignalPayload::AcceptCall(SessionDescription::offer("v=0"))),
            )
            .await
            .unwrap();
        let antwort = naechste(&mut rx).await;
        assert!(matches!(antwort.payload, SignalPayload::Answer(_)));
        assert_eq!(p.dispatcher.fabric().anzahl(), 2);

        // Medien fliessen vom Browser-Peer zum Leg
        let peer = p.peer_fabrik.vergebener_peer(&s).unwrap();
        let leg = p.telefonie_fabrik.vergebenes_leg(&s).unwrap();
        assert!(leg.ist_verbunden());
        let mut ausgang = leg.ausgang_abonnieren();
        peer.einspeisen(MediaPacket::neu(vec![1], 3, false, 0));
        let paket = timeout(Duration::from_millis(200), ausgang.recv())
            .await
            .expect("Zustellung erwartet")
            .unwrap();
        assert_eq!(paket.timestamp, 3);
    }

    #[tokio::test]
    async fn accept_call_ohne_gemeldeten_anruf() {
        let p = pruefstand();
        let (s, mut rx) = client(&p).await;

        p.dispatcher
            .nachricht_verarbeiten(
                s,
                SignalEnvelope::neu(SignalPayload::AcceptCall(SessionDescription::offer("v=0"))),
            )
            .await
            .unwrap();
        let antwort = naechste(&mut rx).await;
        if let SignalPayload::CallFailed(data) = antwort.payload {
            assert_eq!(data.reason, "no pending call");
        } else {
            panic!("Erwartet call-failed");
        }
    }

    #[tokio::test]
    async fn reject_call_raeumt_die_meldung() {
        let p = pruefstand();
        let (s, mut rx) = client(&p).await;

        p.dispatcher
            .eingehender_anruf("sip:7001@trunk", s)
            .await
            .unwrap();
        naechste(&mut rx).await;

        p.dispatcher
            .nachricht_verarbeiten(s, SignalEnvelope::neu(SignalPayload::RejectCall))
            .await
            .unwrap();

        // Ein folgendes accept-call hat keinen gemeldeten Anruf mehr
        p.dispatcher
            .nachricht_verarbeiten(
                s,
                SignalEnvelope::neu(SignalPayload::AcceptCall(SessionDescription::offer("v=0"))),
            )
            .await
            .unwrap();
        let antwort = naechste(&mut rx).await;
        assert!(matches!(antwort.payload, SignalPayload::CallFailed(_)));
    }

    #[tokio::test]
    async fn hang_up_im_direktmodus() {
        let p = pruefstand();
        let (s, mut rx) = client(&p).await;

        p.dispatcher
            .eingehender_anruf("sip:7001@trunk", s)
            .await
            .unwrap();
        naechste(&mut rx).await;
        p.dispatcher
            .nachricht_verarbeiten(
                s,
                SignalEnvelope::neu(SignalPayload::AcceptCall(SessionDescription::offer("v=0"))),
            )
            .await
            .unwrap();
        naechste(&mut rx).await;
        assert_eq!(p.dispatcher.fabric().anzahl(), 2);

        p.dispatcher
            .nachricht_verarbeiten(s, SignalEnvelope::neu(SignalPayload::HangUp))
            .await
            .unwrap();
        assert_eq!(p.dispatcher.fabric().anzahl(), 0);
        let leg = p.telefonie_fabrik.vergebenes_leg(&s).unwrap();
        assert!(!leg.ist_verbunden());
        let peer = p.peer_fabrik.vergebener_peer(&s).unwrap();
        assert!(peer.ist_geschlossen());
    }

    #[tokio::test]
    async fn trennung_raeumt_bruecke_und_gegenseite_wird_informiert() {
        let p = pruefstand();
        let (a, mut rx_a) = client(&p).await;
        let (b, mut rx_b) = client(&p).await;

        p.dispatcher
            .nachricht_verarbeiten(a, make_call(b))
            .await
            .unwrap();
        let bridge_id = match naechste(&mut rx_a).await.payload {
            SignalPayload::BridgeCall(data) => data.bridge_id,
            _ => panic!("Erwartet bridge-call"),
        };
        naechste(&mut rx_b).await;
        for wer in [a, b] {
            p.dispatcher
                .nachricht_verarbeiten(
                    wer,
                    SignalEnvelope::neu(SignalPayload::AcceptBridgeCall(BridgeRef { bridge_id })),
                )
                .await
                .unwrap();
        }
        for _ in 0..4 {
            naechste(&mut rx_a).await;
        }
        for _ in 0..4 {
            naechste(&mut rx_b).await;
        }

        p.dispatcher.verbindung_geschlossen(b).await;

        let an_a = naechste(&mut rx_a).await;
        if let SignalPayload::BridgeFailed(data) = an_a.payload {
            assert_eq!(data.reason, "peer-disconnected");
        } else {
            panic!("Erwartet bridge-failed an A");
        }
        assert_eq!(p.dispatcher.manager().bruecken_anzahl(), 0);
        assert_eq!(p.dispatcher.fabric().anzahl(), 0);
        assert_eq!(p.dispatcher.registry().anzahl(), 1);
    }

    #[tokio::test]
    async fn veraltete_bruecken_referenz_wird_toleriert() {
        let p = pruefstand();
        let (s, _rx) = client(&p).await;

        // Zustimmung zu einer nie existierenden Bruecke: kein Fehler nach aussen
        p.dispatcher
            .nachricht_verarbeiten(
                s,
                SignalEnvelope::neu(SignalPayload::AcceptBridgeCall(BridgeRef {
                    bridge_id: trunkline_core::BridgeId::new(),
                })),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn nachricht_fuer_unbekannte_session() {
        let p = pruefstand();
        let fehler = p
            .dispatcher
            .nachricht_verarbeiten(SessionId::new(), SignalEnvelope::neu(SignalPayload::HangUp))
            .await
            .unwrap_err();
        assert!(fehler.ist_veraltet());
    }
}
