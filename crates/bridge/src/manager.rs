//! Bruecken-Manager – Verhandlung, Befoerderung und Abbau
//!
//! Der Manager linearisiert alle Uebergaenge einer Bruecke ueber einen
//! Mutex pro Verhandlung: Zustimmung, Ablehnung und die Befoerderung zur
//! Anruf-Bruecke laufen nie nebeneinander. Die Befoerderung findet damit
//! hoechstens einmal statt, egal wie die Zustimmungen eintreffen.
//!
//! ## Befoerderungs-Ablauf
//! 1. Beide Parteien ausruesten (vorhandener Anhang oder Fabrik)
//! 2. Telefonie-Anruf vom Initiator-Leg zum Responder-Leg platzieren
//! 3. `sip-call-established` an beide Parteien
//! 4. Vier Links installieren und aktivieren (Peer <-> eigenes Leg)
//! 5. `bridge-established` an beide Parteien

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use trunkline_core::{BridgeId, GatewayError, Result, SessionId};
use trunkline_endpoint::{
    MediaSink, MediaSource, RealtimePeerFactory, TelephonyEndpointFactory,
};
use trunkline_protocol::signal::{
    BridgeAcceptedData, BridgeCallData, BridgeRef, BridgeRejectedData,
};
use trunkline_protocol::{SignalEnvelope, SignalPayload};
use trunkline_relay::RelayFabric;
use trunkline_session::{Session, SessionRegistry};

use crate::call_bridge::{CallBridge, PartyLeg};
use crate::negotiation::Negotiation;

/// Grund fuer `bridge-failed` wenn eine Partei die Verbindung verliert
pub const GRUND_PARTEI_GETRENNT: &str = "peer-disconnected";

/// Verwaltet alle Verhandlungen und Anruf-Bruecken des Gateways
pub struct BridgeManager {
    registry: Arc<SessionRegistry>,
    fabric: Arc<RelayFabric>,
    peer_fabrik: Arc<dyn RealtimePeerFactory>,
    telefonie_fabrik: Arc<dyn TelephonyEndpointFactory>,
    verhandlungen: DashMap<BridgeId, Arc<Mutex<Negotiation>>>,
    bruecken: DashMap<BridgeId, Arc<CallBridge>>,
}

impl BridgeManager {
    pub fn neu(
        registry: Arc<SessionRegistry>,
        fabric: Arc<RelayFabric>,
        peer_fabrik: Arc<dyn RealtimePeerFactory>,
        telefonie_fabrik: Arc<dyn TelephonyEndpointFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            fabric,
            peer_fabrik,
            telefonie_fabrik,
            verhandlungen: DashMap::new(),
            bruecken: DashMap::new(),
        })
    }

    /// Anzahl laufender Verhandlungen
    pub fn verhandlungen_anzahl(&self) -> usize {
        self.verhandlungen.len()
    }

    /// Schlaegt eine laufende Anruf-Bruecke nach
    pub fn bruecke(&self, bridge_id: BridgeId) -> Option<Arc<CallBridge>> {
        self.bruecken.get(&bridge_id).map(|e| Arc::clone(&e))
    }

    /// Anzahl laufender Anruf-Bruecken
    pub fn bruecken_anzahl(&self) -> usize {
        self.bruecken.len()
    }

    // -----------------------------------------------------------------
    // Verhandlung
    // -----------------------------------------------------------------

    /// Schlaegt eine Bruecke zwischen Initiator und Ziel vor
    ///
    /// Beide Parteien erhalten `bridge-call`. Die Belegt-Pruefung ist eine
    /// Reservierung: pro Session entscheidet ein Compare-and-Set unter dem
    /// Session-Lock, damit zwei gleichzeitige Anforderungen fuer dasselbe
    /// Paar nie zwei Verhandlungen erzeugen.
    pub async fn anfordern(&self, initiator: SessionId, ziel: SessionId) -> Result<BridgeId> {
        if initiator == ziel {
            return Err(GatewayError::UngueltigeNachricht(
                "Bruecke zu sich selbst angefordert".into(),
            ));
        }
        let init_session = self.registry.abrufen(initiator)?;
        let ziel_session = self.registry.abrufen(ziel)?;

        // Eine Session traegt hoechstens eine Bruecke gleichzeitig
        let verhandlung = Negotiation::neu(initiator, ziel);
        let bridge_id = verhandlung.bridge_id();
        if !init_session.bruecke_setzen_wenn_frei(bridge_id) {
            return Err(GatewayError::UngueltigeNachricht(format!(
                "{initiator} ist bereits an einer Bruecke beteiligt"
            )));
        }
        if !ziel_session.bruecke_setzen_wenn_frei(bridge_id) {
            init_session.bruecke_loesen(bridge_id);
            return Err(GatewayError::UngueltigeNachricht(format!(
                "{ziel} ist bereits an einer Bruecke beteiligt"
            )));
        }
        self.verhandlungen
            .insert(bridge_id, Arc::new(Mutex::new(verhandlung)));

        tracing::info!(bruecke = %bridge_id, initiator = %initiator, ziel = %ziel, "Bruecke vorgeschlagen");

        self.melden(
            initiator,
            SignalEnvelope::mit_session(
                SignalPayload::BridgeCall(BridgeCallData {
                    bridge_id,
                    target_session_id: ziel,
                    is_initiator: true,
                }),
                initiator,
            ),
        )
        .await;
        self.melden(
            ziel,
            SignalEnvelope::mit_session(
                SignalPayload::BridgeCall(BridgeCallData {
                    bridge_id,
                    target_session_id: initiator,
                    is_initiator: false,
                }),
                ziel,
            ),
        )
        .await;

        Ok(bridge_id)
    }

    /// Verbucht die Zustimmung einer Partei
    ///
    /// Beim Uebergang nach "beide zugestimmt" wird die Bruecke noch unter
    /// demselben Lock befoerdert.
    pub async fn zustimmen(&self, bridge_id: BridgeId, session_id: SessionId) -> Result<()> {
        let eintrag = self
            .verhandlungen
            .get(&bridge_id)
            .map(|e| Arc::clone(&e))
            .ok_or(GatewayError::UnbekannteBruecke(bridge_id))?;
        let mut verhandlung = eintrag.lock().await;

        let vollstaendig = verhandlung.zustimmen(session_id)?;

        if let Some(gegenseite) = verhandlung.gegenseite(session_id) {
            self.melden(
                gegenseite,
                SignalEnvelope::neu(SignalPayload::BridgeAccepted(BridgeAcceptedData {
                    bridge_id,
                    accepted_by: session_id,
                })),
            )
            .await;
        }

        if !vollstaendig {
            return Ok(());
        }

        // Beide haben zugestimmt: befoerdern, noch unter dem Lock
        for partei in [verhandlung.initiator(), verhandlung.responder()] {
            self.melden(
                partei,
                SignalEnvelope::neu(SignalPayload::BridgeEstablishing(BridgeRef { bridge_id })),
            )
            .await;
        }

        match self.aufbauen(&verhandlung).await {
            Ok(bruecke) => {
                verhandlung.befoerdern()?;
                self.bruecken.insert(bridge_id, bruecke);
                self.verhandlungen.remove(&bridge_id);
                for partei in [verhandlung.initiator(), verhandlung.responder()] {
                    self.melden(
                        partei,
                        SignalEnvelope::neu(SignalPayload::BridgeEstablished(BridgeRef {
                            bridge_id,
                        })),
                    )
                    .await;
                }
                tracing::info!(bruecke = %bridge_id, "Bruecke befoerdert");
                Ok(())
            }
            Err(fehler) => {
                verhandlung.fehlschlagen();
                self.verhandlungen.remove(&bridge_id);
                let grund = fehler.grund();
                tracing::warn!(bruecke = %bridge_id, fehler = %fehler, "Befoerderung fehlgeschlagen");
                for partei in [verhandlung.initiator(), verhandlung.responder()] {
                    if let Ok(session) = self.registry.abrufen(partei) {
                        session.bruecke_loesen(bridge_id);
                    }
                    self.melden(partei, SignalEnvelope::bridge_failed(bridge_id, grund.clone()))
                        .await;
                }
                Err(fehler)
            }
        }
    }

    /// Verbucht die Ablehnung einer Partei und beendet die Verhandlung
    pub async fn ablehnen(&self, bridge_id: BridgeId, session_id: SessionId) -> Result<()> {
        let eintrag = self
            .verhandlungen
            .get(&bridge_id)
            .map(|e| Arc::clone(&e))
            .ok_or(GatewayError::UnbekannteBruecke(bridge_id))?;
        let mut verhandlung = eintrag.lock().await;

        verhandlung.ablehnen(session_id)?;
        self.verhandlungen.remove(&bridge_id);
        tracing::info!(bruecke = %bridge_id, von = %session_id, "Bruecke abgelehnt");

        for partei in [verhandlung.initiator(), verhandlung.responder()] {
            if let Ok(session) = self.registry.abrufen(partei) {
                session.bruecke_loesen(bridge_id);
            }
        }
        if let Some(gegenseite) = verhandlung.gegenseite(session_id) {
            self.melden(
                gegenseite,
                SignalEnvelope::neu(SignalPayload::BridgeRejected(BridgeRejectedData {
                    bridge_id,
                    rejected_by: session_id,
                })),
            )
            .await;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Laufende Bruecken
    // -----------------------------------------------------------------

    /// Legt eine laufende Bruecke auf Wunsch einer Partei auf
    pub async fn auflegen(&self, bridge_id: BridgeId, session_id: SessionId) -> Result<()> {
        let bruecke = self
            .bruecke(bridge_id)
            .ok_or(GatewayError::UnbekannteBruecke(bridge_id))?;
        let gegenseite = bruecke
            .gegenseite(session_id)
            .ok_or_else(|| {
                GatewayError::UngueltigeNachricht(format!(
                    "{session_id} ist keine Partei von {bridge_id}"
                ))
            })?;

        if self.bruecke_entsorgen(&bruecke).await {
            self.melden(
                gegenseite,
                SignalEnvelope::mit_session(SignalPayload::HangUp, session_id),
            )
            .await;
        }
        Ok(())
    }

    /// Raeumt auf wenn eine Session die Verbindung verliert
    ///
    /// Laufende Verhandlungen und Bruecken mit dieser Partei werden
    /// beendet; die Gegenseite erhaelt `bridge-failed`.
    pub async fn session_getrennt(&self, session_id: SessionId) {
        // Verhandlungen dieser Partei einsammeln
        let betroffene: Vec<Arc<Mutex<Negotiation>>> = self
            .verhandlungen
            .iter()
            .map(|e| Arc::clone(&e))
            .collect();
        for eintrag in betroffene {
            let mut verhandlung = eintrag.lock().await;
            if !verhandlung.ist_partei(session_id) || verhandlung.zustand().ist_endzustand() {
                continue;
            }
            let bridge_id = verhandlung.bridge_id();
            verhandlung.fehlschlagen();
            self.verhandlungen.remove(&bridge_id);
            if let Some(gegenseite) = verhandlung.gegenseite(session_id) {
                if let Ok(session) = self.registry.abrufen(gegenseite) {
                    session.bruecke_loesen(bridge_id);
                }
                self.melden(
                    gegenseite,
                    SignalEnvelope::bridge_failed(bridge_id, GRUND_PARTEI_GETRENNT),
                )
                .await;
            }
            tracing::info!(bruecke = %bridge_id, session = %session_id, "Verhandlung durch Trennung beendet");
        }

        // Laufende Bruecken dieser Partei abbauen
        let bruecken: Vec<Arc<CallBridge>> = self
            .bruecken
            .iter()
            .filter(|e| e.ist_partei(session_id))
            .map(|e| Arc::clone(&e))
            .collect();
        for bruecke in bruecken {
            let bridge_id = bruecke.bridge_id();
            if self.bruecke_entsorgen(&bruecke).await {
                if let Some(gegenseite) = bruecke.gegenseite(session_id) {
                    self.melden(
                        gegenseite,
                        SignalEnvelope::bridge_failed(bridge_id, GRUND_PARTEI_GETRENNT),
                    )
                    .await;
                }
                tracing::info!(bruecke = %bridge_id, session = %session_id, "Bruecke durch Trennung abgebaut");
            }
        }
    }

    // -----------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------

    /// Ruestet eine Partei aus: vorhandener Anhang oder frische Bereitstellung
    async fn partei_ausruesten(&self, session: &Arc<Session>) -> Result<PartyLeg> {
        let endpoint = match session.telefonie() {
            Some(vorhanden) => vorhanden,
            None => {
                let frisch = self.telefonie_fabrik.bereitstellen(session.id()).await?;
                session.telefonie_setzen(Arc::clone(&frisch));
                frisch
            }
        };
        let peer = match session.peer() {
            Some(vorhanden) => vorhanden,
            None => {
                let frisch = self.peer_fabrik.bereitstellen(session.id()).await?;
                session.peer_setzen(Arc::clone(&frisch));
                frisch
            }
        };
        Ok(PartyLeg {
            session_id: session.id(),
            peer,
            endpoint,
        })
    }

    /// Befoerdert eine vollstaendig bestaetigte Verhandlung
    async fn aufbauen(&self, verhandlung: &Negotiation) -> Result<Arc<CallBridge>> {
        let bridge_id = verhandlung.bridge_id();
        let init_session = self.registry.abrufen(verhandlung.initiator())?;
        let resp_session = self.registry.abrufen(verhandlung.responder())?;

        let init_leg = self.partei_ausruesten(&init_session).await?;
        let resp_leg = self.partei_ausruesten(&resp_session).await?;

        // Telefonie-Anruf zwischen den Legs platzieren
        let ziel_adresse = resp_leg.endpoint.adresse();
        init_leg.endpoint.anrufen(&ziel_adresse).await?;
        resp_leg.endpoint.annehmen().await?;
        tracing::debug!(bruecke = %bridge_id, ziel = %ziel_adresse, "Telefonie-Anruf steht");

        for partei in [verhandlung.initiator(), verhandlung.responder()] {
            self.melden(
                partei,
                SignalEnvelope::neu(SignalPayload::SipCallEstablished(BridgeRef { bridge_id })),
            )
            .await;
        }

        // Jede Partei wird mit ihrem EIGENEN Leg verdrahtet; der platzierte
        // Anruf verbindet die Legs im Netz
        let mut links = Vec::with_capacity(4);
        let verdrahtung: [(Arc<dyn MediaSource>, Arc<dyn MediaSink>); 4] = [
            (init_leg.peer.clone(), init_leg.endpoint.clone()),
            (init_leg.endpoint.clone(), init_leg.peer.clone()),
            (resp_leg.peer.clone(), resp_leg.endpoint.clone()),
            (resp_leg.endpoint.clone(), resp_leg.peer.clone()),
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

        Ok(CallBridge::neu(bridge_id, init_leg, resp_leg, links))
    }

    /// Baut eine Bruecke ab und raeumt Registry-Zuordnungen auf
    ///
    /// Gibt `false` zurueck wenn der Abbau bereits lief.
    async fn bruecke_entsorgen(&self, bruecke: &Arc<CallBridge>) -> bool {
        let bridge_id = bruecke.bridge_id();
        if !bruecke.abbauen(&self.fabric).await {
            return false;
        }
        self.bruecken.remove(&bridge_id);
        for partei in [
            bruecke.initiator().session_id,
            bruecke.responder().session_id,
        ] {
            if let Ok(session) = self.registry.abrufen(partei) {
                session.bruecke_loesen(bridge_id);
                session.anhaenge_loesen();
            }
        }
        true
    }

    /// Sendet best-effort; Zustellfehler werden geloggt
    async fn melden(&self, session_id: SessionId, nachricht: SignalEnvelope) {
        if let Err(fehler) = self.registry.senden_an(session_id, nachricht).await {
            tracing::warn!(session = %session_id, fehler = %fehler, "Signaling-Zustellung fehlgeschlagen");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
