//! Bruecken-Verhandlung – das Zwei-Parteien-Handshake
//!
//! Eine vorgeschlagene Bruecke wird erst befoerdert wenn BEIDE Parteien
//! zugestimmt haben; eine einzelne Ablehnung beendet die Verhandlung
//! endgueltig. Die Zustandsmaschine selbst ist nicht nebenlaeufigkeitsfest –
//! der Manager linearisiert alle Uebergaenge ueber einen Mutex pro Bruecke.

use trunkline_core::{BridgeId, GatewayError, Result, SessionId};

/// Zustand einer Bruecken-Verhandlung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Vorgeschlagen, noch keine Zustimmung
    Vorgeschlagen,
    /// Nur der Initiator hat zugestimmt
    InitiatorZugestimmt,
    /// Nur der Responder hat zugestimmt
    ResponderZugestimmt,
    /// Beide haben zugestimmt; die Befoerderung steht an
    BeideZugestimmt,
    /// Zur Anruf-Bruecke befoerdert (Endzustand)
    Befoerdert,
    /// Von einer Partei abgelehnt (Endzustand)
    Abgelehnt,
    /// Befoerderung fehlgeschlagen (Endzustand)
    Fehlgeschlagen,
}

impl NegotiationState {
    /// Gibt true zurueck wenn die Verhandlung abgeschlossen ist
    pub fn ist_endzustand(&self) -> bool {
        matches!(
            self,
            Self::Befoerdert | Self::Abgelehnt | Self::Fehlgeschlagen
        )
    }
}

/// Eine laufende Bruecken-Verhandlung zwischen zwei Sessions
#[derive(Debug)]
pub struct Negotiation {
    bridge_id: BridgeId,
    initiator: SessionId,
    responder: SessionId,
    zustand: NegotiationState,
}

impl Negotiation {
    /// Erstellt eine frische Verhandlung im Zustand `Vorgeschlagen`
    pub fn neu(initiator: SessionId, responder: SessionId) -> Self {
        Self {
            bridge_id: BridgeId::new(),
            initiator,
            responder,
            zustand: NegotiationState::Vorgeschlagen,
        }
    }

    pub fn bridge_id(&self) -> BridgeId {
        self.bridge_id
    }

    pub fn initiator(&self) -> SessionId {
        self.initiator
    }

    pub fn responder(&self) -> SessionId {
        self.responder
    }

    pub fn zustand(&self) -> NegotiationState {
        self.zustand
    }

    /// Die Gegenseite der gegebenen Partei
    pub fn gegenseite(&self, session_id: SessionId) -> Option<SessionId> {
        if session_id == self.initiator {
            Some(self.responder)
        } else if session_id == self.responder {
            Some(self.initiator)
        } else {
            None
        }
    }

    /// Gibt true zurueck wenn die Session Partei dieser Verhandlung ist
    pub fn ist_partei(&self, session_id: SessionId) -> bool {
        session_id == self.initiator || session_id == self.responder
    }

    /// Verbucht die Zustimmung einer Partei
    ///
    /// Gibt `true` zurueck genau beim Uebergang nach `BeideZugestimmt` –
    /// der Aufrufer befoerdert dann (und nur dann). Zustimmungen nach
    /// einem Endzustand sind veraltet und ein Fehler fuer den Aufrufer
    /// zum Loggen, nie zum Eskalieren.
    pub fn zustimmen(&mut self, session_id: SessionId) -> Result<bool> {
        if !self.ist_partei(session_id) {
            return Err(GatewayError::UngueltigeNachricht(format!(
                "{session_id} ist keine Partei von {}",
                self.bridge_id
            )));
        }
        if self.zustand.ist_endzustand() {
            return Err(GatewayError::UnbekannteBruecke(self.bridge_id));
        }

        let ist_initiator = session_id == self.initiator;
        self.zustand = match (self.zustand, ist_initiator) {
            (NegotiationState::Vorgeschlagen, true) => NegotiationState::InitiatorZugestimmt,
            (NegotiationState::Vorgeschlagen, false) => NegotiationState::ResponderZugestimmt,
            (NegotiationState::InitiatorZugestimmt, false) => NegotiationState::BeideZugestimmt,
            (NegotiationState::ResponderZugestimmt, true) => NegotiationState::BeideZugestimmt,
            // Doppelte Zustimmung derselben Partei: kein Uebergang
            (unveraendert, _) => unveraendert,
        };
        Ok(self.zustand == NegotiationState::BeideZugestimmt)
    }

    /// Verbucht die Ablehnung einer Partei (Endzustand)
    pub fn ablehnen(&mut self, session_id: SessionId) -> Result<()> {
        if !self.ist_partei(session_id) {
            return Err(GatewayError::UngueltigeNachricht(format!(
                "{session_id} ist keine Partei von {}",
                self.bridge_id
            )));
        }
        if self.zustand.ist_endzustand() {
            return Err(GatewayError::UnbekannteBruecke(self.bridge_id));
        }
        self.zustand = NegotiationState::Abgelehnt;
        Ok(())
    }

    /// Markiert die Verhandlung als befoerdert
    ///
    /// Nur aus `BeideZugestimmt` erlaubt; stellt sicher dass hoechstens
    /// eine Befoerderung stattfindet.
    pub fn befoerdern(&mut self) -> Result<()> {
        if self.zustand != NegotiationState::BeideZugestimmt {
            return Err(GatewayError::intern(format!(
                "Befoerderung von {} im Zustand {:?}",
                self.bridge_id, self.zustand
            )));
        }
        self.zustand = NegotiationState::Befoerdert;
        Ok(())
    }

    /// Markiert die Befoerderung als fehlgeschlagen
    pub fn fehlschlagen(&mut self) {
        self.zustand = NegotiationState::Fehlgeschlagen;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
