//! Fehlertypen fuer Trunkline
//!
//! Zentraler Fehler-Enum der alle moeglichen Fehlerzustaende abdeckt.
//! Veraltete Referenzen (UnbekannteBruecke/UnbekannteSession) sind fuer den
//! Aufrufer ein Hinweis auf bereits beendete Ressourcen und nie fatal.

use thiserror::Error;

use crate::types::{BridgeId, EndpointId, LinkId, SessionId};

/// Globaler Result-Alias fuer Trunkline
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Alle moeglichen Fehler im Trunkline-System
#[derive(Debug, Error)]
pub enum GatewayError {
    // --- Veraltete Referenzen ---
    #[error("Unbekannte Bruecke: {0}")]
    UnbekannteBruecke(BridgeId),

    #[error("Unbekannte Session: {0}")]
    UnbekannteSession(SessionId),

    // --- Brueckenaufbau ---
    #[error("Kein Telefonie-Transport fuer Session {0} verfuegbar")]
    TransportNichtVerfuegbar(SessionId),

    #[error("Telefonie-Anruf fehlgeschlagen: {0}")]
    TelefonieAnrufFehlgeschlagen(String),

    // --- Relay Fabric (Invarianten-Verletzungen, intern) ---
    #[error("Relay-Link existiert bereits: {quelle} -> {senke}")]
    LinkExistiert { quelle: EndpointId, senke: EndpointId },

    #[error("Relay-Link nicht gefunden: {0}")]
    LinkNichtGefunden(LinkId),

    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    // --- Intern ---
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl GatewayError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler eine veraltete Referenz anzeigt
    ///
    /// Solche Fehler bedeuten "Ressource bereits beendet" und werden
    /// geloggt statt an den Client eskaliert.
    pub fn ist_veraltet(&self) -> bool {
        matches!(
            self,
            Self::UnbekannteBruecke(_) | Self::UnbekannteSession(_)
        )
    }

    /// Kurzer maschinenlesbarer Grund fuer `*-failed`-Nachrichten
    pub fn grund(&self) -> String {
        match self {
            Self::TransportNichtVerfuegbar(_) => "transport-unavailable".into(),
            Self::TelefonieAnrufFehlgeschlagen(_) => "telephony-call-failure".into(),
            Self::UnbekannteBruecke(_) => "unknown-bridge".into(),
            Self::UnbekannteSession(_) => "unknown-session".into(),
            andere => andere.to_string(),
        }
    }
}
