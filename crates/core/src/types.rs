//! Gemeinsame Identifikationstypen fuer Trunkline
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige Session-ID eines Signaling-Clients
///
/// Stabil fuer die Lebensdauer des Signaling-Kanals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }

    /// Parst eine SessionId aus ihrer String-Darstellung
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Eindeutige Bruecken-ID
///
/// Wird bei der Verhandlung vergeben und von der spaeteren CallBridge
/// uebernommen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgeId(pub Uuid);

impl BridgeId {
    /// Erstellt eine neue zufaellige BridgeId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for BridgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BridgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bridge:{}", self.0)
    }
}

/// Eindeutige ID eines Relay-Links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(pub Uuid);

impl LinkId {
    /// Erstellt eine neue zufaellige LinkId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link:{}", self.0)
    }
}

/// Eindeutige ID eines Medien-Endpunkts (Realtime Peer oder Telefonie-Leg)
///
/// Dient der Relay Fabric zur Duplikat-Erkennung von (Quelle, Senke)-Paaren.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub Uuid);

impl EndpointId {
    /// Erstellt eine neue zufaellige EndpointId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "endpoint:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_eindeutig() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b, "Zwei neue SessionIds muessen verschieden sein");
    }

    #[test]
    fn bridge_id_eindeutig() {
        let a = BridgeId::new();
        let b = BridgeId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn link_id_display() {
        let id = LinkId(Uuid::nil());
        assert!(id.to_string().starts_with("link:"));
    }

    #[test]
    fn session_id_parse_roundtrip() {
        let id = SessionId::new();
        let geparst = SessionId::parse(&id.inner().to_string()).unwrap();
        assert_eq!(id, geparst);
        assert!(SessionId::parse("kein-uuid").is_none());
    }

    #[test]
    fn ids_sind_serde_kompatibel() {
        let sid = SessionId::new();
        let json = serde_json::to_string(&sid).unwrap();
        let sid2: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(sid, sid2);

        let bid = BridgeId::new();
        let json = serde_json::to_string(&bid).unwrap();
        let bid2: BridgeId = serde_json::from_str(&json).unwrap();
        assert_eq!(bid, bid2);
    }
}
