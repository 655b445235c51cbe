//! Kollaborator-Traits – die schmalen Schnittstellen des Kerns
//!
//! Der Kern kennt Realtime Peers und Telefonie-Endpunkte nur ueber diese
//! Traits. Transaktions-Retransmission, ICE, Verschluesselung und Codec-
//! Verhandlung sind Sache der Implementierungen.
//!
//! ## Paket-Events als explizite Abos
//! `abonnieren` gibt einen broadcast-Receiver auf den Paketstrom der Quelle
//! zurueck. Jeder Relay-Link haelt genau ein Abo und gibt es beim Entfernen
//! frei – kein wiederholtes Registrieren von Callbacks pro Neuverhandlung.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use trunkline_core::{EndpointId, Result, SessionId};
use trunkline_protocol::media::MediaPacket;
use trunkline_protocol::signal::{IceCandidate, SessionDescription};

/// Gemeinsame Identitaet aller Medien-Endpunkte
pub trait MediaEndpoint: Send + Sync {
    /// Stabile ID des Endpunkts (fuer Duplikat-Erkennung der Relay Fabric)
    fn endpoint_id(&self) -> EndpointId;
}

/// Produzent von Medien-Paketen
pub trait MediaSource: MediaEndpoint {
    /// Abonniert den Paketstrom dieses Endpunkts
    ///
    /// Pakete die produziert werden solange kein Abonnent existiert
    /// werden verworfen, nie gepuffert.
    fn abonnieren(&self) -> broadcast::Receiver<MediaPacket>;
}

/// Konsument von Medien-Paketen
pub trait MediaSink: MediaEndpoint {
    /// Liefert ein Paket nicht-blockierend an den Endpunkt
    ///
    /// Darf nie blockieren; Zustellung ist best-effort (UDP-Semantik).
    fn paket_senden(&self, paket: MediaPacket);
}

/// Ein Telefonie-Leg: Signalisierung + Medien zum Call-Control-Netz
#[async_trait]
pub trait TelephonyEndpoint: MediaSource + MediaSink {
    /// Rufadresse dieses Legs (Ziel fuer die Gegenseite)
    fn adresse(&self) -> String;

    /// Platziert einen Anruf zum Ziel; blockiert bis das Netz antwortet
    async fn anrufen(&self, ziel: &str) -> Result<()>;

    /// Nimmt einen eingehenden Anruf an
    async fn annehmen(&self) -> Result<()>;

    /// Legt auf. Fehler werden vom Aufrufer geloggt, nie erneut versucht.
    async fn auflegen(&self) -> Result<()>;
}

/// Eine Browser-Peer-Verbindung: SDP-Verhandlung + Medien
#[async_trait]
pub trait RealtimePeer: MediaSource + MediaSink {
    /// Erzeugt ein SDP-Offer; blockiert waehrend der Generierung
    async fn offer_erstellen(&self) -> Result<SessionDescription>;

    /// Erzeugt ein SDP-Answer auf die zuletzt gesetzte Remote-Description
    async fn answer_erstellen(&self) -> Result<SessionDescription>;

    /// Setzt die lokale Session-Description
    async fn local_description_setzen(&self, sdp: SessionDescription) -> Result<()>;

    /// Setzt die entfernte Session-Description
    async fn remote_description_setzen(&self, sdp: SessionDescription) -> Result<()>;

    /// Fuegt einen ICE-Kandidaten der Gegenseite hinzu
    fn ice_kandidat_hinzufuegen(&self, kandidat: IceCandidate) -> Result<()>;

    /// Schliesst die Peer-Verbindung (idempotent)
    fn schliessen(&self);
}

/// Stellt frische Telefonie-Endpunkte fuer den Brueckenaufbau bereit
#[async_trait]
pub trait TelephonyEndpointFactory: Send + Sync {
    /// Allokiert ein neues Telefonie-Leg fuer die gegebene Session
    async fn bereitstellen(&self, session_id: SessionId) -> Result<Arc<dyn TelephonyEndpoint>>;
}

/// Stellt frische Realtime Peers bereit
#[async_trait]
pub trait RealtimePeerFactory: Send + Sync {
    /// Allokiert eine neue Peer-Verbindung fuer die gegebene Session
    async fn bereitstellen(&self, session_id: SessionId) -> Result<Arc<dyn RealtimePeer>>;
}
