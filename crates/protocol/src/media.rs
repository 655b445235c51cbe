//! Medien-Paket – opake Echtzeit-Einheit
//!
//! Ein `MediaPacket` ist ein bereits kodiertes Medien-Stueck mit
//! Zeit-Metadaten. Die Relay Fabric reicht es unveraendert weiter und
//! interpretiert die Nutzdaten nie.

use bytes::Bytes;

/// Ein opakes, bereits kodiertes Medien-Paket
///
/// Entspricht dem Tupel (Payload, Timestamp, Marker, Format) das die
/// Kollaborator-Endpunkte produzieren und konsumieren. `Bytes` macht das
/// Klonen beim Fan-out billig (kein Memcpy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    /// Kodierte Nutzdaten – werden nie inspiziert oder veraendert
    pub payload: Bytes,
    /// Medien-Timestamp des Produzenten
    pub timestamp: u32,
    /// Marker-Bit (z.B. Ende eines Frames)
    pub marker: bool,
    /// Format-Tag (Payload-Typ des Produzenten)
    pub format: u8,
}

impl MediaPacket {
    /// Erstellt ein neues Medien-Paket
    pub fn neu(payload: impl Into<Bytes>, timestamp: u32, marker: bool, format: u8) -> Self {
        Self {
            payload: payload.into(),
            timestamp,
            marker,
            format,
        }
    }

    /// Groesse der Nutzdaten in Bytes
    pub fn groesse(&self) -> usize {
        self.payload.len()
    }
}
