//! trunkline-protocol – Signaling-Protokoll und Medien-Pakete
//!
//! Definiert den JSON-Umschlag fuer die Signaling-Verbindung, die
//! SDP/ICE-Nutzdaten und das opake Medien-Paket das die Relay Fabric
//! unveraendert weiterleitet.

pub mod media;
pub mod signal;
pub mod wire;

pub use media::MediaPacket;
pub use signal::{SignalEnvelope, SignalPayload};
pub use wire::SignalCodec;
