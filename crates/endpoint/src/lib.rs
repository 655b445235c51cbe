//! trunkline-endpoint – Kollaborator-Schnittstellen
//!
//! Definiert die schmalen Traits ueber die der Kern mit Realtime Peers
//! (Browser-Seite) und Telefonie-Endpunkten (Netz-Seite) spricht, sowie
//! Loopback-Implementierungen fuer Tests und den Demo-Betrieb des Servers.

pub mod loopback;
pub mod traits;

pub use loopback::{LoopbackEndpoint, LoopbackEndpointFactory, LoopbackPeer, LoopbackPeerFactory};
pub use traits::{
    MediaEndpoint, MediaSink, MediaSource, RealtimePeer, RealtimePeerFactory, TelephonyEndpoint,
    TelephonyEndpointFactory,
};
