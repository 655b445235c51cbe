//! trunkline-relay – die Relay Fabric
//!
//! Gerichtete, einzeln schaltbare Medien-Links zwischen Quelle und Senke.
//! Jeder Link haelt genau ein Abo auf die Quelle und leitet Pakete
//! unveraendert weiter solange sein Tor offen ist.

pub mod fabric;

pub use fabric::RelayFabric;
