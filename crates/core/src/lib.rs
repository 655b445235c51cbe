//! trunkline-core – Gemeinsame Grundlagen
//!
//! Enthaelt die ID-Typen und den zentralen Fehler-Enum, die von allen
//! anderen Trunkline-Crates verwendet werden.

pub mod error;
pub mod types;

pub use error::{GatewayError, Result};
pub use types::{BridgeId, EndpointId, LinkId, SessionId};
