//! trunkline-bridge – Bruecken zwischen zwei Sessions
//!
//! Eine Bruecke entsteht zweistufig: erst die Verhandlung (beide Parteien
//! muessen zustimmen), dann die Befoerderung zur Anruf-Bruecke mit
//! platziertem Telefonie-Anruf und aktiven Relay-Links.

pub mod call_bridge;
pub mod manager;
pub mod negotiation;

pub use call_bridge::CallBridge;
pub use manager::BridgeManager;
pub use negotiation::{Negotiation, NegotiationState};
