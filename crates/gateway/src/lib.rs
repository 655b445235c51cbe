//! trunkline-gateway – Dispatcher und Signaling-Transport
//!
//! Der Dispatcher setzt eingehende Signaling-Nachrichten in Operationen
//! auf Registry, Bruecken-Manager und Relay Fabric um; die TCP-Schicht
//! traegt die frame-basierte Signaling-Verbindung.

pub mod connection;
pub mod dispatcher;
pub mod tcp;

pub use dispatcher::GatewayDispatcher;
pub use tcp::GatewayServer;
