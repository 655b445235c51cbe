//! trunkline-session – Session-Registry und Signaling-Kanaele
//!
//! Eine Session ist ein verbundener Signaling-Client mit stabiler ID,
//! seinem Sendekanal und optional angehaengten Medien-Endpunkten.
//! Die Registry ist die einzige Quelle der Wahrheit ueber aktive Sessions.

pub mod kanal;
pub mod registry;

pub use kanal::{MpscSignalChannel, SignalChannel};
pub use registry::{Session, SessionRegistry};
