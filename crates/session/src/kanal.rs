//! Signaling-Kanaele – der Rueckweg vom Gateway zum Client
//!
//! Der Dispatcher sendet nie direkt auf Sockets. Jede Session traegt einen
//! `SignalChannel`; die TCP-Schicht haengt dahinter eine Writer-Task, Tests
//! haengen einen nackten mpsc-Receiver dahinter.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use trunkline_core::{GatewayError, Result};
use trunkline_protocol::SignalEnvelope;

/// Kapazitaet der Sendewarteschlange pro Session (Nachrichten)
pub const SENDE_QUEUE_GROESSE: usize = 64;

/// Sendekanal einer Session Richtung Client
#[async_trait]
pub trait SignalChannel: Send + Sync {
    /// Stellt eine Nachricht in die Sendewarteschlange der Session
    ///
    /// Fehler bedeuten "Kanal geschlossen" – der Aufrufer loggt und
    /// behandelt die Session als getrennt.
    async fn senden(&self, nachricht: SignalEnvelope) -> Result<()>;

    /// Schliesst den Kanal (idempotent); weitere `senden` schlagen fehl
    fn schliessen(&self);
}

/// mpsc-basierter Signaling-Kanal
///
/// Die produktive Writer-Task und die Tests konsumieren denselben Receiver.
pub struct MpscSignalChannel {
    sender: mpsc::Sender<SignalEnvelope>,
    geschlossen: AtomicBool,
}

impl MpscSignalChannel {
    /// Erstellt einen Kanal mit Standard-Kapazitaet
    ///
    /// Gibt den Kanal und den zugehoerigen Receiver zurueck; der Receiver
    /// gehoert der Writer-Task (oder dem Test).
    pub fn neu() -> (Arc<Self>, mpsc::Receiver<SignalEnvelope>) {
        Self::mit_kapazitaet(SENDE_QUEUE_GROESSE)
    }

    /// Erstellt einen Kanal mit benutzerdefinierter Kapazitaet
    pub fn mit_kapazitaet(kapazitaet: usize) -> (Arc<Self>, mpsc::Receiver<SignalEnvelope>) {
        let (sender, receiver) = mpsc::channel(kapazitaet);
        (
            Arc::new(Self {
                sender,
                geschlossen: AtomicBool::new(false),
            }),
            receiver,
        )
    }
}

#[async_trait]
impl SignalChannel for MpscSignalChannel {
    async fn senden(&self, nachricht: SignalEnvelope) -> Result<()> {
        if self.geschlossen.load(Ordering::SeqCst) {
            return Err(GatewayError::intern("Signaling-Kanal geschlossen"));
        }
        self.sender
            .send(nachricht)
            .await
            .map_err(|_| GatewayError::intern("Signaling-Kanal geschlossen"))
    }

    fn schliessen(&self) {
        self.geschlossen.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trunkline_protocol::SignalPayload;

    #[tokio::test]
    async fn senden_erreicht_receiver() {
        let (kanal, mut rx) = MpscSignalChannel::neu();
        kanal
            .senden(SignalEnvelope::neu(SignalPayload::HangUp))
            .await
            .unwrap();

        let nachricht = rx.recv().await.expect("Nachricht erwartet");
        assert!(matches!(nachricht.payload, SignalPayload::HangUp));
    }

    #[tokio::test]
    async fn geschlossener_kanal_verweigert() {
        let (kanal, _rx) = MpscSignalChannel::neu();
        kanal.schliessen();

        let ergebnis = kanal.senden(SignalEnvelope::neu(SignalPayload::HangUp)).await;
        assert!(ergebnis.is_err());
    }

    #[tokio::test]
    async fn fallengelassener_receiver_verweigert() {
        let (kanal, rx) = MpscSignalChannel::neu();
        drop(rx);

        let ergebnis = kanal.senden(SignalEnvelope::neu(SignalPayload::HangUp)).await;
        assert!(ergebnis.is_err());
    }
}
