//! Relay Fabric – gerichtete Paket-Links
//!
//! Ein Link ist (Quelle, Senke) plus ein atomares Tor. Beim Installieren
//! wird genau ein Abo auf die Quelle genommen und eine Weiterleitungs-Task
//! gestartet; das Tor wird pro Paket geprueft, ein Deaktivieren wirkt also
//! vor jeder weiteren Zustellung. Links starten geschlossen.
//!
//! Pro (Quelle, Senke)-Paar existiert hoechstens ein Link; ein zweites
//! Installieren desselben Paars ist ein Programmierfehler des Aufrufers
//! und schlaegt fehl statt Pakete zu verdoppeln.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use trunkline_core::{EndpointId, GatewayError, LinkId, Result};
use trunkline_endpoint::{MediaSink, MediaSource};

/// Ein installierter Link (intern)
struct RelayLink {
    quelle: EndpointId,
    senke: EndpointId,
    /// Tor: nur bei true werden Pakete zugestellt
    aktiv: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Die Relay Fabric: alle aktiven Medien-Links des Gateways
#[derive(Default)]
pub struct RelayFabric {
    links: DashMap<LinkId, RelayLink>,
    /// Index (Quelle, Senke) -> Link fuer die Duplikat-Erkennung
    paare: DashMap<(EndpointId, EndpointId), LinkId>,
}

impl RelayFabric {
    /// Erstellt eine leere Fabric
    pub fn neu() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Installiert einen Link von `quelle` nach `senke`
    ///
    /// Der Link startet deaktiviert: das Abo laeuft bereits, Pakete werden
    /// aber verworfen bis `aktivieren` gerufen wird. Ein bereits
    /// installiertes (Quelle, Senke)-Paar fuehrt zu `LinkExistiert`.
    pub fn installieren(
        &self,
        quelle: Arc<dyn MediaSource>,
        senke: Arc<dyn MediaSink>,
    ) -> Result<LinkId> {
        let quelle_id = quelle.endpoint_id();
        let senke_id = senke.endpoint_id();
        let paar = (quelle_id, senke_id);

        let link_id = LinkId::new();
        // Paar-Index zuerst: der Entry-Eintrag entscheidet das Rennen
        // zweier gleichzeitiger Installationen desselben Paars
        match self.paare.entry(paar) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(GatewayError::LinkExistiert {
                    quelle: quelle_id,
                    senke: senke_id,
                });
            }
            dashmap::mapref::entry::Entry::Vacant(eintrag) => {
                eintrag.insert(link_id);
            }
        }

        let aktiv = Arc::new(AtomicBool::new(false));
        let mut abo = quelle.abonnieren();
        let tor = Arc::clone(&aktiv);

        let task = tokio::spawn(async move {
            loop {
                match abo.recv().await {
                    Ok(paket) => {
                        // Tor pro Paket pruefen: deaktivieren wirkt sofort
                        if tor.load(Ordering::SeqCst) {
                            senke.paket_senden(paket);
                        }
                    }
                    Err(RecvError::Lagged(verpasst)) => {
                        tracing::warn!(
                            quelle = %quelle_id,
                            senke = %senke_id,
                            verpasst,
                            "Relay-Link hinkt hinterher, Pakete verworfen"
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!(quelle = %quelle_id, senke = %senke_id, "Relay-Link-Task beendet");
        });

        self.links.insert(
            link_id,
            RelayLink {
                quelle: quelle_id,
                senke: senke_id,
                aktiv,
                task,
            },
        );
        tracing::debug!(link = %link_id, quelle = %quelle_id, senke = %senke_id, "Relay-Link installiert");
        Ok(link_id)
    }

    /// Oeffnet das Tor eines Links
    pub fn aktivieren(&self, link_id: LinkId) -> Result<()> {
        let link = self
            .links
            .get(&link_id)
            .ok_or(GatewayError::LinkNichtGefunden(link_id))?;
        link.aktiv.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Schliesst das Tor eines Links
    ///
    /// Wirkt vor jeder weiteren Zustellung; das Abo bleibt bestehen.
    pub fn deaktivieren(&self, link_id: LinkId) -> Result<()> {
        let link = self
            .links
            .get(&link_id)
            .ok_or(GatewayError::LinkNichtGefunden(link_id))?;
        link.aktiv.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Entfernt einen Link: Tor schliessen, Abo freigeben, Task beenden
    ///
    /// Idempotent: ein bereits entfernter Link ist kein Fehler.
    pub fn entfernen(&self, link_id: LinkId) {
        if let Some((_, link)) = self.links.remove(&link_id) {
            link.aktiv.store(false, Ordering::SeqCst);
            link.task.abort();
            self.paare.remove(&(link.quelle, link.senke));
            tracing::debug!(link = %link_id, "Relay-Link entfernt");
        }
    }

    /// Entfernt mehrere Links (Brueckenabbau)
    pub fn alle_entfernen(&self, link_ids: &[LinkId]) {
        for id in link_ids {
            self.entfernen(*id);
        }
    }

    /// Gibt true zurueck wenn das Tor des Links offen ist
    pub fn ist_aktiv(&self, link_id: LinkId) -> bool {
        self.links
            .get(&link_id)
            .map(|l| l.aktiv.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Anzahl installierter Links
    pub fn anzahl(&self) -> usize {
        self.links.len()
    }
}

impl Drop for RelayFabric {
    fn drop(&mut self) {
        for eintrag in self.links.iter() {
            eintrag.task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
