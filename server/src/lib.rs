//! trunkline-server – Bibliotheks-Root
//!
//! Deklariert die Server-Module und stellt den oeffentlichen
//! Einstiegspunkt fuer Integrationstests bereit.

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use trunkline_endpoint::{LoopbackEndpointFactory, LoopbackPeerFactory};
use trunkline_gateway::{GatewayDispatcher, GatewayServer};

/// Haelt den laufenden Gateway-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet das Gateway und laeuft bis zum Shutdown-Signal
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            name = %self.config.server.name,
            signaling = %self.config.signaling_bind_adresse(),
            trunk = %self.config.telefonie.trunk_adresse,
            "Gateway startet"
        );

        let dispatcher = GatewayDispatcher::neu(
            LoopbackPeerFactory::neu(),
            LoopbackEndpointFactory::neu(self.config.telefonie.trunk_adresse.clone()),
        );
        let gateway = GatewayServer::mit_frame_limit(dispatcher, self.config.max_frame_size());

        let adresse = self.config.signaling_bind_adresse();
        tokio::select! {
            ergebnis = gateway.starten(&adresse) => {
                ergebnis?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown-Signal empfangen, Gateway wird beendet");
            }
        }

        Ok(())
    }
}
