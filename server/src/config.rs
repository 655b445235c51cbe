//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass das Gateway ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};

/// Vollstaendige Gateway-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ServerConfig {
    /// Allgemeine Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Telefonie-Einstellungen
    pub telefonie: TelefonieEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Gateways
    pub name: String,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Trunkline Gateway".into(),
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer die Signaling-Verbindung
    pub bind_adresse: String,
    /// Port fuer die Signaling-Verbindung
    pub signaling_port: u16,
    /// Maximale Frame-Groesse in KB
    pub max_frame_kb: usize,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            signaling_port: 8089,
            max_frame_kb: 256,
        }
    }
}

/// Telefonie-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelefonieEinstellungen {
    /// Adresse des Telefonie-Trunks (Adress-Praefix der vergebenen Legs)
    pub trunk_adresse: String,
}

impl Default for TelefonieEinstellungen {
    fn default() -> Self {
        Self {
            trunk_adresse: "trunk.local".into(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer das Signaling zurueck
    pub fn signaling_bind_adresse(&self) -> String {
        format!(
            "{}:{}",
            self.netzwerk.bind_adresse, self.netzwerk.signaling_port
        )
    }

    /// Maximale Frame-Groesse in Bytes
    pub fn max_frame_size(&self) -> usize {
        self.netzwerk.max_frame_kb * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.netzwerk.signaling_port, 8089);
        assert_eq!(cfg.telefonie.trunk_adresse, "trunk.local");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adresse_und_frame_limit() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.signaling_bind_adresse(), "0.0.0.0:8089");
        assert_eq!(cfg.max_frame_size(), 256 * 1024);
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Mein Gateway"

            [netzwerk]
            signaling_port = 9000

            [telefonie]
            trunk_adresse = "sip.example.net"
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Mein Gateway");
        assert_eq!(cfg.netzwerk.signaling_port, 9000);
        assert_eq!(cfg.telefonie.trunk_adresse, "sip.example.net");
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.max_frame_kb, 256);
    }
}
