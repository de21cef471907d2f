//! Konfiguration der Sendeseite
//!
//! Laedt die Konfiguration aus einer TOML-Datei. Fehlende Werte werden mit
//! Standardwerten aufgefuellt, CLI-Flags haben Vorrang.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use portier_core::BefehlsVorlage;
use portier_observability::logging::{log_format_gueltig, log_level_gueltig};

use crate::error::{SenderError, SenderResult};

/// Vollstaendige Sender-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SenderConfig {
    #[serde(default)]
    pub verbindung: VerbindungsEinstellungen,
    #[serde(default)]
    pub anfrage: AnfrageEinstellungen,
    #[serde(default)]
    pub pipeline: PipelineEinstellungen,
    #[serde(default)]
    pub logging: LoggingEinstellungen,
}

/// Adresse des Admission-Servers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbindungsEinstellungen {
    pub host: String,
    pub port: u16,
}

impl Default for VerbindungsEinstellungen {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8999,
        }
    }
}

/// Inhalt der Slot-Anfrage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnfrageEinstellungen {
    pub name: String,
    pub rate_kbps: u32,
    /// Bei vollem Pool in die Warteschlange
    pub warten: bool,
    pub poll_intervall_ms: u64,
}

impl Default for AnfrageEinstellungen {
    fn default() -> Self {
        Self {
            name: "Copain".into(),
            rate_kbps: 128,
            warten: false,
            poll_intervall_ms: 1000,
        }
    }
}

impl AnfrageEinstellungen {
    pub fn poll_intervall(&self) -> Duration {
        Duration::from_millis(self.poll_intervall_ms)
    }
}

/// Externe Medien-Pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineEinstellungen {
    pub programm: String,
    pub argumente: Vec<String>,
    pub beenden_timeout_ms: u64,
}

impl Default for PipelineEinstellungen {
    fn default() -> Self {
        Self {
            programm: "tx".into(),
            argumente: ["-h", "{host}", "-p", "{port}", "-b", "{rate}"]
                .iter()
                .map(|a| a.to_string())
                .collect(),
            beenden_timeout_ms: 3000,
        }
    }
}

impl PipelineEinstellungen {
    pub fn befehl(&self) -> BefehlsVorlage {
        BefehlsVorlage {
            programm: self.programm.clone(),
            argumente: self.argumente.clone(),
        }
    }

    pub fn beenden_timeout(&self) -> Duration {
        Duration::from_millis(self.beenden_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    pub level: String,
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

impl SenderConfig {
    /// Laedt die Konfiguration, Standardwerte falls die Datei fehlt
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(pfad = pfad, "Keine Konfigurationsdatei, verwende Standardwerte");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    pub fn validieren(&self) -> SenderResult<()> {
        if self.verbindung.host.trim().is_empty() {
            return Err(SenderError::Konfiguration("verbindung.host ist leer".into()));
        }
        if self.verbindung.port == 0 {
            return Err(SenderError::Konfiguration(
                "verbindung.port darf nicht 0 sein".into(),
            ));
        }
        if self.anfrage.poll_intervall_ms == 0 {
            return Err(SenderError::Konfiguration(
                "anfrage.poll_intervall_ms muss groesser 0 sein".into(),
            ));
        }
        if self.pipeline.programm.trim().is_empty() {
            return Err(SenderError::Konfiguration("pipeline.programm ist leer".into()));
        }
        if !log_level_gueltig(&self.logging.level) {
            return Err(SenderError::Konfiguration(format!(
                "Unbekanntes Log-Level '{}'",
                self.logging.level
            )));
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(SenderError::Konfiguration(format!(
                "Unbekanntes Log-Format '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte() {
        let cfg = SenderConfig::default();
        assert_eq!(cfg.verbindung.port, 8999);
        assert_eq!(cfg.anfrage.name, "Copain");
        assert!(!cfg.anfrage.warten);
        assert_eq!(cfg.anfrage.poll_intervall(), Duration::from_secs(1));
        assert_eq!(
            cfg.pipeline
                .befehl()
                .anzeige(&[("host", "10.0.0.1"), ("port", "9000"), ("rate", "128")]),
            "tx -h 10.0.0.1 -p 9000 -b 128"
        );
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn teilweise_toml() {
        let cfg: SenderConfig = toml::from_str(
            r#"
            [verbindung]
            host = "studio.local"

            [anfrage]
            warten = true
            poll_intervall_ms = 250
        "#,
        )
        .unwrap();
        assert_eq!(cfg.verbindung.host, "studio.local");
        assert_eq!(cfg.verbindung.port, 8999);
        assert!(cfg.anfrage.warten);
        assert_eq!(cfg.anfrage.poll_intervall(), Duration::from_millis(250));
        assert_eq!(cfg.anfrage.rate_kbps, 128);
    }

    #[test]
    fn ungueltige_werte() {
        let mut cfg = SenderConfig::default();
        cfg.anfrage.poll_intervall_ms = 0;
        assert!(cfg.validieren().is_err());

        let mut cfg = SenderConfig::default();
        cfg.verbindung.port = 0;
        assert!(cfg.validieren().is_err());

        let mut cfg = SenderConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standard() {
        let cfg = SenderConfig::laden("/nicht/vorhanden/portier-sender.toml").unwrap();
        assert_eq!(cfg.anfrage.name, "Copain");
    }
}
