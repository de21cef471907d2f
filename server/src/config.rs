//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist. Kommandozeilen-Flags ueberschreiben einzelne Werte
//! (siehe [`crate::cli`]).

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use portier_core::{BefehlsVorlage, PortierError};
use portier_observability::logging::{log_format_gueltig, log_level_gueltig};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Slot-Pool
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen (Admission-Listener)
    pub netzwerk: NetzwerkEinstellungen,
    /// Worker-Prozesse
    pub worker: WorkerEinstellungen,
    /// Warteschlange
    pub warteschlange: WarteschlangenEinstellungen,
    /// Admin-Kanal
    pub commander: CommanderEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Slot-Pool-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzahl Slots (= Worker-Prozesse)
    pub slots: usize,
    /// Port des ersten Slots; weitere folgen aufsteigend
    pub basis_port: u16,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            slots: 4,
            basis_port: 9000,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer alle Listener
    pub bind_adresse: String,
    /// Port des Admission-Protokolls
    pub admission_port: u16,
    /// Maximale gleichzeitige Admission-Verbindungen
    pub max_verbindungen: usize,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            admission_port: 8999,
            max_verbindungen: 256,
        }
    }
}

/// Worker-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerEinstellungen {
    /// Empfaengerprogramm
    pub programm: String,
    /// Argumente, `{port}` wird durch den Slot-Port ersetzt
    pub argumente: Vec<String>,
    /// Grace-Period zwischen SIGTERM und kill
    pub beenden_timeout_ms: u64,
    /// Beendete Worker automatisch neu starten
    pub neustart: bool,
    /// Wartezeit vor einem Neustart
    pub neustart_verzoegerung_ms: u64,
}

impl Default for WorkerEinstellungen {
    fn default() -> Self {
        Self {
            programm: "rx".into(),
            argumente: vec!["-p".into(), "{port}".into()],
            beenden_timeout_ms: 3000,
            neustart: false,
            neustart_verzoegerung_ms: 1000,
        }
    }
}

impl WorkerEinstellungen {
    pub fn befehl(&self) -> BefehlsVorlage {
        BefehlsVorlage {
            programm: self.programm.clone(),
            argumente: self.argumente.clone(),
        }
    }

    pub fn beenden_timeout(&self) -> Duration {
        Duration::from_millis(self.beenden_timeout_ms)
    }

    pub fn neustart_verzoegerung(&self) -> Duration {
        Duration::from_millis(self.neustart_verzoegerung_ms)
    }
}

/// Warteschlangen-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarteschlangenEinstellungen {
    /// Wartende ohne Poll nach dieser Zeit verdraengen (0 = nie)
    pub poll_timeout_sek: u64,
}

impl Default for WarteschlangenEinstellungen {
    fn default() -> Self {
        Self {
            poll_timeout_sek: 30,
        }
    }
}

impl WarteschlangenEinstellungen {
    pub fn poll_timeout(&self) -> Option<Duration> {
        (self.poll_timeout_sek > 0).then(|| Duration::from_secs(self.poll_timeout_sek))
    }
}

/// Admin-Kanal-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommanderEinstellungen {
    /// Aktiviert den Admin-Kanal
    pub aktiviert: bool,
    /// Bind-Adresse (Standard: nur lokal)
    pub bind_adresse: String,
    /// Port des Admin-Kanals
    pub port: u16,
    /// Passwort fuer `login` (leer = keine Anmeldung noetig)
    pub passwort: Option<String>,
    /// Maximale gleichzeitige Admin-Verbindungen
    pub max_verbindungen: usize,
}

impl Default for CommanderEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: false,
            bind_adresse: "127.0.0.1".into(),
            port: 8998,
            passwort: None,
            max_verbindungen: 8,
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

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
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

    /// Prueft die Konfiguration vor dem Start
    pub fn validieren(&self) -> portier_core::Result<()> {
        let s = &self.server;
        if s.slots == 0 {
            return Err(PortierError::konfiguration("server.slots muss mindestens 1 sein"));
        }
        if s.basis_port == 0 {
            return Err(PortierError::konfiguration("server.basis_port darf nicht 0 sein"));
        }
        let letzter = u16::try_from(s.slots - 1)
            .ok()
            .and_then(|abstand| s.basis_port.checked_add(abstand))
            .ok_or_else(|| {
                PortierError::konfiguration(format!(
                    "{} Slots ab Port {} ueberschreiten 65535",
                    s.slots, s.basis_port
                ))
            })?;

        let im_slot_bereich = |port: u16| (s.basis_port..=letzter).contains(&port);
        if im_slot_bereich(self.netzwerk.admission_port) {
            return Err(PortierError::konfiguration(format!(
                "netzwerk.admission_port {} liegt im Slot-Bereich",
                self.netzwerk.admission_port
            )));
        }
        if self.commander.aktiviert {
            if im_slot_bereich(self.commander.port) {
                return Err(PortierError::konfiguration(format!(
                    "commander.port {} liegt im Slot-Bereich",
                    self.commander.port
                )));
            }
            if self.commander.port != 0
                && self.commander.port == self.netzwerk.admission_port
                && self.commander.bind_adresse == self.netzwerk.bind_adresse
            {
                return Err(PortierError::konfiguration(
                    "commander.port und netzwerk.admission_port sind gleich",
                ));
            }
        }
        if self.netzwerk.max_verbindungen == 0 {
            return Err(PortierError::konfiguration(
                "netzwerk.max_verbindungen muss mindestens 1 sein",
            ));
        }
        if self.worker.programm.trim().is_empty() {
            return Err(PortierError::konfiguration("worker.programm ist leer"));
        }
        if !log_level_gueltig(&self.logging.level) {
            return Err(PortierError::konfiguration(format!(
                "Unbekanntes Log-Level '{}'",
                self.logging.level
            )));
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(PortierError::konfiguration(format!(
                "Unbekanntes Log-Format '{}'",
                self.logging.format
            )));
        }

        self.admission_bind_adresse()?;
        if self.commander.aktiviert {
            self.commander_bind_adresse()?;
        }
        if self.observability.aktiviert {
            self.observability_bind_adresse()?;
        }
        Ok(())
    }

    /// Gibt die Bind-Adresse des Admission-Listeners zurueck
    pub fn admission_bind_adresse(&self) -> portier_core::Result<SocketAddr> {
        adresse(&self.netzwerk.bind_adresse, self.netzwerk.admission_port)
    }

    /// Gibt die Bind-Adresse des Admin-Kanals zurueck
    pub fn commander_bind_adresse(&self) -> portier_core::Result<SocketAddr> {
        adresse(&self.commander.bind_adresse, self.commander.port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> portier_core::Result<SocketAddr> {
        adresse(&self.netzwerk.bind_adresse, self.observability.port)
    }
}

fn adresse(host: &str, port: u16) -> portier_core::Result<SocketAddr> {
    let adresse = format!("{host}:{port}");
    adresse
        .parse()
        .map_err(|e: std::net::AddrParseError| PortierError::UngueltigeAdresse {
            grund: e.to_string(),
            adresse,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.slots, 4);
        assert_eq!(cfg.server.basis_port, 9000);
        assert_eq!(cfg.netzwerk.admission_port, 8999);
        assert_eq!(cfg.warteschlange.poll_timeout(), Some(Duration::from_secs(30)));
        assert!(!cfg.worker.neustart);
        assert!(!cfg.commander.aktiviert);
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.admission_bind_adresse().unwrap().to_string(), "0.0.0.0:8999");
        assert_eq!(cfg.commander_bind_adresse().unwrap().to_string(), "127.0.0.1:8998");
        assert_eq!(cfg.observability_bind_adresse().unwrap().to_string(), "0.0.0.0:9300");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            slots = 2

            [worker]
            programm = "portier-rx"
            argumente = ["--port", "{port}", "--jitter", "16"]
            neustart = true

            [warteschlange]
            poll_timeout_sek = 0

            [commander]
            aktiviert = true
            passwort = "geheim"
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.slots, 2);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.server.basis_port, 9000);
        assert_eq!(cfg.worker.befehl().anzeige(&[("port", "9001")]), "portier-rx --port 9001 --jitter 16");
        assert!(cfg.worker.neustart);
        assert_eq!(cfg.worker.beenden_timeout(), Duration::from_millis(3000));
        assert_eq!(cfg.warteschlange.poll_timeout(), None);
        assert_eq!(cfg.commander.passwort.as_deref(), Some("geheim"));
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn ungueltige_slot_tabelle() {
        let mut cfg = ServerConfig::default();
        cfg.server.slots = 0;
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.server.basis_port = 65534;
        cfg.server.slots = 3;
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn riesige_slot_anzahl_wird_abgewiesen() {
        let mut cfg = ServerConfig::default();
        cfg.server.slots = u32::MAX as usize;
        let fehler = cfg.validieren().unwrap_err();
        assert!(fehler.to_string().contains("65535"));

        let mut cfg = ServerConfig::default();
        cfg.server.slots = usize::MAX;
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn port_kollisionen() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.admission_port = 9002;
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.commander.aktiviert = true;
        cfg.commander.port = 9000;
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn ungueltige_werte() {
        let mut cfg = ServerConfig::default();
        cfg.logging.level = "laut".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.worker.programm = " ".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "nirgendwo".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/portier.toml").unwrap();
        assert_eq!(cfg.server.slots, 4);
    }
}
