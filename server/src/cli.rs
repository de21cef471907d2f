//! Kommandozeile des Servers
//!
//! Flags ueberschreiben die Werte aus der Konfigurationsdatei.

use clap::{ArgAction, Parser};

use crate::config::ServerConfig;

/// Portier Empfangsseite
#[derive(Debug, Parser)]
#[command(name = "portier-server", version, about)]
pub struct Cli {
    /// Pfad zur TOML-Konfiguration
    #[arg(short, long, env = "PORTIER_CONFIG", default_value = "portier.toml")]
    pub config: String,

    /// Anzahl Slots (Empfaenger-Instanzen)
    #[arg(short = 'i', long = "instanzen")]
    pub slots: Option<usize>,

    /// Port des ersten Slots
    #[arg(short = 'p', long = "port")]
    pub basis_port: Option<u16>,

    /// Bind-Adresse fuer alle Listener
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Port des Admission-Protokolls
    #[arg(short, long)]
    pub admission_port: Option<u16>,

    /// Admin-Kanal auf diesem Port aktivieren
    #[arg(long)]
    pub admin_port: Option<u16>,

    /// Ausfuehrlichere Logs (mehrfach erlaubt: -v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Uebertraegt gesetzte Flags in die Konfiguration
    pub fn anwenden(&self, config: &mut ServerConfig) {
        if let Some(slots) = self.slots {
            config.server.slots = slots;
        }
        if let Some(port) = self.basis_port {
            config.server.basis_port = port;
        }
        if let Some(bind) = &self.bind {
            config.netzwerk.bind_adresse = bind.clone();
        }
        if let Some(port) = self.admission_port {
            config.netzwerk.admission_port = port;
        }
        if let Some(port) = self.admin_port {
            config.commander.aktiviert = true;
            config.commander.port = port;
        }
        if self.verbose > 0 {
            config.logging.level =
                portier_observability::level_aus_verbosity(&config.logging.level, self.verbose)
                    .to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_ueberschreiben_konfiguration() {
        let cli = Cli::parse_from([
            "portier-server",
            "-i",
            "8",
            "-p",
            "10000",
            "--admin-port",
            "7000",
            "-vv",
        ]);
        let mut cfg = ServerConfig::default();
        cli.anwenden(&mut cfg);
        assert_eq!(cfg.server.slots, 8);
        assert_eq!(cfg.server.basis_port, 10000);
        assert!(cfg.commander.aktiviert);
        assert_eq!(cfg.commander.port, 7000);
        assert_eq!(cfg.logging.level, "trace");
    }

    #[test]
    fn ohne_flags_bleibt_alles() {
        let cli = Cli::parse_from(["portier-server"]);
        let mut cfg = ServerConfig::default();
        cli.anwenden(&mut cfg);
        assert_eq!(cfg.server.slots, 4);
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.commander.aktiviert);
    }

    #[test]
    fn cli_ist_konsistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
