//! Kommandozeile des Senders

use clap::{ArgAction, Parser};

use crate::config::SenderConfig;

/// Portier Sendeseite: Slot anfordern und Medien-Pipeline starten
#[derive(Debug, Parser)]
#[command(name = "portier-sender", version, about)]
pub struct Cli {
    /// Pfad zur TOML-Konfiguration
    #[arg(
        short,
        long,
        env = "PORTIER_SENDER_CONFIG",
        default_value = "portier-sender.toml"
    )]
    pub config: String,

    /// Host des Admission-Servers
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port des Admission-Servers
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Bei vollem Pool in der Warteschlange warten
    #[arg(short, long)]
    pub wait: bool,

    /// Bitrate in kbit/s
    #[arg(short, long = "bitrate")]
    pub bitrate: Option<u32>,

    /// Anzeigename
    #[arg(short, long)]
    pub name: Option<String>,

    /// Ausfuehrlichere Logs (mehrfach erlaubt)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn anwenden(&self, config: &mut SenderConfig) {
        if let Some(host) = &self.host {
            config.verbindung.host = host.clone();
        }
        if let Some(port) = self.port {
            config.verbindung.port = port;
        }
        if self.wait {
            config.anfrage.warten = true;
        }
        if let Some(rate) = self.bitrate {
            config.anfrage.rate_kbps = rate;
        }
        if let Some(name) = &self.name {
            config.anfrage.name = name.clone();
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
    fn flags_wie_beim_alten_tx() {
        let cli = Cli::parse_from([
            "portier-sender",
            "-H",
            "10.0.0.7",
            "-p",
            "7000",
            "-w",
            "-b",
            "96",
            "-v",
        ]);
        let mut cfg = SenderConfig::default();
        cli.anwenden(&mut cfg);
        assert_eq!(cfg.verbindung.host, "10.0.0.7");
        assert_eq!(cfg.verbindung.port, 7000);
        assert!(cfg.anfrage.warten);
        assert_eq!(cfg.anfrage.rate_kbps, 96);
        assert_eq!(cfg.anfrage.name, "Copain");
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn warten_aus_datei_bleibt_ohne_flag() {
        let cli = Cli::parse_from(["portier-sender"]);
        let mut cfg = SenderConfig::default();
        cfg.anfrage.warten = true;
        cli.anwenden(&mut cfg);
        assert!(cfg.anfrage.warten);
    }

    #[test]
    fn cli_ist_konsistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
