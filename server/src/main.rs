//! Portier Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use clap::Parser;
use portier_server::{cli::Cli, config::ServerConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let mut config = ServerConfig::laden(&cli.config)?;
    cli.anwenden(&mut config);

    portier_observability::logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config,
        "Portier Server wird initialisiert"
    );

    Server::neu(config).starten().await
}
