//! Portier Sender – Einstiegspunkt

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use portier_sender::{cli::Cli, sitzung_ausfuehren, SenderConfig};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = SenderConfig::laden(&cli.config)?;
    cli.anwenden(&mut config);
    config.validieren()?;

    portier_observability::logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.verbindung.host,
        port = config.verbindung.port,
        warten = config.anfrage.warten,
        "Portier Sender startet"
    );

    let ende = sitzung_ausfuehren(&config, abbruch_signal()).await?;
    tracing::info!(?ende, "Sitzung beendet");
    Ok(ExitCode::from(ende.exit_code()))
}

/// Ctrl-C oder (unter Unix) SIGTERM
async fn abbruch_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
