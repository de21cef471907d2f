//! Ablauf einer Sender-Sitzung
//!
//! ```text
//! verbinden ─> slot ─┬─ Port ──────────────> Pipeline starten ─> ueberwachen
//!                    ├─ 0 ─> wait-Polls ─┬─> Port ─> ...
//!                    │                   └─> -3 / -4
//!                    └─ -1 ─> Ende (Warten deaktiviert)
//! ```
//!
//! Die Pipeline lebt genau so lange wie die Steuerverbindung. Endet eine
//! von beiden, wird die andere abgebaut.

use std::future::Future;

use portier_protocol::Antwort;

use crate::client::AdmissionClient;
use crate::config::SenderConfig;
use crate::error::{SenderError, SenderResult};
use crate::pipeline::MedienPipeline;

/// Wie eine Sitzung geendet hat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitzungsEnde {
    /// Abbruch durch Signal oder Pipeline-Ende
    Beendet,
    /// Pool voll und Warten nicht gewuenscht
    Abgelehnt,
    /// Slot entzogen oder Server faehrt herunter
    Entzogen,
    /// Aus der Warteschlange verdraengt
    Verdraengt,
    /// Server hat die Verbindung ohne Code geschlossen
    ServerGetrennt,
}

impl SitzungsEnde {
    /// Prozess-Exit-Code fuer dieses Ende
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Beendet | Self::Abgelehnt | Self::Entzogen => 0,
            Self::Verdraengt | Self::ServerGetrennt => 1,
        }
    }
}

/// Fuehrt eine komplette Sitzung aus, bis `abbruch` feuert oder der Server
/// sie beendet
pub async fn sitzung_ausfuehren<F>(config: &SenderConfig, abbruch: F) -> SenderResult<SitzungsEnde>
where
    F: Future<Output = ()>,
{
    tokio::pin!(abbruch);

    let host = &config.verbindung.host;
    let mut client = AdmissionClient::verbinden(host, config.verbindung.port).await?;
    tracing::info!(server = %client.server_adresse(), anzeigename = %config.anfrage.name, "Fordere Slot an");

    let mut antwort = client
        .anfordern(
            Some(&config.anfrage.name),
            Some(config.anfrage.rate_kbps),
            config.anfrage.warten,
        )
        .await?;

    let port = loop {
        match antwort {
            Antwort::Port(port) => break port,
            Antwort::Wartend => {
                tracing::info!("Kein Slot frei, warte in der Warteschlange");
                antwort = tokio::select! {
                    a = client.warte_auf_zuweisung(config.anfrage.poll_intervall()) => a?,
                    _ = &mut abbruch => {
                        client.beenden().await;
                        return Ok(SitzungsEnde::Beendet);
                    }
                };
            }
            Antwort::Voll => {
                tracing::info!("Kein Slot frei und Warten deaktiviert. Mit -w starten, um zu warten");
                return Ok(SitzungsEnde::Abgelehnt);
            }
            Antwort::Entzogen => {
                tracing::info!("Server faehrt herunter");
                return Ok(SitzungsEnde::Entzogen);
            }
            Antwort::Verdraengt => {
                tracing::warn!("Aus der Warteschlange verdraengt");
                return Ok(SitzungsEnde::Verdraengt);
            }
            Antwort::Protokollfehler => return Err(SenderError::UnerwarteteAntwort(antwort)),
        }
    };

    tracing::info!(port, "Slot zugewiesen");

    let port_text = port.to_string();
    let rate_text = config.anfrage.rate_kbps.to_string();
    let werte = [
        ("host", host.as_str()),
        ("port", port_text.as_str()),
        ("rate", rate_text.as_str()),
        ("name", config.anfrage.name.as_str()),
    ];
    let mut pipeline = match MedienPipeline::starten(&config.pipeline.befehl(), &werte) {
        Ok(p) => p,
        Err(e) => {
            // Slot sofort zurueckgeben
            client.beenden().await;
            return Err(e);
        }
    };

    let ende = tokio::select! {
        ende = zuweisung_ueberwachen(&mut client) => ende,
        status = pipeline.beendet() => {
            match status {
                Ok(s) => tracing::info!(code = ?s.code(), "Medien-Pipeline hat sich beendet"),
                Err(e) => tracing::warn!(fehler = %e, "Warten auf Pipeline fehlgeschlagen"),
            }
            client.beenden().await;
            SitzungsEnde::Beendet
        }
        _ = &mut abbruch => {
            tracing::info!("Abbruch angefordert");
            client.beenden().await;
            SitzungsEnde::Beendet
        }
    };

    pipeline.beenden(config.pipeline.beenden_timeout()).await;
    Ok(ende)
}

/// Liest die Steuerverbindung, bis der Server die Zuweisung beendet
async fn zuweisung_ueberwachen(client: &mut AdmissionClient) -> SitzungsEnde {
    loop {
        match client.naechste_antwort().await {
            Ok(Some(Antwort::Entzogen)) => {
                tracing::info!("Slot wurde entzogen");
                return SitzungsEnde::Entzogen;
            }
            Ok(Some(andere)) => {
                tracing::debug!(antwort = %andere, "Antwort im zugewiesenen Zustand ignoriert");
            }
            Ok(None) => {
                tracing::warn!("Server hat die Steuerverbindung geschlossen");
                return SitzungsEnde::ServerGetrennt;
            }
            Err(e) => {
                tracing::warn!(fehler = %e, "Steuerverbindung gestoert");
                return SitzungsEnde::ServerGetrennt;
            }
        }
    }
}
