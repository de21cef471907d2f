//! Medien-Pipeline der Sendeseite
//!
//! Externes Programm, das nach der Zuweisung gegen den erhaltenen Port
//! sendet. Es laeuft ausserhalb der Kontrolle des Brokers und lebt nur so
//! lange wie die Steuerverbindung.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::{Child, Command};

use portier_core::BefehlsVorlage;

use crate::error::{SenderError, SenderResult};

/// Laufender Pipeline-Prozess
pub struct MedienPipeline {
    kind: Child,
    anzeige: String,
}

impl MedienPipeline {
    /// Startet die Pipeline; Platzhalter `{host}`, `{port}`, `{rate}`, `{name}`
    pub fn starten(vorlage: &BefehlsVorlage, werte: &[(&str, &str)]) -> SenderResult<Self> {
        let (programm, argumente) = vorlage.aufloesen(werte);
        let anzeige = vorlage.anzeige(werte);

        let kind = Command::new(&programm)
            .args(&argumente)
            .kill_on_drop(true)
            .spawn()
            .map_err(|quelle| SenderError::PipelineStart { programm, quelle })?;

        tracing::info!(pid = ?kind.id(), befehl = %anzeige, "Medien-Pipeline gestartet");
        Ok(Self { kind, anzeige })
    }

    pub fn id(&self) -> Option<u32> {
        self.kind.id()
    }

    /// Wartet auf das Ende der Pipeline
    pub async fn beendet(&mut self) -> io::Result<ExitStatus> {
        self.kind.wait().await
    }

    /// SIGTERM, nach `frist` hart beenden
    pub async fn beenden(mut self, frist: Duration) {
        if let Ok(Some(status)) = self.kind.try_wait() {
            tracing::debug!(code = ?status.code(), "Pipeline war bereits beendet");
            return;
        }
        if let Err(e) = self.terminieren() {
            tracing::debug!(fehler = %e, "SIGTERM an Pipeline fehlgeschlagen");
        }
        match tokio::time::timeout(frist, self.kind.wait()).await {
            Ok(_) => tracing::info!(befehl = %self.anzeige, "Medien-Pipeline beendet"),
            Err(_) => {
                tracing::warn!(
                    frist_ms = frist.as_millis() as u64,
                    "Pipeline reagiert nicht, wird getoetet"
                );
                if let Err(e) = self.kind.kill().await {
                    tracing::error!(fehler = %e, "Pipeline konnte nicht getoetet werden");
                }
            }
        }
    }

    #[cfg(unix)]
    fn terminieren(&mut self) -> io::Result<()> {
        let Some(pid) = self.kind.id() else {
            return Ok(());
        };
        // SAFETY: kill(2) an den eigenen, noch nicht eingesammelten Kindprozess
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn terminieren(&mut self) -> io::Result<()> {
        self.kind.start_kill()
    }
}
