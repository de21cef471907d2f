//! Worker-Supervisor – ein Empfaengerprozess pro Slot
//!
//! Jeder Worker ist ein eigener Betriebssystem-Prozess, gebunden an genau
//! einen Slot-Port. Pro Worker laeuft eine Watcher-Task, die entweder das
//! Prozessende meldet oder auf Anforderung beendet:
//!
//! ```text
//! starten(port) ──> Watcher ──┬── Prozess endet ──> WorkerEreignis::Beendet
//!                             └── Stop-Signal  ──> SIGTERM, Grace-Period, kill
//! ```
//!
//! Beendigungen auf Anforderung werden nicht als Ereignis gemeldet.

use std::collections::HashMap;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use portier_core::{BefehlsVorlage, WorkerId};

use crate::error::{BrokerError, BrokerResult};

// ---------------------------------------------------------------------------
// Backend-Abstraktion
// ---------------------------------------------------------------------------

/// Ein laufender Worker-Prozess
#[async_trait]
pub trait WorkerProzess: Send {
    fn id(&self) -> WorkerId;

    /// Wartet auf das Prozessende, liefert den Exit-Code (falls vorhanden)
    async fn warten(&mut self) -> io::Result<Option<i32>>;

    /// Fordert ein ordentliches Beenden an (SIGTERM)
    fn beenden_anfordern(&mut self) -> io::Result<()>;

    /// Beendet den Prozess hart
    async fn toeten(&mut self) -> io::Result<()>;
}

/// Startet Worker-Prozesse fuer einen Port
pub trait WorkerBackend: Send + Sync + 'static {
    fn starten(&self, port: u16) -> BrokerResult<Box<dyn WorkerProzess>>;
}

/// Standard-Backend: startet ein konfiguriertes Programm, `{port}` wird ersetzt
pub struct ProzessBackend {
    befehl: BefehlsVorlage,
}

impl ProzessBackend {
    pub fn neu(befehl: BefehlsVorlage) -> Self {
        Self { befehl }
    }
}

impl WorkerBackend for ProzessBackend {
    fn starten(&self, port: u16) -> BrokerResult<Box<dyn WorkerProzess>> {
        let port_text = port.to_string();
        let (programm, argumente) = self.befehl.aufloesen(&[("port", &port_text)]);

        let child = Command::new(&programm)
            .args(&argumente)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrokerError::worker_start(port, format!("{programm}: {e}")))?;

        let pid = child
            .id()
            .ok_or_else(|| BrokerError::worker_start(port, "Prozess ohne PID"))?;

        tracing::debug!(port, pid, befehl = %self.befehl.anzeige(&[("port", &port_text)]), "Worker gestartet");
        Ok(Box::new(KindProzess {
            id: WorkerId(pid),
            child,
        }))
    }
}

struct KindProzess {
    id: WorkerId,
    child: Child,
}

#[async_trait]
impl WorkerProzess for KindProzess {
    fn id(&self) -> WorkerId {
        self.id
    }

    async fn warten(&mut self) -> io::Result<Option<i32>> {
        self.child.wait().await.map(|status| status.code())
    }

    #[cfg(unix)]
    fn beenden_anfordern(&mut self) -> io::Result<()> {
        // Bereits eingesammelt: nichts mehr zu signalisieren
        let Some(pid) = self.child.id() else {
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
    fn beenden_anfordern(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn toeten(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Meldung des Supervisors an den Broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEreignis {
    /// Worker hat sich unerwartet beendet
    Beendet {
        port: u16,
        worker: WorkerId,
        exit_code: Option<i32>,
    },
}

/// Ergebnis eines Worker-Starts fuer einen Slot
#[derive(Debug)]
pub struct StartErgebnis {
    pub port: u16,
    pub ergebnis: BrokerResult<WorkerId>,
}

struct WorkerHandle {
    id: WorkerId,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Besitzt alle Worker-Prozesse und ueberwacht ihre Lebensdauer
pub struct WorkerSupervisor {
    backend: Arc<dyn WorkerBackend>,
    beenden_timeout: Duration,
    worker: Mutex<HashMap<u16, WorkerHandle>>,
    ereignis_tx: mpsc::UnboundedSender<WorkerEreignis>,
}

impl WorkerSupervisor {
    /// Erstellt den Supervisor und den Empfaenger fuer Worker-Ereignisse
    pub fn neu(
        backend: Arc<dyn WorkerBackend>,
        beenden_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEreignis>) {
        let (ereignis_tx, ereignis_rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            backend,
            beenden_timeout,
            worker: Mutex::new(HashMap::new()),
            ereignis_tx,
        };
        (supervisor, ereignis_rx)
    }

    /// Startet einen Worker fuer `port`
    ///
    /// Ein bereits laufender Worker am selben Port ist ein Fehler; ein
    /// beendeter wird ersetzt.
    pub fn starten(&self, port: u16) -> BrokerResult<WorkerId> {
        let mut worker = self.worker.lock();
        if worker.get(&port).is_some_and(|h| !h.task.is_finished()) {
            return Err(BrokerError::worker_start(port, "Worker laeuft bereits"));
        }

        let prozess = self.backend.starten(port)?;
        let id = prozess.id();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(worker_ueberwachen(
            port,
            prozess,
            stop_rx,
            self.beenden_timeout,
            self.ereignis_tx.clone(),
        ));

        worker.insert(port, WorkerHandle { id, stop_tx, task });
        tracing::info!(port, worker = %id, "Worker laeuft");
        Ok(id)
    }

    /// Startet fuer jeden Port einen Worker; Fehler brechen nicht ab
    pub fn alle_starten(&self, ports: &[u16]) -> Vec<StartErgebnis> {
        ports
            .iter()
            .map(|&port| StartErgebnis {
                port,
                ergebnis: self.starten(port),
            })
            .collect()
    }

    /// Laeuft der Worker an `port` noch?
    pub fn laeuft(&self, port: u16) -> bool {
        self.worker
            .lock()
            .get(&port)
            .is_some_and(|h| !h.task.is_finished())
    }

    /// Kennung des Workers an `port`
    pub fn worker_id(&self, port: u16) -> Option<WorkerId> {
        self.worker.lock().get(&port).map(|h| h.id)
    }

    /// Beendet den Worker an `port` und wartet auf sein Ende
    pub async fn beenden(&self, port: u16) -> bool {
        let handle = self.worker.lock().remove(&port);
        match handle {
            Some(handle) => {
                handle_beenden(port, handle).await;
                true
            }
            None => false,
        }
    }

    /// Beendet alle Worker parallel
    pub async fn alle_beenden(&self) {
        let handles: Vec<(u16, WorkerHandle)> = self.worker.lock().drain().collect();
        if handles.is_empty() {
            return;
        }
        tracing::info!(anzahl = handles.len(), "Beende alle Worker");
        join_all(
            handles
                .into_iter()
                .map(|(port, handle)| handle_beenden(port, handle)),
        )
        .await;
    }
}

async fn handle_beenden(port: u16, handle: WorkerHandle) {
    let _ = handle.stop_tx.send(());
    if let Err(e) = handle.task.await {
        tracing::warn!(port, fehler = %e, "Watcher-Task abgebrochen");
    }
}

/// Watcher-Task eines Workers
async fn worker_ueberwachen(
    port: u16,
    mut prozess: Box<dyn WorkerProzess>,
    mut stop_rx: oneshot::Receiver<()>,
    beenden_timeout: Duration,
    ereignis_tx: mpsc::UnboundedSender<WorkerEreignis>,
) {
    let worker = prozess.id();

    // Fallengelassener Sender (Supervisor weg) zaehlt als Stop
    let status = tokio::select! {
        status = prozess.warten() => Some(status),
        _ = &mut stop_rx => None,
    };

    match status {
        Some(status) => {
            let exit_code = match status {
                Ok(code) => code,
                Err(e) => {
                    tracing::warn!(port, worker = %worker, fehler = %e, "Warten auf Worker fehlgeschlagen");
                    None
                }
            };
            tracing::warn!(port, worker = %worker, ?exit_code, "Worker unerwartet beendet");
            let _ = ereignis_tx.send(WorkerEreignis::Beendet {
                port,
                worker,
                exit_code,
            });
        }
        None => {
            if let Err(e) = prozess.beenden_anfordern() {
                tracing::debug!(port, worker = %worker, fehler = %e, "SIGTERM fehlgeschlagen");
            }
            match tokio::time::timeout(beenden_timeout, prozess.warten()).await {
                Ok(_) => tracing::debug!(port, worker = %worker, "Worker beendet"),
                Err(_) => {
                    tracing::warn!(
                        port,
                        worker = %worker,
                        timeout_ms = beenden_timeout.as_millis() as u64,
                        "Worker reagiert nicht, wird getoetet"
                    );
                    if let Err(e) = prozess.toeten().await {
                        tracing::error!(port, worker = %worker, fehler = %e, "Worker konnte nicht getoetet werden");
                    }
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn supervisor(programm: &str, argumente: &[&str]) -> (WorkerSupervisor, mpsc::UnboundedReceiver<WorkerEreignis>) {
        let backend = Arc::new(ProzessBackend::neu(BefehlsVorlage::neu(programm, argumente)));
        WorkerSupervisor::neu(backend, Duration::from_millis(500))
    }

    #[tokio::test]
    async fn worker_starten_und_beenden() {
        let (sup, mut rx) = supervisor("sleep", &["30"]);
        let ergebnisse = sup.alle_starten(&[9000, 9001]);
        assert!(ergebnisse.iter().all(|e| e.ergebnis.is_ok()));
        assert!(sup.laeuft(9000));
        assert!(sup.laeuft(9001));
        assert!(sup.worker_id(9000).is_some());

        assert!(sup.beenden(9000).await);
        assert!(!sup.laeuft(9000));
        assert!(!sup.beenden(9000).await);

        sup.alle_beenden().await;
        assert!(!sup.laeuft(9001));
        // Beendigung auf Anforderung erzeugt kein Ereignis
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unbekanntes_programm_ist_startfehler() {
        let (sup, _rx) = supervisor("/nicht/vorhanden/portier-rx", &["-p", "{port}"]);
        let ergebnisse = sup.alle_starten(&[9000]);
        assert!(matches!(
            ergebnisse[0].ergebnis,
            Err(BrokerError::WorkerStart { port: 9000, .. })
        ));
        assert!(!sup.laeuft(9000));
    }

    #[tokio::test]
    async fn unerwartetes_ende_wird_gemeldet() {
        let (sup, mut rx) = supervisor("true", &[]);
        let id = sup.starten(9000).unwrap();
        let ereignis = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            ereignis,
            WorkerEreignis::Beendet {
                port: 9000,
                worker: id,
                exit_code: Some(0),
            }
        );

        // Beendeter Worker darf ersetzt werden
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sup.starten(9000).is_ok());
    }

    #[tokio::test]
    async fn doppelter_start_wird_abgewiesen() {
        let (sup, _rx) = supervisor("sleep", &["30"]);
        sup.starten(9000).unwrap();
        assert!(sup.starten(9000).is_err());
        sup.alle_beenden().await;
    }

    #[tokio::test]
    async fn port_wird_eingesetzt() {
        let (sup, mut rx) = supervisor("sh", &["-c", "exit $(( {port} - 9000 + 3 ))"]);
        sup.starten(9002).unwrap();
        let WorkerEreignis::Beendet { exit_code, .. } =
            tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
        assert_eq!(exit_code, Some(5));
    }
}
