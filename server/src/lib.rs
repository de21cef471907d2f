//! portier-server – Bibliotheks-Root
//!
//! Baut aus der Konfiguration Slot-Pool, Broker, Worker und Listener auf
//! und stellt den Einstiegspunkt fuer Integrationstests bereit.

pub mod cli;
pub mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use portier_broker::wartung::{warteschlange_pflegen, worker_ereignisse_verarbeiten};
use portier_broker::{
    AdmissionKonfig, AdmissionServer, Broker, BrokerKonfig, NeustartKonfig, ProzessBackend,
    SlotTable, WorkerSupervisor,
};
use portier_commander::{AdminExecutor, TcpServer, TcpServerKonfig};
use portier_observability::{observability_server_starten, PortierMetrics};

use config::ServerConfig;

/// Takt der Warteschlangen-Pflege
const PFLEGE_INTERVALL: Duration = Duration::from_secs(1);
/// Wie lange offene Admission-Verbindungen beim Shutdown Zeit bekommen
const TRENN_FRIST: Duration = Duration::from_secs(2);

/// Haelt die Konfiguration bis zum Start
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C oder SIGTERM
    pub async fn starten(self) -> Result<()> {
        let laufend = self.hochfahren().await?;
        tracing::info!("Server laeuft. Warte auf Shutdown-Signal...");
        shutdown_signal().await;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
        laufend.herunterfahren().await
    }

    /// Baut den Server auf, ohne auf ein Signal zu warten
    ///
    /// Reihenfolge:
    /// 1. Konfiguration pruefen, Slot-Tabelle und Broker anlegen
    /// 2. Listener binden (belegte Ports sind fatal)
    /// 3. Worker starten; fehlgeschlagene Slots werden gesperrt
    /// 4. Hintergrund-Tasks und Listener starten
    pub async fn hochfahren(self) -> Result<LaufenderServer> {
        let config = self.config;
        config.validieren()?;

        let metriken = PortierMetrics::neu()?;
        let slots = SlotTable::neu(config.server.basis_port, config.server.slots)?;
        let broker = Arc::new(Broker::neu(
            slots,
            BrokerKonfig {
                poll_timeout: config.warteschlange.poll_timeout(),
            },
            Some(metriken.clone()),
        ));

        let admission = AdmissionServer::binden(
            AdmissionKonfig {
                bind_addr: config.admission_bind_adresse()?,
                max_verbindungen: config.netzwerk.max_verbindungen,
            },
            Arc::clone(&broker),
        )
        .await
        .context("Admission-Port konnte nicht gebunden werden")?;
        let admission_addr = admission.lokale_adresse()?;

        let admin = if config.commander.aktiviert {
            let server = TcpServer::binden(TcpServerKonfig {
                bind_addr: config.commander_bind_adresse()?,
                max_verbindungen: config.commander.max_verbindungen,
                passwort: config.commander.passwort.clone(),
            })
            .await
            .context("Admin-Port konnte nicht gebunden werden")?;
            Some(server)
        } else {
            None
        };
        let admin_addr = admin.as_ref().map(|s| s.lokale_adresse()).transpose()?;

        let backend = Arc::new(ProzessBackend::neu(config.worker.befehl()));
        let (supervisor, ereignisse) =
            WorkerSupervisor::neu(backend, config.worker.beenden_timeout());
        let supervisor = Arc::new(supervisor);

        let ergebnisse = supervisor.alle_starten(&broker.ports());
        broker.start_ergebnisse_uebernehmen(&ergebnisse);
        let gestartet = ergebnisse.iter().filter(|e| e.ergebnis.is_ok()).count();
        if gestartet == 0 {
            tracing::warn!(
                programm = %config.worker.programm,
                "Kein Worker gestartet, alle Slots gesperrt"
            );
        }

        tracing::info!(
            admission = %admission_addr,
            slots = config.server.slots,
            basis_port = config.server.basis_port,
            worker = gestartet,
            "Server startet"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(worker_ereignisse_verarbeiten(
            Arc::clone(&broker),
            Arc::clone(&supervisor),
            ereignisse,
            NeustartKonfig {
                aktiviert: config.worker.neustart,
                verzoegerung: config.worker.neustart_verzoegerung(),
            },
            shutdown_rx.clone(),
        )));

        tasks.push(tokio::spawn(warteschlange_pflegen(
            Arc::clone(&broker),
            PFLEGE_INTERVALL,
            shutdown_rx.clone(),
        )));

        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admission.starten(rx).await {
                tracing::error!(fehler = %e, "Admission-Server Fehler");
            }
        }));

        if let Some(admin) = admin {
            let executor = Arc::new(AdminExecutor::neu(
                Arc::clone(&broker),
                Arc::clone(&supervisor),
            ));
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = admin.starten(executor, rx).await {
                    tracing::error!(fehler = %e, "Admin-Kanal Fehler");
                }
            }));
        }

        if config.observability.aktiviert {
            let addr = config.observability_bind_adresse()?;
            let rx = shutdown_rx.clone();
            let metriken = metriken.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(addr, metriken, rx).await {
                    tracing::error!(fehler = %e, "Observability-Server Fehler");
                }
            }));
        }

        Ok(LaufenderServer {
            broker,
            supervisor,
            admission_addr,
            admin_addr,
            shutdown_tx,
            tasks,
        })
    }
}

/// Handle auf einen hochgefahrenen Server
pub struct LaufenderServer {
    broker: Arc<Broker>,
    supervisor: Arc<WorkerSupervisor>,
    admission_addr: SocketAddr,
    admin_addr: Option<SocketAddr>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl LaufenderServer {
    /// Gebundene Adresse des Admission-Protokolls
    pub fn admission_adresse(&self) -> SocketAddr {
        self.admission_addr
    }

    /// Gebundene Adresse des Admin-Kanals, falls aktiviert
    pub fn admin_adresse(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn supervisor(&self) -> &Arc<WorkerSupervisor> {
        &self.supervisor
    }

    /// Geordneter Shutdown
    ///
    /// Listener schliessen, Clients erhalten `-3`, danach werden alle
    /// Worker beendet.
    pub async fn herunterfahren(self) -> Result<()> {
        // Vor dem Signal, sonst erben Wartende die Slots trennender Besitzer
        self.broker.herunterfahren();
        let _ = self.shutdown_tx.send(true);

        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(fehler = %e, "Task endete unsauber");
            }
        }

        // Verbindungs-Tasks melden sich selbst beim Broker ab
        let frist = tokio::time::Instant::now() + TRENN_FRIST;
        while self.broker.status().verbunden > 0 && tokio::time::Instant::now() < frist {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        self.supervisor.alle_beenden().await;
        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Wartet auf Ctrl-C oder (unter Unix) SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(fehler = %e, "Ctrl-C-Handler nicht verfuegbar");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(fehler = %e, "SIGTERM-Handler nicht verfuegbar");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
