//! Befehlsausfuehrung gegen Broker und Worker-Supervisor

use std::sync::Arc;
use std::time::Instant;

use portier_broker::{worker_neu_starten, Broker, FreigabeGrund, WorkerSupervisor};

use crate::commands::types::{AdminAntwort, AdminBefehl, StatusAntwort};
use crate::error::CommanderResult;

/// Fuehrt Admin-Befehle aus
///
/// Haelt nur Referenzen; jede Aenderung geht durch den Broker.
pub struct AdminExecutor {
    broker: Arc<Broker>,
    supervisor: Arc<WorkerSupervisor>,
    server_start: Instant,
}

impl AdminExecutor {
    pub fn neu(broker: Arc<Broker>, supervisor: Arc<WorkerSupervisor>) -> Self {
        Self {
            broker,
            supervisor,
            server_start: Instant::now(),
        }
    }

    pub fn ausfuehren(&self, befehl: AdminBefehl) -> CommanderResult<AdminAntwort> {
        tracing::debug!(?befehl, "Admin-Befehl");
        match befehl {
            AdminBefehl::Status => Ok(AdminAntwort::Status(StatusAntwort {
                pool: self.broker.status(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: self.server_start.elapsed().as_secs(),
            })),
            AdminBefehl::SlotListe => Ok(AdminAntwort::SlotListe(self.broker.slot_liste())),
            AdminBefehl::WarteschlangeListe => Ok(AdminAntwort::WarteschlangeListe(
                self.broker.warteschlange_liste(),
            )),
            AdminBefehl::SlotFreigeben { port } => {
                let client = self.broker.slot_freigeben(port, FreigabeGrund::Admin)?;
                tracing::info!(port, client = ?client, "Slot per Admin freigegeben");
                Ok(AdminAntwort::Freigegeben { port, client })
            }
            AdminBefehl::ClientKicken { client } => {
                self.broker.client_kicken(client)?;
                Ok(AdminAntwort::Ok)
            }
            AdminBefehl::WorkerNeustarten { port } => {
                let worker = worker_neu_starten(&self.broker, &self.supervisor, port)?;
                tracing::info!(port, worker = %worker, "Worker per Admin neu gestartet");
                Ok(AdminAntwort::Neugestartet { port, worker })
            }
        }
    }
}
