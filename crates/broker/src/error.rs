//! Fehlertypen fuer den Admission-Broker

use portier_core::ClientId;
use thiserror::Error;

/// Fehler bei Operationen auf der Slot-Tabelle
///
/// Jede fehlgeschlagene Operation laesst die Tabelle unveraendert.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotFehler {
    /// Kein Slot mit diesem Port
    #[error("Slot nicht gefunden: Port {0}")]
    Unbekannt(u16),

    /// Slot ist bereits an einen Client vergeben
    #[error("Slot {port} ist bereits belegt von {besitzer}")]
    BereitsBelegt { port: u16, besitzer: ClientId },

    /// Slot ist gesperrt (kein lauffaehiger Worker)
    #[error("Slot {0} ist gesperrt")]
    Gesperrt(u16),

    /// Client besitzt bereits einen anderen Slot
    #[error("{client} besitzt bereits Slot {port}")]
    ClientHatBereitsSlot { client: ClientId, port: u16 },
}

/// Fehlertyp fuer den Admission-Broker
#[derive(Debug, Error)]
pub enum BrokerError {
    /// IO-Fehler (TCP, Prozesse)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Fehler der Slot-Tabelle
    #[error("Slot-Fehler: {0}")]
    Slot(#[from] SlotFehler),

    /// Slot-Tabelle konnte nicht angelegt werden
    #[error("Ungueltige Slot-Tabelle: {0}")]
    UngueltigeTabelle(String),

    /// Client ist dem Broker nicht (mehr) bekannt
    #[error("Unbekannter Client: {0}")]
    ClientUnbekannt(ClientId),

    /// Nachricht passt nicht zum Sitzungszustand
    #[error("Unerwartete Nachricht im Zustand {0}")]
    UnerwarteteNachricht(String),

    /// Worker-Prozess konnte nicht gestartet werden
    #[error("Worker fuer Port {port} nicht startbar: {grund}")]
    WorkerStart { port: u16, grund: String },
}

impl BrokerError {
    /// Erstellt einen Worker-Startfehler
    pub fn worker_start(port: u16, grund: impl Into<String>) -> Self {
        Self::WorkerStart {
            port,
            grund: grund.into(),
        }
    }
}

/// Result-Typ fuer den Admission-Broker
pub type BrokerResult<T> = Result<T, BrokerError>;
