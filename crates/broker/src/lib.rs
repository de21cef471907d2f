//! portier-broker – Admission-Broker fuer einen Pool von Empfaenger-Workern
//!
//! Bausteine:
//! - [`SlotTable`]: feste Tabelle von N Slots auf aufeinanderfolgenden Ports
//! - [`WaitQueue`]: FIFO wartender Clients
//! - [`Broker`]: beide hinter einem Lock, Vergabe und Freigabe
//! - [`WorkerSupervisor`]: ein Prozess pro Slot, Start/Stop/Lebendigkeit
//! - [`AdmissionServer`]: TCP-Listener fuer das Admission-Protokoll
//! - [`wartung`]: Worker-Ereignisse und Warteschlangen-Pflege

pub mod admission;
pub mod broker;
pub mod connection;
pub mod error;
pub mod slot_table;
pub mod supervisor;
pub mod wait_queue;
pub mod wartung;

pub use admission::{AdmissionKonfig, AdmissionServer};
pub use broker::{
    AnfrageErgebnis, Benachrichtigung, Broker, BrokerKonfig, FreigabeGrund, PoolStatus,
    SlotAnfrage, SlotInfo, TrennErgebnis, WarteInfo,
};
pub use connection::{ClientZustand, Reaktion, Sitzung};
pub use error::{BrokerError, BrokerResult, SlotFehler};
pub use slot_table::{Slot, SlotTable, SlotZustand};
pub use supervisor::{
    ProzessBackend, StartErgebnis, WorkerBackend, WorkerEreignis, WorkerProzess, WorkerSupervisor,
};
pub use wait_queue::{WaitQueue, WarteEintrag};
pub use wartung::{worker_neu_starten, NeustartKonfig};
