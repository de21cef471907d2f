//! portier-commander – Admin-Kanal fuer den Portier-Broker
//!
//! Zeilenbasiertes Protokoll im ServerQuery-Stil auf einem eigenen,
//! optionalen TCP-Port:
//!
//! ```text
//! status | slotlist | queuelist | release port=P | kick client=ID
//! restart port=P | login password=... | quit
//! ```
//!
//! Antworten: `ok [key=value ...]` oder `error id=N msg=...`. Alle
//! Aenderungen laufen ueber den [`portier_broker::Broker`], der die
//! Slot-Invarianten durchsetzt.

pub mod commands;
pub mod error;
pub mod tcp;

pub use commands::executor::AdminExecutor;
pub use commands::types::{AdminAntwort, AdminBefehl};
pub use error::{CommanderError, CommanderResult};
pub use tcp::{TcpServer, TcpServerKonfig};
