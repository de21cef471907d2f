//! portier-protocol – Zeilenbasierte Protokolle von Portier
//!
//! Zwei Textprotokolle teilen sich denselben Tokenizer:
//! - **Admission** (Sender <-> Broker): Slot-Anfrage, Warte-Polls,
//!   ganzzahlige Antworten (Port, `0`, negative Codes)
//! - **Admin** (Betreiber <-> Broker): ServerQuery-Stil
//!   `befehl key=value ...` mit `ok ...` / `error id=N msg=...`
//!
//! Alle Nachrichten sind UTF-8-Zeilen, getrennt durch `\n`.

pub mod admission;
pub mod error;
pub mod parser;
pub mod wire;

pub use admission::{AdmissionNachricht, Antwort};
pub use error::{ProtokollFehler, ProtokollResult};
pub use parser::{encode_value, fehler_antwort, ok_antwort, parse_line, ParsedCommand};
pub use wire::{zeilen_codec, MAX_ZEILENLAENGE};
