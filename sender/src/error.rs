//! Fehlertypen der Sendeseite

use portier_protocol::{Antwort, ProtokollFehler};
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("Verbindung zu {addr} fehlgeschlagen: {quelle}")]
    Verbindung {
        addr: String,
        #[source]
        quelle: std::io::Error,
    },

    #[error("Server hat die Verbindung geschlossen")]
    Getrennt,

    #[error("Unerwartete Antwort des Servers: {0}")]
    UnerwarteteAntwort(Antwort),

    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollFehler),

    #[error("Zeilen-Codec: {0}")]
    Codec(#[from] LinesCodecError),

    #[error("Pipeline '{programm}' konnte nicht gestartet werden: {quelle}")]
    PipelineStart {
        programm: String,
        #[source]
        quelle: std::io::Error,
    },

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("E/A-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type SenderResult<T> = Result<T, SenderError>;
