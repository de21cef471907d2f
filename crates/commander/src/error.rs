//! Fehlertypen fuer den Portier Commander

use portier_broker::{BrokerError, SlotFehler};
use portier_protocol::ProtokollFehler;
use thiserror::Error;

/// Alle moeglichen Fehler im Commander-Crate
#[derive(Debug, Error)]
pub enum CommanderError {
    #[error("Authentifizierung fehlgeschlagen: {0}")]
    Authentifizierung(String),

    #[error("Nicht autorisiert: {0}")]
    NichtAutorisiert(String),

    #[error("Ressource nicht gefunden: {0}")]
    NichtGefunden(String),

    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    #[error("Broker-Fehler: {0}")]
    Broker(BrokerError),

    #[error("Interner Fehler: {0}")]
    Intern(#[from] anyhow::Error),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protokollfehler: {0}")]
    Protokoll(String),
}

pub type CommanderResult<T> = Result<T, CommanderError>;

impl CommanderError {
    /// Fehler-Code fuer TCP-Protokoll-Antworten
    pub fn fehler_code(&self) -> u32 {
        match self {
            Self::Authentifizierung(_) => 1001,
            Self::NichtAutorisiert(_) => 1002,
            Self::NichtGefunden(_) => 1004,
            Self::UngueltigeEingabe(_) => 1005,
            Self::Broker(_) => 2001,
            Self::Intern(_) => 5000,
            Self::Io(_) => 5001,
            Self::Protokoll(_) => 5003,
        }
    }
}

impl From<ProtokollFehler> for CommanderError {
    fn from(e: ProtokollFehler) -> Self {
        match e {
            ProtokollFehler::UnbekannterBefehl(_) | ProtokollFehler::LeereZeile => {
                Self::Protokoll(e.to_string())
            }
            other => Self::UngueltigeEingabe(other.to_string()),
        }
    }
}

impl From<BrokerError> for CommanderError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::Slot(SlotFehler::Unbekannt(port)) => {
                Self::NichtGefunden(format!("Slot mit Port {port}"))
            }
            BrokerError::ClientUnbekannt(client) => Self::NichtGefunden(client.to_string()),
            other => Self::Broker(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portier_core::ClientId;

    #[test]
    fn broker_fehler_abbildung() {
        let e: CommanderError = BrokerError::Slot(SlotFehler::Unbekannt(1)).into();
        assert_eq!(e.fehler_code(), 1004);
        let e: CommanderError = BrokerError::ClientUnbekannt(ClientId(9)).into();
        assert_eq!(e.fehler_code(), 1004);
        let e: CommanderError = BrokerError::worker_start(9000, "weg").into();
        assert_eq!(e.fehler_code(), 2001);
    }

    #[test]
    fn protokoll_fehler_abbildung() {
        let e: CommanderError = ProtokollFehler::UnbekannterBefehl("x".into()).into();
        assert_eq!(e.fehler_code(), 5003);
        let e: CommanderError = ProtokollFehler::ParameterFehlt("port".into()).into();
        assert_eq!(e.fehler_code(), 1005);
    }
}
