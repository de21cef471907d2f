//! Fehlertypen fuer Portier
//!
//! Crate-uebergreifende Fehler beim Aufbau des Systems. Laufzeitfehler
//! definieren die einzelnen Crates selbst (`BrokerError`, `CommanderError`,
//! `SenderError`).

use thiserror::Error;

/// Globaler Result-Alias fuer Portier
pub type Result<T> = std::result::Result<T, PortierError>;

#[derive(Debug, Error)]
pub enum PortierError {
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Ungueltige Adresse '{adresse}': {grund}")]
    UngueltigeAdresse { adresse: String, grund: String },
}

impl PortierError {
    /// Erstellt einen Konfigurationsfehler
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }
}
