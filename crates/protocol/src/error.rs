//! Fehlertypen fuer die Protokoll-Schicht

use thiserror::Error;

/// Fehler beim Parsen oder Kodieren von Protokollzeilen
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtokollFehler {
    #[error("Leere Befehlszeile")]
    LeereZeile,

    #[error("Unbekannter Befehl: {0}")]
    UnbekannterBefehl(String),

    #[error("Pflicht-Parameter fehlt: {0}")]
    ParameterFehlt(String),

    #[error("Ungueltiger Wert fuer '{schluessel}': {wert}")]
    UngueltigerWert { schluessel: String, wert: String },

    #[error("Ungueltige Antwort: {0}")]
    UngueltigeAntwort(String),
}

/// Result-Typ fuer die Protokoll-Schicht
pub type ProtokollResult<T> = Result<T, ProtokollFehler>;
