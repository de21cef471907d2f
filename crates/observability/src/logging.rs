//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `PORTIER_LOG_LEVEL`: Filter-Direktive (z.B. `debug`, `portier_broker=trace`)
//! - `PORTIER_LOG_FORMAT`: Format (text/json)
//!
//! Die Umgebung hat Vorrang vor den Werten aus Konfiguration und CLI.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialisiert das Logging-System.
///
/// Darf nur einmal pro Prozess aufgerufen werden; weitere Aufrufe werden
/// ignoriert.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env("PORTIER_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format_env = std::env::var("PORTIER_LOG_FORMAT").unwrap_or_else(|_| format.to_string());

    let ergebnis = match format_env.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging war bereits initialisiert");
    }
}

/// Bildet eine Verbosity-Stufe (Anzahl `-v`) auf einen Log-Level ab.
///
/// `basis` gilt fuer Stufe 0; jede Stufe erhoeht die Ausfuehrlichkeit um eins.
pub fn level_aus_verbosity(basis: &str, verbosity: u8) -> &'static str {
    const STUFEN: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    let start = STUFEN.iter().position(|s| *s == basis).unwrap_or(2);
    let index = (start + verbosity as usize).min(STUFEN.len() - 1);
    STUFEN[index]
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
