//! Prometheus-kompatible Metriken fuer Portier
//!
//! Registrierte Metriken:
//! - `portier_slots_total` – Gauge: Groesse des Slot-Pools
//! - `portier_slots_occupied` – Gauge: Belegte Slots
//! - `portier_slots_unusable` – Gauge: Gesperrte Slots (Worker nicht startbar)
//! - `portier_wait_queue_length` – Gauge: Wartende Clients
//! - `portier_connected_clients` – Gauge: Offene Admission-Verbindungen
//! - `portier_admission_requests_total` – Counter: Slot-Anfragen nach Ergebnis
//! - `portier_worker_exits_total` – Counter: Unerwartet beendete Worker
//! - `portier_wait_seconds` – Histogram: Wartezeit bis zur Zuweisung

use anyhow::Result;
use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Ergebnis-Labels fuer `portier_admission_requests_total`
pub const ERGEBNIS_ZUGEWIESEN: &str = "zugewiesen";
pub const ERGEBNIS_WARTEND: &str = "wartend";
pub const ERGEBNIS_ABGELEHNT: &str = "abgelehnt";
pub const ERGEBNIS_PROTOKOLLFEHLER: &str = "protokollfehler";

/// Alle Portier-Prometheus-Metriken
#[derive(Clone)]
pub struct PortierMetrics {
    pub registry: Arc<Registry>,

    // Pool-Metriken
    pub slots_total: Gauge,
    pub slots_occupied: Gauge,
    pub slots_unusable: Gauge,
    pub wait_queue_length: Gauge,
    pub connected_clients: Gauge,

    // Ereignis-Metriken
    pub admission_requests_total: IntCounterVec,
    pub worker_exits_total: IntCounter,
    pub wait_seconds: Histogram,
}

impl PortierMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let slots_total = Gauge::with_opts(Opts::new(
            "portier_slots_total",
            "Groesse des Slot-Pools",
        ))?;
        registry.register(Box::new(slots_total.clone()))?;

        let slots_occupied = Gauge::with_opts(Opts::new(
            "portier_slots_occupied",
            "Anzahl belegter Slots",
        ))?;
        registry.register(Box::new(slots_occupied.clone()))?;

        let slots_unusable = Gauge::with_opts(Opts::new(
            "portier_slots_unusable",
            "Anzahl gesperrter Slots ohne lauffaehigen Worker",
        ))?;
        registry.register(Box::new(slots_unusable.clone()))?;

        let wait_queue_length = Gauge::with_opts(Opts::new(
            "portier_wait_queue_length",
            "Anzahl wartender Clients",
        ))?;
        registry.register(Box::new(wait_queue_length.clone()))?;

        let connected_clients = Gauge::with_opts(Opts::new(
            "portier_connected_clients",
            "Anzahl offener Admission-Verbindungen",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let admission_requests_total = IntCounterVec::new(
            Opts::new(
                "portier_admission_requests_total",
                "Gesamtanzahl Slot-Anfragen nach Ergebnis",
            ),
            &["ergebnis"],
        )?;
        registry.register(Box::new(admission_requests_total.clone()))?;

        let worker_exits_total = IntCounter::with_opts(Opts::new(
            "portier_worker_exits_total",
            "Gesamtanzahl unerwartet beendeter Worker-Prozesse",
        ))?;
        registry.register(Box::new(worker_exits_total.clone()))?;

        let wait_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "portier_wait_seconds",
                "Wartezeit in der Warteschlange bis zur Zuweisung",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0]),
        )?;
        registry.register(Box::new(wait_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            slots_total,
            slots_occupied,
            slots_unusable,
            wait_queue_length,
            connected_clients,
            admission_requests_total,
            worker_exits_total,
            wait_seconds,
        })
    }

    /// Zaehlt eine Slot-Anfrage mit dem gegebenen Ergebnis-Label
    pub fn anfrage_zaehlen(&self, ergebnis: &str) {
        self.admission_requests_total
            .with_label_values(&[ergebnis])
            .inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: PortierMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(
    axum::extract::State(metriken): axum::extract::State<PortierMetrics>,
) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = PortierMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn gauge_slots_setzen() {
        let metriken = PortierMetrics::neu().unwrap();
        metriken.slots_total.set(4.0);
        metriken.slots_occupied.set(3.0);
        assert_eq!(metriken.slots_total.get(), 4.0);
        assert_eq!(metriken.slots_occupied.get(), 3.0);
    }

    #[test]
    fn anfragen_mit_labels() {
        let metriken = PortierMetrics::neu().unwrap();
        metriken.anfrage_zaehlen(ERGEBNIS_ZUGEWIESEN);
        metriken.anfrage_zaehlen(ERGEBNIS_ZUGEWIESEN);
        metriken.anfrage_zaehlen(ERGEBNIS_ABGELEHNT);
        let wert = metriken
            .admission_requests_total
            .with_label_values(&[ERGEBNIS_ZUGEWIESEN])
            .get();
        assert_eq!(wert, 2);
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = PortierMetrics::neu().unwrap();
        metriken.wait_queue_length.set(2.0);
        metriken.worker_exits_total.inc();

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("portier_wait_queue_length 2"));
        assert!(output.contains("portier_worker_exits_total 1"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn zwei_instanzen_sind_unabhaengig() {
        // Jede Instanz hat ihre eigene Registry (kein globaler Zustand)
        let a = PortierMetrics::neu().unwrap();
        let b = PortierMetrics::neu().unwrap();
        a.slots_occupied.set(5.0);
        assert_eq!(b.slots_occupied.get(), 0.0);
    }
}
