//! Health-Check-Endpunkt fuer Portier
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Slot-Zahlen.
//!
//! Der Status leitet sich aus den Pool-Gauges ab:
//! - alle Slots nutzbar → `healthy`
//! - einzelne Slots gesperrt → `degraded` (HTTP 200)
//! - kein Slot nutzbar → `unhealthy` (HTTP 503)

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::PortierMetrics;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Bewertet den Pool anhand gesamter und gesperrter Slots
    pub fn bewerten(slots_gesamt: u64, slots_gesperrt: u64) -> Self {
        if slots_gesamt == 0 || slots_gesperrt >= slots_gesamt {
            Self::Unhealthy
        } else if slots_gesperrt > 0 {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub slots_total: u64,
    pub slots_occupied: u64,
    pub slots_unusable: u64,
    pub waiting: u64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub metriken: PortierMetrics,
}

impl HealthState {
    pub fn neu(metriken: PortierMetrics) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            metriken,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Erstellt die aktuelle Health-Antwort aus den Gauges
    pub fn antwort(&self) -> HealthResponse {
        let m = &self.metriken;
        let slots_total = m.slots_total.get() as u64;
        let slots_unusable = m.slots_unusable.get() as u64;
        HealthResponse {
            status: HealthStatus::bewerten(slots_total, slots_unusable),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            slots_total,
            slots_occupied: m.slots_occupied.get() as u64,
            slots_unusable,
            waiting: m.wait_queue_length.get() as u64,
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(metriken: PortierMetrics) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(HealthState::neu(metriken))
}

/// `GET /health` – gibt den Pool-Status zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();
    let http_status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}
