//! portier-sender – Sendeseite von Portier
//!
//! Fordert beim Admission-Server einen Slot an, wartet bei Bedarf und
//! startet nach der Zuweisung die externe Medien-Pipeline.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod sitzung;

pub use client::AdmissionClient;
pub use config::SenderConfig;
pub use error::{SenderError, SenderResult};
pub use pipeline::MedienPipeline;
pub use sitzung::{sitzung_ausfuehren, SitzungsEnde};
