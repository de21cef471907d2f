//! portier-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Portier-Crates gemeinsam genutzt werden.

pub mod error;
pub mod types;
pub mod vorlage;

// Re-Exporte fuer bequemen Zugriff
pub use error::{PortierError, Result};
pub use types::{ClientId, WorkerId};
pub use vorlage::BefehlsVorlage;
