//! Gemeinsame Identifikationstypen fuer Portier
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Client- und Worker-Kennungen zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Globaler Client-Zaehler (atomar, thread-safe)
///
/// Beginnt bei 1 (0 ist reserviert) und inkrementiert monoton.
static CLIENT_ZAEHLER: AtomicU64 = AtomicU64::new(1);

/// Eindeutige Kennung einer Admission-Sitzung
///
/// Wird beim Akzeptieren einer Control-Verbindung vergeben und bleibt fuer
/// die Lebensdauer des Server-Prozesses eindeutig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl ClientId {
    /// Vergibt die naechste freie ClientId
    pub fn naechste() -> Self {
        Self(CLIENT_ZAEHLER.fetch_add(1, Ordering::Relaxed))
    }

    /// Gibt den numerischen Wert zurueck
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client:{}", self.0)
    }
}

impl std::str::FromStr for ClientId {
    type Err = std::num::ParseIntError;

    /// Akzeptiert sowohl `42` als auch `client:42`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let zahl = s.strip_prefix("client:").unwrap_or(s);
        zahl.parse::<u64>().map(Self)
    }
}

/// Prozess-Kennung eines Workers (Betriebssystem-PID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u32);

impl WorkerId {
    /// Gibt die PID zurueck
    pub fn pid(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pid:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_eindeutig() {
        let a = ClientId::naechste();
        let b = ClientId::naechste();
        assert_ne!(a, b, "Zwei neue ClientIds muessen verschieden sein");
        assert!(b > a);
    }

    #[test]
    fn client_id_display_und_parse() {
        let id = ClientId(7);
        assert_eq!(id.to_string(), "client:7");
        assert_eq!("client:7".parse::<ClientId>().unwrap(), id);
        assert_eq!("7".parse::<ClientId>().unwrap(), id);
        assert!("client:x".parse::<ClientId>().is_err());
    }

    #[test]
    fn worker_id_display() {
        assert_eq!(WorkerId(4711).to_string(), "pid:4711");
    }

    #[test]
    fn ids_sind_serde_kompatibel() {
        let id = ClientId(99);
        let json = serde_json::to_string(&id).unwrap();
        let id2: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, id2);
    }
}
