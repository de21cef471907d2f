//! Befehls- und Antworttypen des Admin-Kanals

use portier_broker::{PoolStatus, SlotInfo, WarteInfo};
use portier_core::{ClientId, WorkerId};

/// Alle unterstuetzten Admin-Befehle (ohne `login`/`quit`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminBefehl {
    /// Pool-Zusammenfassung
    Status,
    /// Alle Slots mit Belegung
    SlotListe,
    /// Wartende Clients in Bedienreihenfolge
    WarteschlangeListe,
    /// Slot freigeben; der Besitzer erhaelt `-3`
    SlotFreigeben { port: u16 },
    /// Client-Verbindung trennen
    ClientKicken { client: ClientId },
    /// Worker eines Slots neu starten und Sperre aufheben
    WorkerNeustarten { port: u16 },
}

/// Server-Zusammenfassung fuer `status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusAntwort {
    pub pool: PoolStatus,
    pub version: String,
    pub uptime_secs: u64,
}

/// Ergebnis eines Admin-Befehls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAntwort {
    Ok,
    Status(StatusAntwort),
    SlotListe(Vec<SlotInfo>),
    WarteschlangeListe(Vec<WarteInfo>),
    Freigegeben {
        port: u16,
        client: Option<ClientId>,
    },
    Neugestartet {
        port: u16,
        worker: WorkerId,
    },
}
