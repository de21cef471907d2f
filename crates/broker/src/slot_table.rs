//! Slot-Tabelle – autoritative Belegung des Worker-Pools
//!
//! Reine Daten + Invarianten, keine I/O. Die Tabelle wird einmal beim Start
//! mit N Slots auf aufeinanderfolgenden Ports angelegt; ihre Groesse aendert
//! sich danach nie.
//!
//! ## Invarianten
//! - Ports sind eindeutig und nach Erstellung unveraenderlich
//! - Ein Slot hat hoechstens einen Besitzer
//! - Ein Client besitzt hoechstens einen Slot
//! - Fehlgeschlagene Operationen veraendern die Tabelle nicht
//!
//! Schreibzugriffe erfolgen ausschliesslich ueber den [`crate::Broker`],
//! der die Tabelle zusammen mit der Warteschlange hinter einem Lock haelt.

use portier_core::{ClientId, WorkerId};

use crate::error::{BrokerError, BrokerResult, SlotFehler};

/// Belegungszustand eines Slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotZustand {
    /// Frei, kann vergeben werden
    Frei,
    /// An einen Client vergeben
    Belegt(ClientId),
    /// Nicht nutzbar (Worker nicht startbar), wird nie vergeben
    Gesperrt,
}

impl SlotZustand {
    /// Kurzname fuer Admin-Ausgaben
    pub fn name(&self) -> &'static str {
        match self {
            Self::Frei => "frei",
            Self::Belegt(_) => "belegt",
            Self::Gesperrt => "gesperrt",
        }
    }
}

/// Ein Slot: Port + Belegung + gebundener Worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    port: u16,
    zustand: SlotZustand,
    worker: Option<WorkerId>,
}

impl Slot {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn zustand(&self) -> SlotZustand {
        self.zustand
    }

    pub fn worker(&self) -> Option<WorkerId> {
        self.worker
    }

    pub fn besitzer(&self) -> Option<ClientId> {
        match self.zustand {
            SlotZustand::Belegt(c) => Some(c),
            _ => None,
        }
    }

    pub fn ist_frei(&self) -> bool {
        self.zustand == SlotZustand::Frei
    }
}

/// Tabelle aller Slots, geordnet nach Port (aufsteigend)
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    /// Legt N freie Slots auf den Ports `basis_port .. basis_port + anzahl` an
    ///
    /// Scheitert bei `anzahl == 0`, Port 0 oder wenn der Portbereich ueber
    /// 65535 hinausreicht.
    pub fn neu(basis_port: u16, anzahl: usize) -> BrokerResult<Self> {
        if anzahl == 0 {
            return Err(BrokerError::UngueltigeTabelle(
                "mindestens ein Slot erforderlich".into(),
            ));
        }
        if basis_port == 0 {
            return Err(BrokerError::UngueltigeTabelle(
                "Basis-Port 0 ist nicht erlaubt".into(),
            ));
        }
        let letzter = u16::try_from(anzahl - 1)
            .ok()
            .and_then(|abstand| basis_port.checked_add(abstand))
            .ok_or_else(|| {
                BrokerError::UngueltigeTabelle(format!(
                    "{anzahl} Slots ab Port {basis_port} ueberschreiten 65535"
                ))
            })?;

        let slots = (basis_port..=letzter)
            .map(|port| Slot {
                port,
                zustand: SlotZustand::Frei,
                worker: None,
            })
            .collect();

        Ok(Self { slots })
    }

    /// Anzahl der Slots (N)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Die Tabelle ist nie leer; nur fuer API-Vollstaendigkeit
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Alle Ports in Tabellenreihenfolge
    pub fn ports(&self) -> Vec<u16> {
        self.slots.iter().map(|s| s.port).collect()
    }

    /// Lesezugriff auf einen Slot
    pub fn slot(&self, port: u16) -> Option<&Slot> {
        self.index(port).map(|i| &self.slots[i])
    }

    /// Alle Slots (Snapshot-Iteration)
    pub fn eintraege(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    fn index(&self, port: u16) -> Option<usize> {
        // Ports sind aufeinanderfolgend, daher direkte Berechnung
        let basis = self.slots.first()?.port;
        let i = usize::from(port.checked_sub(basis)?);
        (i < self.slots.len()).then_some(i)
    }

    /// Erster freier Slot in Tabellenreihenfolge (niedrigster Port)
    pub fn freien_slot_finden(&self) -> Option<u16> {
        self.slots.iter().find(|s| s.ist_frei()).map(|s| s.port)
    }

    /// Port des Slots, den `client` besitzt
    pub fn slot_von_client(&self, client: ClientId) -> Option<u16> {
        self.slots
            .iter()
            .find(|s| s.besitzer() == Some(client))
            .map(|s| s.port)
    }

    /// Vergibt einen freien Slot an `client`
    pub fn belegen(&mut self, port: u16, client: ClientId) -> Result<(), SlotFehler> {
        if let Some(eigener) = self.slot_von_client(client) {
            return Err(SlotFehler::ClientHatBereitsSlot {
                client,
                port: eigener,
            });
        }
        let i = self.index(port).ok_or(SlotFehler::Unbekannt(port))?;
        let slot = &mut self.slots[i];
        match slot.zustand {
            SlotZustand::Frei => {
                slot.zustand = SlotZustand::Belegt(client);
                Ok(())
            }
            SlotZustand::Belegt(besitzer) => Err(SlotFehler::BereitsBelegt { port, besitzer }),
            SlotZustand::Gesperrt => Err(SlotFehler::Gesperrt(port)),
        }
    }

    /// Gibt einen belegten Slot frei und liefert den bisherigen Besitzer
    ///
    /// Idempotent: ein freier, gesperrter oder unbekannter Slot bleibt
    /// unveraendert und das Ergebnis ist `None`.
    pub fn freigeben(&mut self, port: u16) -> Option<ClientId> {
        let i = self.index(port)?;
        let slot = &mut self.slots[i];
        match slot.zustand {
            SlotZustand::Belegt(besitzer) => {
                slot.zustand = SlotZustand::Frei;
                Some(besitzer)
            }
            _ => None,
        }
    }

    /// Sperrt einen Slot; ein eventueller Besitzer wird zurueckgegeben
    pub fn sperren(&mut self, port: u16) -> Result<Option<ClientId>, SlotFehler> {
        let i = self.index(port).ok_or(SlotFehler::Unbekannt(port))?;
        let slot = &mut self.slots[i];
        let besitzer = slot.besitzer();
        slot.zustand = SlotZustand::Gesperrt;
        slot.worker = None;
        Ok(besitzer)
    }

    /// Hebt eine Sperre auf; der Slot wird frei
    ///
    /// Gibt `true` zurueck wenn der Slot gesperrt war.
    pub fn entsperren(&mut self, port: u16) -> Result<bool, SlotFehler> {
        let i = self.index(port).ok_or(SlotFehler::Unbekannt(port))?;
        let slot = &mut self.slots[i];
        if slot.zustand == SlotZustand::Gesperrt {
            slot.zustand = SlotZustand::Frei;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Setzt oder loescht die Worker-Kennung eines Slots
    pub fn worker_setzen(&mut self, port: u16, worker: Option<WorkerId>) -> Result<(), SlotFehler> {
        let i = self.index(port).ok_or(SlotFehler::Unbekannt(port))?;
        self.slots[i].worker = worker;
        Ok(())
    }

    /// Anzahl belegter Slots
    pub fn belegt_anzahl(&self) -> usize {
        self.zaehlen(|z| matches!(z, SlotZustand::Belegt(_)))
    }

    /// Anzahl freier Slots
    pub fn frei_anzahl(&self) -> usize {
        self.zaehlen(|z| z == SlotZustand::Frei)
    }

    /// Anzahl gesperrter Slots
    pub fn gesperrt_anzahl(&self) -> usize {
        self.zaehlen(|z| z == SlotZustand::Gesperrt)
    }

    fn zaehlen(&self, f: impl Fn(SlotZustand) -> bool) -> usize {
        self.slots.iter().filter(|s| f(s.zustand)).count()
    }
}
