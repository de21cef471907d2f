//! Broker – Slot-Tabelle + Warteschlange hinter einer Synchronisationsgrenze
//!
//! Alle Zustandsaenderungen (belegen, freigeben, einreihen, entnehmen)
//! passieren unter genau einem `parking_lot::Mutex`. Freigabe und Bedienung
//! der Warteschlange bilden einen einzigen kritischen Abschnitt, damit kein
//! frischer Client einem Wartenden zuvorkommt.
//!
//! Der Lock wird nie ueber ein `.await` gehalten. Benachrichtigungen an die
//! Verbindungs-Tasks laufen ueber unbeschraenkte mpsc-Kanaele, deren `send`
//! nicht blockiert.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use portier_core::{ClientId, WorkerId};
use portier_observability::metrics::{
    PortierMetrics, ERGEBNIS_ABGELEHNT, ERGEBNIS_WARTEND, ERGEBNIS_ZUGEWIESEN,
};

use crate::error::{BrokerError, BrokerResult, SlotFehler};
use crate::slot_table::{SlotTable, SlotZustand};
use crate::supervisor::StartErgebnis;
use crate::wait_queue::WaitQueue;

// ---------------------------------------------------------------------------
// Oeffentliche Typen
// ---------------------------------------------------------------------------

/// Nachricht des Brokers an eine Verbindungs-Task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Benachrichtigung {
    /// Wartender Client hat einen Slot erhalten
    Zugewiesen(u16),
    /// Slot entzogen (Admin, Worker-Ende) oder Kick
    Entzogen,
    /// Aus der Warteschlange verdraengt (Poll-Timeout)
    Verdraengt,
}

/// Slot-Anfrage eines Clients
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotAnfrage {
    pub anzeigename: Option<String>,
    pub rate_kbps: Option<u32>,
    pub warten: bool,
}

/// Ergebnis einer Slot-Anfrage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnfrageErgebnis {
    /// Freier Slot vergeben
    Zugewiesen(u16),
    /// Pool voll, eingereiht an 1-basierter Position
    Wartend { position: usize },
    /// Pool voll, Client wollte nicht warten
    Abgelehnt,
    /// Server faehrt herunter, es wird nichts mehr vergeben
    Herunterfahrend,
}

/// Anlass einer Slot-Freigabe (nur fuer Logs)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreigabeGrund {
    Admin,
    WorkerBeendet,
}

impl std::fmt::Display for FreigabeGrund {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::WorkerBeendet => write!(f, "worker_beendet"),
        }
    }
}

/// Aufraeumergebnis beim Trennen eines Clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrennErgebnis {
    /// Freigegebener Slot, falls der Client einen besass
    pub freigegeben: Option<u16>,
    /// Client stand in der Warteschlange
    pub aus_warteschlange: bool,
}

/// Konfiguration des Brokers
#[derive(Debug, Clone, Default)]
pub struct BrokerKonfig {
    /// Wartende ohne Poll laenger als dieser Wert werden verdraengt
    pub poll_timeout: Option<Duration>,
}

/// Zaehlerstand des Pools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub slots_gesamt: usize,
    pub belegt: usize,
    pub frei: usize,
    pub gesperrt: usize,
    pub wartend: usize,
    pub verbunden: usize,
}

/// Ein Slot fuer Admin-Listen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub port: u16,
    pub zustand: SlotZustand,
    pub worker: Option<WorkerId>,
    pub anzeigename: Option<String>,
    pub rate_kbps: Option<u32>,
}

/// Ein Wartender fuer Admin-Listen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarteInfo {
    pub position: usize,
    pub client: ClientId,
    pub anzeigename: String,
    pub wartet_seit_sek: u64,
    pub letzter_poll_sek: u64,
}

// ---------------------------------------------------------------------------
// Interner Zustand
// ---------------------------------------------------------------------------

struct SitzungInfo {
    peer: SocketAddr,
    anzeigename: String,
    rate_kbps: u32,
    verbunden_seit: DateTime<Utc>,
    sender: mpsc::UnboundedSender<Benachrichtigung>,
}

struct BrokerZustand {
    slots: SlotTable,
    warteschlange: WaitQueue,
    sitzungen: HashMap<ClientId, SitzungInfo>,
    /// Gesetzt ab [`Broker::herunterfahren`]; danach keine Vergabe mehr
    herunterfahrend: bool,
}

/// Zentraler Admission-Broker
pub struct Broker {
    zustand: Mutex<BrokerZustand>,
    konfig: BrokerKonfig,
    metriken: Option<PortierMetrics>,
}

impl Broker {
    pub fn neu(slots: SlotTable, konfig: BrokerKonfig, metriken: Option<PortierMetrics>) -> Self {
        let broker = Self {
            zustand: Mutex::new(BrokerZustand {
                slots,
                warteschlange: WaitQueue::neu(),
                sitzungen: HashMap::new(),
                herunterfahrend: false,
            }),
            konfig,
            metriken,
        };
        broker.metriken_aktualisieren(&broker.zustand.lock());
        broker
    }

    pub fn konfig(&self) -> &BrokerKonfig {
        &self.konfig
    }

    pub fn metriken(&self) -> Option<&PortierMetrics> {
        self.metriken.as_ref()
    }

    /// Stoppt jede weitere Slot-Vergabe
    ///
    /// Muss vor dem Shutdown-Signal an die Verbindungen laufen, sonst kann
    /// ein beim Trennen frei werdender Slot noch einem Wartenden zugeteilt
    /// werden.
    pub fn herunterfahren(&self) {
        let mut z = self.zustand.lock();
        if !z.herunterfahrend {
            z.herunterfahrend = true;
            tracing::info!(wartend = z.warteschlange.len(), "Broker faehrt herunter, keine Vergabe mehr");
        }
    }

    /// Alle Slot-Ports in Tabellenreihenfolge
    pub fn ports(&self) -> Vec<u16> {
        self.zustand.lock().slots.ports()
    }

    // -----------------------------------------------------------------------
    // Client-Lebenszyklus
    // -----------------------------------------------------------------------

    /// Registriert eine neue Verbindung
    pub fn anmelden(
        &self,
        peer: SocketAddr,
        sender: mpsc::UnboundedSender<Benachrichtigung>,
    ) -> ClientId {
        let client = ClientId::naechste();
        let mut z = self.zustand.lock();
        z.sitzungen.insert(
            client,
            SitzungInfo {
                peer,
                anzeigename: peer.to_string(),
                rate_kbps: 0,
                verbunden_seit: Utc::now(),
                sender,
            },
        );
        self.metriken_aktualisieren(&z);
        tracing::debug!(client = %client, peer = %peer, "Client angemeldet");
        client
    }

    /// Bearbeitet eine Slot-Anfrage
    ///
    /// Ein freier Slot (niedrigster Port) wird sofort vergeben. Sonst wird
    /// der Client eingereiht oder, wenn er nicht warten will, abgelehnt.
    pub fn anfordern(&self, client: ClientId, anfrage: SlotAnfrage) -> BrokerResult<AnfrageErgebnis> {
        let mut guard = self.zustand.lock();
        let z = &mut *guard;

        let sitzung = z
            .sitzungen
            .get_mut(&client)
            .ok_or(BrokerError::ClientUnbekannt(client))?;
        if let Some(port) = z.slots.slot_von_client(client) {
            return Err(SlotFehler::ClientHatBereitsSlot { client, port }.into());
        }
        if z.warteschlange.position(client).is_some() {
            return Err(BrokerError::UnerwarteteNachricht("wartend".into()));
        }

        if let Some(name) = anfrage.anzeigename.filter(|n| !n.is_empty()) {
            sitzung.anzeigename = name;
        }
        if let Some(rate) = anfrage.rate_kbps {
            sitzung.rate_kbps = rate;
        }

        // Wartende haben Vorrang vor neuen Anfragen
        self.warteschlange_bedienen(z);

        let ergebnis = if z.herunterfahrend {
            AnfrageErgebnis::Herunterfahrend
        } else {
            match z.slots.freien_slot_finden() {
                Some(port) => {
                    z.slots.belegen(port, client)?;
                    AnfrageErgebnis::Zugewiesen(port)
                }
                None if anfrage.warten => AnfrageErgebnis::Wartend {
                    position: z.warteschlange.einreihen(client),
                },
                None => AnfrageErgebnis::Abgelehnt,
            }
        };

        let anzeigename = z
            .sitzungen
            .get(&client)
            .map(|s| s.anzeigename.as_str())
            .unwrap_or("");
        match ergebnis {
            AnfrageErgebnis::Zugewiesen(port) => {
                tracing::info!(client = %client, anzeigename, port, "Slot zugewiesen");
            }
            AnfrageErgebnis::Wartend { position } => {
                tracing::info!(client = %client, anzeigename, position, "Pool voll, Client wartet");
            }
            AnfrageErgebnis::Abgelehnt => {
                tracing::info!(client = %client, anzeigename, "Pool voll, Client abgelehnt");
            }
            AnfrageErgebnis::Herunterfahrend => {
                tracing::info!(client = %client, anzeigename, "Anfrage waehrend Shutdown abgewiesen");
            }
        }

        if let Some(m) = &self.metriken {
            m.anfrage_zaehlen(match ergebnis {
                AnfrageErgebnis::Zugewiesen(_) => ERGEBNIS_ZUGEWIESEN,
                AnfrageErgebnis::Wartend { .. } => ERGEBNIS_WARTEND,
                AnfrageErgebnis::Abgelehnt | AnfrageErgebnis::Herunterfahrend => ERGEBNIS_ABGELEHNT,
            });
        }
        self.metriken_aktualisieren(z);
        Ok(ergebnis)
    }

    /// Vermerkt einen Warte-Poll; `false` wenn der Client nicht wartet
    pub fn poll(&self, client: ClientId) -> bool {
        self.zustand.lock().warteschlange.poll_vermerken(client)
    }

    /// Raeumt einen getrennten Client auf
    ///
    /// Massgeblich ist der Broker-Zustand, nicht die Sicht der Verbindung:
    /// ein gleichzeitig zugestellter Slot wird trotzdem genau einmal
    /// freigegeben. Mehrfacher Aufruf ist ohne Wirkung.
    pub fn trennen(&self, client: ClientId) -> TrennErgebnis {
        let mut guard = self.zustand.lock();
        let z = &mut *guard;

        let ergebnis = if z.sitzungen.remove(&client).is_none() {
            TrennErgebnis::default()
        } else {
            let aus_warteschlange = z.warteschlange.entfernen(client).is_some();
            let freigegeben = z.slots.slot_von_client(client);
            if let Some(port) = freigegeben {
                z.slots.freigeben(port);
                tracing::info!(client = %client, port, "Client getrennt, Slot freigegeben");
                self.warteschlange_bedienen(z);
            } else if aus_warteschlange {
                tracing::info!(client = %client, "Wartender Client getrennt");
            } else {
                tracing::debug!(client = %client, "Client getrennt");
            }
            TrennErgebnis {
                freigegeben,
                aus_warteschlange,
            }
        };

        self.metriken_aktualisieren(z);
        ergebnis
    }

    // -----------------------------------------------------------------------
    // Slot-Verwaltung
    // -----------------------------------------------------------------------

    /// Gibt einen Slot frei, entzieht ihn dem Besitzer und bedient die Warteschlange
    ///
    /// Idempotent: ein freier Slot bleibt unveraendert.
    pub fn slot_freigeben(&self, port: u16, grund: FreigabeGrund) -> BrokerResult<Option<ClientId>> {
        let mut guard = self.zustand.lock();
        let z = &mut *guard;

        if z.slots.slot(port).is_none() {
            return Err(SlotFehler::Unbekannt(port).into());
        }
        let besitzer = z.slots.freigeben(port);
        if let Some(client) = besitzer {
            tracing::info!(client = %client, port, grund = %grund, "Slot entzogen");
            Self::benachrichtigen(z, client, Benachrichtigung::Entzogen);
            self.warteschlange_bedienen(z);
        }
        self.metriken_aktualisieren(z);
        Ok(besitzer)
    }

    /// Verarbeitet das unerwartete Ende eines Workers
    ///
    /// Ohne Neustart wird der Slot freigegeben und der Warteschlange
    /// angeboten. Mit Neustart bleibt er bis [`Broker::worker_gestartet`]
    /// gesperrt. Veraltete Meldungen (anderer Worker am Slot) werden ignoriert.
    pub fn worker_beendet(&self, port: u16, worker: WorkerId, neustart: bool) -> Option<ClientId> {
        let mut guard = self.zustand.lock();
        let z = &mut *guard;

        match z.slots.slot(port) {
            Some(slot) if slot.worker() == Some(worker) => {}
            _ => {
                tracing::debug!(port, worker = %worker, "Veraltete Worker-Meldung ignoriert");
                return None;
            }
        }

        let besitzer = if neustart {
            z.slots.sperren(port).ok().flatten()
        } else {
            let _ = z.slots.worker_setzen(port, None);
            z.slots.freigeben(port)
        };

        if let Some(client) = besitzer {
            tracing::info!(client = %client, port, grund = %FreigabeGrund::WorkerBeendet, "Slot entzogen");
            Self::benachrichtigen(z, client, Benachrichtigung::Entzogen);
        }
        if !neustart {
            self.warteschlange_bedienen(z);
        }
        self.metriken_aktualisieren(z);
        besitzer
    }

    /// Traegt einen (neu) gestarteten Worker ein und hebt eine Sperre auf
    pub fn worker_gestartet(&self, port: u16, worker: WorkerId) -> BrokerResult<()> {
        let mut guard = self.zustand.lock();
        let z = &mut *guard;

        z.slots.worker_setzen(port, Some(worker))?;
        if z.slots.entsperren(port)? {
            tracing::info!(port, worker = %worker, "Slot wieder nutzbar");
            self.warteschlange_bedienen(z);
        }
        self.metriken_aktualisieren(z);
        Ok(())
    }

    /// Sperrt einen Slot; ein Besitzer erhaelt `Entzogen`
    pub fn slot_sperren(&self, port: u16) -> BrokerResult<()> {
        let mut guard = self.zustand.lock();
        let z = &mut *guard;

        if let Some(client) = z.slots.sperren(port)? {
            Self::benachrichtigen(z, client, Benachrichtigung::Entzogen);
        }
        tracing::warn!(port, "Slot gesperrt");
        self.metriken_aktualisieren(z);
        Ok(())
    }

    /// Uebernimmt die Ergebnisse des Worker-Starts in die Slot-Tabelle
    pub fn start_ergebnisse_uebernehmen(&self, ergebnisse: &[StartErgebnis]) {
        let mut guard = self.zustand.lock();
        let z = &mut *guard;

        for e in ergebnisse {
            let r = match &e.ergebnis {
                Ok(worker) => z.slots.worker_setzen(e.port, Some(*worker)),
                Err(fehler) => {
                    tracing::error!(port = e.port, fehler = %fehler, "Worker nicht startbar, Slot gesperrt");
                    z.slots.sperren(e.port).map(|_| ())
                }
            };
            if let Err(fehler) = r {
                tracing::warn!(port = e.port, fehler = %fehler, "Start-Ergebnis fuer unbekannten Slot");
            }
        }
        self.metriken_aktualisieren(z);
    }

    // -----------------------------------------------------------------------
    // Warteschlange
    // -----------------------------------------------------------------------

    /// Verdraengt Wartende, deren letzter Poll zu lange zurueckliegt
    pub fn abgelaufene_verdraengen(&self, jetzt: Instant) -> Vec<ClientId> {
        let Some(timeout) = self.konfig.poll_timeout else {
            return Vec::new();
        };

        let mut guard = self.zustand.lock();
        let z = &mut *guard;

        let abgelaufen = z.warteschlange.abgelaufene(timeout, jetzt);
        for client in &abgelaufen {
            z.warteschlange.entfernen(*client);
            tracing::info!(client = %client, timeout_sek = timeout.as_secs(), "Wartender verdraengt");
            Self::benachrichtigen(z, *client, Benachrichtigung::Verdraengt);
        }
        if !abgelaufen.is_empty() {
            self.metriken_aktualisieren(z);
        }
        abgelaufen
    }

    /// Vergibt freie Slots an die Spitze der Warteschlange
    ///
    /// Ist der Kanal eines Wartenden schon geschlossen, wird die Vergabe
    /// rueckgaengig gemacht und der naechste versucht.
    fn warteschlange_bedienen(&self, z: &mut BrokerZustand) {
        if z.herunterfahrend {
            return;
        }
        while let Some(port) = z.slots.freien_slot_finden() {
            let Some(eintrag) = z.warteschlange.naechster() else {
                break;
            };
            let Some(sitzung) = z.sitzungen.get(&eintrag.client) else {
                continue;
            };
            if z.slots.belegen(port, eintrag.client).is_err() {
                continue;
            }
            if sitzung.sender.send(Benachrichtigung::Zugewiesen(port)).is_err() {
                z.slots.freigeben(port);
                tracing::debug!(client = %eintrag.client, "Wartender nicht mehr erreichbar, uebersprungen");
                continue;
            }

            let gewartet = eintrag.eingereiht.elapsed();
            if let Some(m) = &self.metriken {
                m.wait_seconds.observe(gewartet.as_secs_f64());
            }
            tracing::info!(
                client = %eintrag.client,
                anzeigename = %sitzung.anzeigename,
                port,
                gewartet_ms = gewartet.as_millis() as u64,
                "Wartendem Client Slot zugewiesen"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Admin
    // -----------------------------------------------------------------------

    /// Trennt einen Client ueber seine Verbindung (Antwort `-3`)
    pub fn client_kicken(&self, client: ClientId) -> BrokerResult<()> {
        let z = self.zustand.lock();
        let sitzung = z
            .sitzungen
            .get(&client)
            .ok_or(BrokerError::ClientUnbekannt(client))?;
        // Aufraeumen uebernimmt die Verbindungs-Task via `trennen`
        let _ = sitzung.sender.send(Benachrichtigung::Entzogen);
        tracing::info!(client = %client, peer = %sitzung.peer, "Client gekickt");
        Ok(())
    }

    pub fn status(&self) -> PoolStatus {
        let z = self.zustand.lock();
        PoolStatus {
            slots_gesamt: z.slots.len(),
            belegt: z.slots.belegt_anzahl(),
            frei: z.slots.frei_anzahl(),
            gesperrt: z.slots.gesperrt_anzahl(),
            wartend: z.warteschlange.len(),
            verbunden: z.sitzungen.len(),
        }
    }

    pub fn slot_liste(&self) -> Vec<SlotInfo> {
        let z = self.zustand.lock();
        z.slots
            .eintraege()
            .map(|slot| {
                let sitzung = slot.besitzer().and_then(|c| z.sitzungen.get(&c));
                SlotInfo {
                    port: slot.port(),
                    zustand: slot.zustand(),
                    worker: slot.worker(),
                    anzeigename: sitzung.map(|s| s.anzeigename.clone()),
                    rate_kbps: sitzung.map(|s| s.rate_kbps),
                }
            })
            .collect()
    }

    pub fn warteschlange_liste(&self) -> Vec<WarteInfo> {
        let z = self.zustand.lock();
        z.warteschlange
            .eintraege()
            .enumerate()
            .map(|(i, e)| WarteInfo {
                position: i + 1,
                client: e.client,
                anzeigename: z
                    .sitzungen
                    .get(&e.client)
                    .map(|s| s.anzeigename.clone())
                    .unwrap_or_default(),
                wartet_seit_sek: e.eingereiht.elapsed().as_secs(),
                letzter_poll_sek: e.letzter_poll.elapsed().as_secs(),
            })
            .collect()
    }

    /// Anmeldezeitpunkt eines Clients
    pub fn verbunden_seit(&self, client: ClientId) -> Option<DateTime<Utc>> {
        self.zustand.lock().sitzungen.get(&client).map(|s| s.verbunden_seit)
    }

    // -----------------------------------------------------------------------
    // Hilfsfunktionen
    // -----------------------------------------------------------------------

    fn benachrichtigen(z: &BrokerZustand, client: ClientId, b: Benachrichtigung) {
        if let Some(sitzung) = z.sitzungen.get(&client) {
            let _ = sitzung.sender.send(b);
        }
    }

    fn metriken_aktualisieren(&self, z: &BrokerZustand) {
        if let Some(m) = &self.metriken {
            m.slots_total.set(z.slots.len() as f64);
            m.slots_occupied.set(z.slots.belegt_anzahl() as f64);
            m.slots_unusable.set(z.slots.gesperrt_anzahl() as f64);
            m.wait_queue_length.set(z.warteschlange.len() as f64);
            m.connected_clients.set(z.sitzungen.len() as f64);
        }
    }
}
