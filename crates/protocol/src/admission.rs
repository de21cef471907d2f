//! Admission-Protokoll zwischen Sender und Broker
//!
//! ## Client -> Server
//! ```text
//! slot [name=<anzeigename>] [rate=<kbps>] [wait=<0|1>]   Slot anfordern
//! wait                                                   Warte-Poll (Keep-Alive)
//! quit                                                   Verbindung ordentlich beenden
//! ```
//!
//! ## Server -> Client
//! Jede Antwort ist genau eine Ganzzahl pro Zeile:
//!
//! | Wert | Bedeutung |
//! |------|-----------|
//! | `> 0` | zugewiesener Port |
//! | `0`  | Pool voll, in Warteschlange eingereiht |
//! | `-1` | Pool voll, Warten nicht gewuenscht |
//! | `-2` | ungueltige oder unerwartete Nachricht |
//! | `-3` | Zuweisung entzogen / Server faehrt herunter |
//! | `-4` | aus der Warteschlange verdraengt (Poll-Timeout) |

use crate::error::{ProtokollFehler, ProtokollResult};
use crate::parser::{encode_value, parse_line};

/// Keep-Alive-Token eines wartenden Clients
pub const WARTE_TOKEN: &str = "wait";

/// Nachricht vom Sender an den Broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionNachricht {
    /// Slot anfordern
    SlotAnfrage {
        /// Anzeigename des Senders (optional)
        anzeigename: Option<String>,
        /// Angefragte Bitrate in kbit/s (optional, nur informativ)
        rate_kbps: Option<u32>,
        /// Ob der Client bei vollem Pool warten will
        warten: bool,
    },
    /// Warte-Poll
    Warten,
    /// Ordentliches Verbindungsende
    Beenden,
}

impl AdmissionNachricht {
    /// Parst eine empfangene Zeile
    ///
    /// Fehlt `wait=` in einer Slot-Anfrage, wird Warten angenommen.
    pub fn parsen(zeile: &str) -> ProtokollResult<Self> {
        let cmd = parse_line(zeile)?;
        match cmd.name.as_str() {
            "slot" | "request" => Ok(Self::SlotAnfrage {
                anzeigename: cmd.param("name").map(String::from),
                rate_kbps: cmd.zahl_param("rate")?,
                warten: cmd.flag_param("wait")?.unwrap_or(true),
            }),
            WARTE_TOKEN => Ok(Self::Warten),
            "quit" => Ok(Self::Beenden),
            other => Err(ProtokollFehler::UnbekannterBefehl(other.to_string())),
        }
    }

    /// Kodiert die Nachricht als Zeile (ohne abschliessendes `\n`)
    pub fn zeile(&self) -> String {
        match self {
            Self::SlotAnfrage {
                anzeigename,
                rate_kbps,
                warten,
            } => {
                let mut zeile = String::from("slot");
                if let Some(name) = anzeigename {
                    zeile.push_str(&format!(" name={}", encode_value(name)));
                }
                if let Some(rate) = rate_kbps {
                    zeile.push_str(&format!(" rate={rate}"));
                }
                zeile.push_str(if *warten { " wait=1" } else { " wait=0" });
                zeile
            }
            Self::Warten => WARTE_TOKEN.to_string(),
            Self::Beenden => "quit".to_string(),
        }
    }
}

/// Antwort des Brokers an den Sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Antwort {
    /// Slot zugewiesen, Medien-Pipeline auf diesem Port starten
    Port(u16),
    /// Eingereiht, weiter warten
    Wartend,
    /// Pool voll und Warten nicht gewuenscht
    Voll,
    /// Ungueltige oder unerwartete Nachricht
    Protokollfehler,
    /// Zuweisung entzogen oder Server-Shutdown
    Entzogen,
    /// Aus der Warteschlange verdraengt
    Verdraengt,
}

impl Antwort {
    /// Numerischer Wire-Code
    pub fn code(&self) -> i32 {
        match self {
            Self::Port(p) => i32::from(*p),
            Self::Wartend => 0,
            Self::Voll => -1,
            Self::Protokollfehler => -2,
            Self::Entzogen => -3,
            Self::Verdraengt => -4,
        }
    }

    /// Dekodiert einen Wire-Code
    pub fn aus_code(code: i32) -> ProtokollResult<Self> {
        match code {
            0 => Ok(Self::Wartend),
            -1 => Ok(Self::Voll),
            -2 => Ok(Self::Protokollfehler),
            -3 => Ok(Self::Entzogen),
            -4 => Ok(Self::Verdraengt),
            p if p > 0 => u16::try_from(p)
                .map(Self::Port)
                .map_err(|_| ProtokollFehler::UngueltigeAntwort(code.to_string())),
            _ => Err(ProtokollFehler::UngueltigeAntwort(code.to_string())),
        }
    }

    /// Parst eine empfangene Antwortzeile
    pub fn parsen(zeile: &str) -> ProtokollResult<Self> {
        let zeile = zeile.trim();
        let code = zeile
            .parse::<i32>()
            .map_err(|_| ProtokollFehler::UngueltigeAntwort(zeile.to_string()))?;
        Self::aus_code(code)
    }

    /// Kodiert die Antwort als Zeile (ohne abschliessendes `\n`)
    pub fn zeile(&self) -> String {
        self.code().to_string()
    }

    /// Beendet diese Antwort die Sitzung?
    pub fn ist_endgueltig(&self) -> bool {
        self.code() < 0
    }
}

impl std::fmt::Display for Antwort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Port(p) => write!(f, "Port {p}"),
            Self::Wartend => write!(f, "wartend"),
            Self::Voll => write!(f, "abgelehnt (Pool voll)"),
            Self::Protokollfehler => write!(f, "Protokollfehler"),
            Self::Entzogen => write!(f, "entzogen"),
            Self::Verdraengt => write!(f, "verdraengt"),
        }
    }
}
