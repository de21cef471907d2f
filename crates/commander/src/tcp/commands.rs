//! Uebersetzung zwischen Textzeilen und Admin-Befehlen
//!
//! Listen werden wie im ServerQuery-Stil als `|`-getrennte Eintraege in
//! einer einzigen `ok`-Zeile ausgegeben.

use portier_broker::{SlotInfo, SlotZustand, WarteInfo};
use portier_core::ClientId;
use portier_protocol::parser::{encode_value, kv_liste, ok_antwort};
use portier_protocol::ParsedCommand;

use crate::commands::types::{AdminAntwort, AdminBefehl};
use crate::error::{CommanderError, CommanderResult};

/// Konvertiert einen ParsedCommand in einen AdminBefehl
pub fn tcp_befehl_zu_befehl(cmd: &ParsedCommand) -> CommanderResult<AdminBefehl> {
    match cmd.name.as_str() {
        "status" | "serverinfo" => Ok(AdminBefehl::Status),
        "slotlist" => Ok(AdminBefehl::SlotListe),
        "queuelist" => Ok(AdminBefehl::WarteschlangeListe),
        "release" => Ok(AdminBefehl::SlotFreigeben {
            port: cmd.required_zahl("port")?,
        }),
        "kick" | "clientkick" => {
            let roh = cmd.required_param("client")?;
            let client = roh.parse::<ClientId>().map_err(|_| {
                CommanderError::UngueltigeEingabe(format!("client={roh} ist keine Client-ID"))
            })?;
            Ok(AdminBefehl::ClientKicken { client })
        }
        "restart" => Ok(AdminBefehl::WorkerNeustarten {
            port: cmd.required_zahl("port")?,
        }),
        other => Err(CommanderError::Protokoll(format!(
            "Unbekannter Befehl: {other}"
        ))),
    }
}

/// Formatiert eine Antwort als TCP-Antwortzeile
pub fn antwort_formatieren(antwort: &AdminAntwort) -> String {
    match antwort {
        AdminAntwort::Ok => ok_antwort(&[]),
        AdminAntwort::Status(s) => ok_antwort(&[
            ("slots", &s.pool.slots_gesamt.to_string()),
            ("occupied", &s.pool.belegt.to_string()),
            ("free", &s.pool.frei.to_string()),
            ("unusable", &s.pool.gesperrt.to_string()),
            ("waiting", &s.pool.wartend.to_string()),
            ("clients", &s.pool.verbunden.to_string()),
            ("uptime", &s.uptime_secs.to_string()),
            ("version", &s.version),
        ]),
        AdminAntwort::SlotListe(slots) => liste(slots.iter().map(slot_eintrag)),
        AdminAntwort::WarteschlangeListe(wartende) => liste(wartende.iter().map(warte_eintrag)),
        AdminAntwort::Freigegeben { port, client } => {
            let port = port.to_string();
            match client {
                Some(c) => ok_antwort(&[("port", &port), ("client", &c.inner().to_string())]),
                None => ok_antwort(&[("port", &port)]),
            }
        }
        AdminAntwort::Neugestartet { port, worker } => ok_antwort(&[
            ("port", &port.to_string()),
            ("pid", &worker.pid().to_string()),
        ]),
    }
}

fn liste(eintraege: impl Iterator<Item = String>) -> String {
    let eintraege: Vec<String> = eintraege.collect();
    if eintraege.is_empty() {
        return ok_antwort(&[]);
    }
    format!("ok {}\n", eintraege.join("|"))
}

fn slot_eintrag(slot: &SlotInfo) -> String {
    let mut felder = vec![
        ("port", slot.port.to_string()),
        ("state", slot.zustand.name().to_string()),
    ];
    if let Some(worker) = slot.worker {
        felder.push(("pid", worker.pid().to_string()));
    }
    if let SlotZustand::Belegt(client) = slot.zustand {
        felder.push(("client", client.inner().to_string()));
    }
    if let Some(name) = &slot.anzeigename {
        felder.push(("name", name.clone()));
    }
    if let Some(rate) = slot.rate_kbps {
        felder.push(("rate", rate.to_string()));
    }
    let felder: Vec<(&str, &str)> = felder.iter().map(|(k, v)| (*k, v.as_str())).collect();
    kv_liste(&felder)
}

fn warte_eintrag(w: &WarteInfo) -> String {
    format!(
        "pos={} client={} name={} waited={} lastpoll={}",
        w.position,
        w.client.inner(),
        encode_value(&w.anzeigename),
        w.wartet_seit_sek,
        w.letzter_poll_sek
    )
}
