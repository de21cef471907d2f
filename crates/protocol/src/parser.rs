//! Befehlsparser im ServerQuery-Stil
//!
//! Parst zeilenbasierte Befehle im Format:
//!   befehlsname key1=value1 key2="value with spaces" key3=wert3
//!
//! Sonderzeichen in Werten werden mit Backslash escaped:
//!   \s = Leerzeichen, \n = Newline, \\ = Backslash, \| = Pipe

use std::collections::HashMap;

use crate::error::{ProtokollFehler, ProtokollResult};

/// Ein geparster Befehl
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    /// Befehlsname (z.B. "slot", "status")
    pub name: String,
    /// Key-Value-Parameter
    pub params: HashMap<String, String>,
}

impl ParsedCommand {
    /// Gibt einen Parameter als String zurueck
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.as_str())
    }

    /// Gibt einen Pflicht-Parameter zurueck oder einen Fehler
    pub fn required_param(&self, key: &str) -> ProtokollResult<&str> {
        self.param(key)
            .ok_or_else(|| ProtokollFehler::ParameterFehlt(key.to_string()))
    }

    /// Gibt einen optionalen Zahlen-Parameter zurueck
    ///
    /// Fehlt der Parameter, ist das Ergebnis `Ok(None)`; ist er vorhanden
    /// aber keine Zahl, ein Fehler.
    pub fn zahl_param<T: std::str::FromStr>(&self, key: &str) -> ProtokollResult<Option<T>> {
        match self.param(key) {
            None => Ok(None),
            Some(s) => s.parse::<T>().map(Some).map_err(|_| ProtokollFehler::UngueltigerWert {
                schluessel: key.to_string(),
                wert: s.to_string(),
            }),
        }
    }

    /// Gibt einen Pflicht-Zahlen-Parameter zurueck
    pub fn required_zahl<T: std::str::FromStr>(&self, key: &str) -> ProtokollResult<T> {
        self.zahl_param(key)?
            .ok_or_else(|| ProtokollFehler::ParameterFehlt(key.to_string()))
    }

    /// Gibt einen Flag-Parameter zurueck (`1`/`true`/`yes` bzw. `0`/`false`/`no`)
    pub fn flag_param(&self, key: &str) -> ProtokollResult<Option<bool>> {
        match self.param(key) {
            None => Ok(None),
            Some("1") | Some("true") | Some("yes") => Ok(Some(true)),
            Some("0") | Some("false") | Some("no") => Ok(Some(false)),
            Some(other) => Err(ProtokollFehler::UngueltigerWert {
                schluessel: key.to_string(),
                wert: other.to_string(),
            }),
        }
    }
}

/// Parst eine Befehlszeile im ServerQuery-Format
///
/// Format: `befehlsname [key=value ...]`. Befehlsname und Schluessel werden
/// kleingeschrieben, Tokens ohne `=` ignoriert.
pub fn parse_line(line: &str) -> ProtokollResult<ParsedCommand> {
    let mut tokens = zerlegen(line.trim()).into_iter();
    let name = tokens
        .next()
        .ok_or(ProtokollFehler::LeereZeile)?
        .to_lowercase();

    let params = tokens
        .filter_map(|token| {
            token
                .split_once('=')
                .map(|(k, v)| (k.to_lowercase(), v.to_string()))
        })
        .collect();

    Ok(ParsedCommand { name, params })
}

/// Zerlegt eine Zeile an Leerraum; `"..."` gruppiert, `\x` escaped
fn zerlegen(zeile: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut aktuell = String::new();
    let mut gequotet = false;
    let mut zeichen = zeile.chars();

    while let Some(c) = zeichen.next() {
        match (c, gequotet) {
            ('"', _) => gequotet = !gequotet,
            (' ' | '\t', false) => {
                if !aktuell.is_empty() {
                    tokens.push(std::mem::take(&mut aktuell));
                }
            }
            ('\\', _) => match zeichen.next() {
                Some('s') => aktuell.push(' '),
                Some('n') => aktuell.push('\n'),
                Some(e @ ('\\' | '|' | '"')) => aktuell.push(e),
                Some(anderes) => {
                    aktuell.push('\\');
                    aktuell.push(anderes);
                }
                None => aktuell.push('\\'),
            },
            _ => aktuell.push(c),
        }
    }

    if !aktuell.is_empty() {
        tokens.push(aktuell);
    }
    tokens
}

/// Kodiert einen Wert fuer die Ausgabe (Escape-Sequenzen einfuegen)
pub fn encode_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(' ', "\\s")
        .replace('\n', "\\n")
        .replace('|', "\\|")
}

/// Erstellt eine Erfolgs-Antwortzeile
pub fn ok_antwort(params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        "ok\n".to_string()
    } else {
        format!("ok {}\n", kv_liste(params))
    }
}

/// Formatiert Key-Value-Paare als `k=v k2=v2` (Werte escaped)
pub fn kv_liste(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, encode_value(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Erstellt eine Fehler-Antwortzeile
pub fn fehler_antwort(code: u32, nachricht: &str) -> String {
    format!("error id={} msg={}\n", code, encode_value(nachricht))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_einfacher_befehl() {
        let cmd = parse_line("status").unwrap();
        assert_eq!(cmd.name, "status");
        assert!(cmd.params.is_empty());
    }

    #[test]
    fn parse_befehl_mit_params() {
        let cmd = parse_line("slot name=Copain rate=64 wait=1").unwrap();
        assert_eq!(cmd.name, "slot");
        assert_eq!(cmd.param("name"), Some("Copain"));
        assert_eq!(cmd.zahl_param::<u32>("rate").unwrap(), Some(64));
        assert_eq!(cmd.flag_param("wait").unwrap(), Some(true));
    }

    #[test]
    fn parse_escaped_leerzeichen() {
        let cmd = parse_line(r"slot name=Studio\sA").unwrap();
        assert_eq!(cmd.param("name"), Some("Studio A"));
    }

    #[test]
    fn parse_quoted_wert() {
        let cmd = parse_line(r#"slot name="Buehne links""#).unwrap();
        assert_eq!(cmd.param("name"), Some("Buehne links"));
    }

    #[test]
    fn parse_case_insensitive_name() {
        let cmd = parse_line("SlotList").unwrap();
        assert_eq!(cmd.name, "slotlist");
    }

    #[test]
    fn leere_zeile_gibt_fehler() {
        assert_eq!(parse_line(""), Err(ProtokollFehler::LeereZeile));
        assert_eq!(parse_line("   "), Err(ProtokollFehler::LeereZeile));
    }

    #[test]
    fn ungueltige_zahl_gibt_fehler() {
        let cmd = parse_line("release port=abc").unwrap();
        assert!(cmd.required_zahl::<u16>("port").is_err());
        assert!(cmd.required_zahl::<u16>("fehlt").is_err());
    }

    #[test]
    fn ungueltiges_flag_gibt_fehler() {
        let cmd = parse_line("slot wait=vielleicht").unwrap();
        assert!(cmd.flag_param("wait").is_err());
    }

    #[test]
    fn ok_antwort_ohne_params() {
        assert_eq!(ok_antwort(&[]), "ok\n");
    }

    #[test]
    fn ok_antwort_mit_params() {
        let antwort = ok_antwort(&[("name", "Studio A"), ("slots", "4")]);
        assert!(antwort.starts_with("ok "));
        assert!(antwort.contains("name=Studio\\sA"));
        assert!(antwort.contains("slots=4"));
        assert!(antwort.ends_with('\n'));
    }

    #[test]
    fn fehler_antwort_format() {
        let antwort = fehler_antwort(1004, "Slot nicht gefunden");
        assert!(antwort.starts_with("error id=1004"));
        assert!(antwort.contains("msg=Slot\\snicht\\sgefunden"));
    }

    #[test]
    fn kodierter_wert_wird_wieder_gelesen() {
        let zeile = format!("slot name={}", encode_value("a|b c\\d"));
        let cmd = parse_line(&zeile).unwrap();
        assert_eq!(cmd.param("name"), Some("a|b c\\d"));
    }
}
