//! Befehlsvorlagen fuer externe Prozesse
//!
//! Worker (Empfangsseite) und Medien-Pipeline (Sendeseite) sind externe
//! Programme. Ihre Kommandozeile wird aus einer Vorlage gebaut, in der
//! Platzhalter wie `{port}` oder `{host}` ersetzt werden.

use serde::{Deserialize, Serialize};

/// Programm + Argumente mit `{name}`-Platzhaltern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BefehlsVorlage {
    /// Programmname oder Pfad
    pub programm: String,
    /// Argumente, Platzhalter werden pro Aufruf ersetzt
    #[serde(default)]
    pub argumente: Vec<String>,
}

impl BefehlsVorlage {
    /// Erstellt eine neue Vorlage
    pub fn neu(programm: impl Into<String>, argumente: &[&str]) -> Self {
        Self {
            programm: programm.into(),
            argumente: argumente.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Ersetzt alle Platzhalter und gibt (Programm, Argumente) zurueck
    pub fn aufloesen(&self, werte: &[(&str, &str)]) -> (String, Vec<String>) {
        let ersetzen = |s: &str| {
            werte.iter().fold(s.to_string(), |acc, (name, wert)| {
                acc.replace(&format!("{{{name}}}"), wert)
            })
        };
        (
            ersetzen(&self.programm),
            self.argumente.iter().map(|a| ersetzen(a)).collect(),
        )
    }

    /// Kommandozeile als lesbarer String (fuer Logs)
    pub fn anzeige(&self, werte: &[(&str, &str)]) -> String {
        let (programm, argumente) = self.aufloesen(werte);
        if argumente.is_empty() {
            programm
        } else {
            format!("{} {}", programm, argumente.join(" "))
        }
    }
}
