//! TCP-Server fuer den Admin-Kanal (ServerQuery-Stil)
//!
//! Line-based Protokoll auf eigenem Port.
//! Format: Befehlsname [key=value ...]\n
//! Antworten: ok [...] oder error id=N msg=...

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::{Framed, LinesCodecError};

use portier_protocol::{fehler_antwort, ok_antwort, parse_line, zeilen_codec};

use crate::commands::executor::AdminExecutor;
use crate::tcp::commands::{antwort_formatieren, tcp_befehl_zu_befehl};
use crate::tcp::session::TcpSession;

/// TCP-Server-Konfiguration
#[derive(Debug, Clone)]
pub struct TcpServerKonfig {
    pub bind_addr: SocketAddr,
    pub max_verbindungen: usize,
    /// Ohne Passwort ist jede Session sofort angemeldet
    pub passwort: Option<String>,
}

impl Default for TcpServerKonfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8998)),
            max_verbindungen: 8,
            passwort: None,
        }
    }
}

/// TCP-Admin-Server
pub struct TcpServer {
    listener: TcpListener,
    konfig: TcpServerKonfig,
}

impl TcpServer {
    /// Bindet den Listener
    pub async fn binden(konfig: TcpServerKonfig) -> Result<Self> {
        let listener = TcpListener::bind(konfig.bind_addr).await?;
        Ok(Self { listener, konfig })
    }

    pub fn lokale_adresse(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Nimmt Admin-Verbindungen an, bis das Shutdown-Signal kommt
    pub async fn starten(
        self,
        executor: Arc<AdminExecutor>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        tracing::info!(addr = %self.lokale_adresse()?, "Admin-Kanal gestartet");

        // Atomarer Verbindungszaehler fuer max_verbindungen-Enforcement
        let verbindungszaehler = Arc::new(AtomicUsize::new(0));
        let max_verbindungen = self.konfig.max_verbindungen;
        let passwort = self.konfig.passwort.map(Arc::<str>::from);

        loop {
            let (stream, peer_addr) = tokio::select! {
                angenommen = self.listener.accept() => match angenommen {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(fehler = %e, "Accept fehlgeschlagen");
                        continue;
                    }
                },
                _ = shutdown_rx.changed() => break,
            };

            let aktuelle = verbindungszaehler.fetch_add(1, Ordering::SeqCst);
            if aktuelle >= max_verbindungen {
                verbindungszaehler.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!(
                    peer = %peer_addr,
                    max = max_verbindungen,
                    "Verbindung abgelehnt: Connection-Limit erreicht"
                );
                // Stream wird durch Drop geschlossen
                continue;
            }

            let executor = Arc::clone(&executor);
            let passwort = passwort.clone();
            let zaehler = Arc::clone(&verbindungszaehler);
            let shutdown_rx = shutdown_rx.clone();

            tokio::spawn(async move {
                tracing::debug!(peer = %peer_addr, "Neue Admin-Verbindung");
                verbindung_behandeln(stream, peer_addr, executor, passwort, shutdown_rx).await;
                zaehler.fetch_sub(1, Ordering::SeqCst);
            });
        }

        tracing::info!("Admin-Kanal beendet");
        Ok(())
    }
}

/// Behandelt eine einzelne Admin-Verbindung
async fn verbindung_behandeln(
    stream: TcpStream,
    peer_addr: SocketAddr,
    executor: Arc<AdminExecutor>,
    passwort: Option<Arc<str>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut framed = Framed::new(stream, zeilen_codec());
    let mut session = TcpSession::neu(peer_addr, passwort.is_some());

    // Willkommensnachricht
    if framed.send("PORTIER").await.is_err() {
        return;
    }

    loop {
        let zeile = tokio::select! {
            zeile = framed.next() => zeile,
            _ = shutdown_rx.changed() => break,
        };

        let antwort = match zeile {
            Some(Ok(zeile)) => {
                verarbeite_befehl(&zeile, &mut session, &executor, passwort.as_deref())
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                session.beenden();
                fehler_antwort(5003, "Zeile zu lang")
            }
            Some(Err(e)) => {
                tracing::debug!(fehler = %e, "Lesefehler auf Admin-Session");
                break;
            }
            None => break,
        };

        // Antworten enden bereits auf `\n`, der Codec haengt eines an
        if framed.send(antwort.trim_end_matches('\n')).await.is_err() {
            break;
        }

        if session.ist_beendend() {
            break;
        }
    }

    tracing::debug!(peer = %peer_addr, "Admin-Verbindung beendet");
}

/// Verarbeitet eine einzelne Befehlszeile und gibt die Antwort zurueck
fn verarbeite_befehl(
    zeile: &str,
    session: &mut TcpSession,
    executor: &AdminExecutor,
    passwort: Option<&str>,
) -> String {
    let parsed = match parse_line(zeile) {
        Ok(p) => p,
        Err(e) => {
            let e = crate::error::CommanderError::from(e);
            return fehler_antwort(e.fehler_code(), &e.to_string());
        }
    };

    // Sonderbefehle: login, quit
    match parsed.name.as_str() {
        "login" => {
            let Some(erwartet) = passwort else {
                return ok_antwort(&[("msg", "kein Passwort konfiguriert")]);
            };
            return match parsed.param("password") {
                Some(p) if p == erwartet => {
                    session.anmelden();
                    tracing::info!(peer = %session.client_addr, "Admin angemeldet");
                    ok_antwort(&[])
                }
                Some(_) => {
                    tracing::warn!(peer = %session.client_addr, "Admin-Login fehlgeschlagen");
                    fehler_antwort(1001, "Falsches Passwort")
                }
                None => fehler_antwort(1005, "password fehlt"),
            };
        }
        "quit" => {
            session.beenden();
            return ok_antwort(&[("msg", "bye")]);
        }
        _ => {}
    }

    // Alle anderen Befehle erfordern Authentifizierung
    if !session.ist_authentifiziert() {
        return fehler_antwort(1002, "Nicht eingeloggt. Bitte zuerst 'login' aufrufen.");
    }

    let befehl = match tcp_befehl_zu_befehl(&parsed) {
        Ok(b) => b,
        Err(e) => return fehler_antwort(e.fehler_code(), &e.to_string()),
    };

    match executor.ausfuehren(befehl) {
        Ok(antwort) => antwort_formatieren(&antwort),
        Err(e) => fehler_antwort(e.fehler_code(), &e.to_string()),
    }
}
