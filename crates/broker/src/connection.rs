//! Admission-Sitzung eines einzelnen Senders
//!
//! ```text
//! Verbunden ──slot──> Anfragend ──┬── Port ──> Zugewiesen ──┐
//!                                 ├── 0 ────> Wartend ──────┤ (Push: Port)
//!                                 └── -1 ───> Getrennt      └──> Getrennt
//! ```
//!
//! Die Zustandsmaschine ([`Sitzung`]) ist von der I/O getrennt und liefert
//! pro Eingabe eine [`Reaktion`]. [`verbindung_behandeln`] verbindet sie mit
//! dem Socket, dem Benachrichtigungskanal des Brokers und dem
//! Shutdown-Signal. Beim Verlassen wird immer [`Broker::trennen`] aufgerufen.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{Framed, LinesCodecError};

use portier_core::ClientId;
use portier_observability::metrics::ERGEBNIS_PROTOKOLLFEHLER;
use portier_protocol::{zeilen_codec, AdmissionNachricht, Antwort};

use crate::broker::{AnfrageErgebnis, Benachrichtigung, Broker, SlotAnfrage};

/// Protokollzustand eines Clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientZustand {
    Verbunden,
    Anfragend,
    Wartend,
    Zugewiesen(u16),
    Getrennt,
}

/// Was die Verbindung als Naechstes tun soll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaktion {
    /// Nichts senden
    Keine,
    /// Antwort senden, Verbindung offen lassen
    Antworten(Antwort),
    /// Antwort senden, danach schliessen
    AntwortenUndSchliessen(Antwort),
    /// Ohne Antwort schliessen
    Schliessen,
}

/// Zustandsmaschine einer Admission-Sitzung
pub struct Sitzung {
    client: ClientId,
    zustand: ClientZustand,
    broker: Arc<Broker>,
}

impl Sitzung {
    pub fn neu(client: ClientId, broker: Arc<Broker>) -> Self {
        Self {
            client,
            zustand: ClientZustand::Verbunden,
            broker,
        }
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn zustand(&self) -> ClientZustand {
        self.zustand
    }

    /// Verarbeitet eine empfangene Zeile
    pub fn zeile_verarbeiten(&mut self, zeile: &str) -> Reaktion {
        let nachricht = match AdmissionNachricht::parsen(zeile) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(client = %self.client, fehler = %e, "Ungueltige Nachricht");
                return self.protokollfehler();
            }
        };

        match (nachricht, self.zustand) {
            (AdmissionNachricht::Beenden, _) => {
                self.zustand = ClientZustand::Getrennt;
                Reaktion::Schliessen
            }

            (
                AdmissionNachricht::SlotAnfrage {
                    anzeigename,
                    rate_kbps,
                    warten,
                },
                ClientZustand::Verbunden,
            ) => {
                self.zustand = ClientZustand::Anfragend;
                let anfrage = SlotAnfrage {
                    anzeigename,
                    rate_kbps,
                    warten,
                };
                match self.broker.anfordern(self.client, anfrage) {
                    Ok(AnfrageErgebnis::Zugewiesen(port)) => {
                        self.zustand = ClientZustand::Zugewiesen(port);
                        Reaktion::Antworten(Antwort::Port(port))
                    }
                    Ok(AnfrageErgebnis::Wartend { .. }) => {
                        self.zustand = ClientZustand::Wartend;
                        Reaktion::Antworten(Antwort::Wartend)
                    }
                    Ok(AnfrageErgebnis::Abgelehnt) => {
                        self.zustand = ClientZustand::Getrennt;
                        Reaktion::AntwortenUndSchliessen(Antwort::Voll)
                    }
                    Ok(AnfrageErgebnis::Herunterfahrend) => self.herunterfahren(),
                    Err(e) => {
                        tracing::warn!(client = %self.client, fehler = %e, "Slot-Anfrage fehlgeschlagen");
                        self.protokollfehler()
                    }
                }
            }

            (AdmissionNachricht::Warten, ClientZustand::Wartend) => {
                self.broker.poll(self.client);
                Reaktion::Keine
            }

            // Poll kann sich mit der Zuweisung kreuzen
            (AdmissionNachricht::Warten, ClientZustand::Zugewiesen(_)) => Reaktion::Keine,

            (nachricht, zustand) => {
                tracing::warn!(
                    client = %self.client,
                    ?nachricht,
                    ?zustand,
                    "Nachricht passt nicht zum Sitzungszustand"
                );
                self.protokollfehler()
            }
        }
    }

    /// Verarbeitet eine Benachrichtigung des Brokers
    pub fn benachrichtigung_verarbeiten(&mut self, b: Benachrichtigung) -> Reaktion {
        match (b, self.zustand) {
            (Benachrichtigung::Zugewiesen(port), ClientZustand::Wartend) => {
                self.zustand = ClientZustand::Zugewiesen(port);
                Reaktion::Antworten(Antwort::Port(port))
            }
            (Benachrichtigung::Zugewiesen(port), zustand) => {
                // Freigabe uebernimmt `trennen` anhand des Broker-Zustands
                tracing::warn!(client = %self.client, port, ?zustand, "Zuweisung ausserhalb des Wartezustands");
                Reaktion::Keine
            }
            (Benachrichtigung::Entzogen, _) => {
                self.zustand = ClientZustand::Getrennt;
                Reaktion::AntwortenUndSchliessen(Antwort::Entzogen)
            }
            (Benachrichtigung::Verdraengt, _) => {
                self.zustand = ClientZustand::Getrennt;
                Reaktion::AntwortenUndSchliessen(Antwort::Verdraengt)
            }
        }
    }

    /// Server faehrt herunter
    pub fn herunterfahren(&mut self) -> Reaktion {
        self.zustand = ClientZustand::Getrennt;
        Reaktion::AntwortenUndSchliessen(Antwort::Entzogen)
    }

    /// Protokollverletzung: `-2` senden und schliessen
    pub fn protokollfehler(&mut self) -> Reaktion {
        if let Some(m) = self.broker.metriken() {
            m.anfrage_zaehlen(ERGEBNIS_PROTOKOLLFEHLER);
        }
        self.zustand = ClientZustand::Getrennt;
        Reaktion::AntwortenUndSchliessen(Antwort::Protokollfehler)
    }
}

/// Fuehrt eine Admission-Verbindung bis zum Ende
///
/// Raeumt den Client beim Broker in jedem Fall auf, auch bei IO-Fehlern.
pub async fn verbindung_behandeln<S>(
    stream: S,
    peer: SocketAddr,
    broker: Arc<Broker>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = broker.anmelden(peer, tx);
    let mut sitzung = Sitzung::neu(client, Arc::clone(&broker));
    let mut framed = Framed::new(stream, zeilen_codec());

    if let Err(e) = sitzung_fuehren(&mut framed, &mut sitzung, &mut rx, &mut shutdown_rx).await {
        tracing::debug!(client = %client, peer = %peer, fehler = %e, "Verbindungsfehler");
    }

    let ergebnis = broker.trennen(client);
    tracing::debug!(
        client = %client,
        peer = %peer,
        zustand = ?sitzung.zustand(),
        freigegeben = ?ergebnis.freigegeben,
        "Admission-Verbindung beendet"
    );
}

async fn sitzung_fuehren<S>(
    framed: &mut Framed<S, tokio_util::codec::LinesCodec>,
    sitzung: &mut Sitzung,
    rx: &mut mpsc::UnboundedReceiver<Benachrichtigung>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<(), LinesCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if *shutdown_rx.borrow() {
        return antwort_senden(framed, sitzung.herunterfahren()).await.map(|_| ());
    }

    loop {
        // Shutdown zuerst, damit eine gleichzeitige Zuweisung nicht gewinnt
        let reaktion = tokio::select! {
            biased;

            _ = shutdown_rx.changed() => sitzung.herunterfahren(),
            zeile = framed.next() => match zeile {
                Some(Ok(zeile)) => sitzung.zeile_verarbeiten(&zeile),
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    tracing::warn!(client = %sitzung.client(), "Zeile zu lang");
                    sitzung.protokollfehler()
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            },
            Some(b) = rx.recv() => sitzung.benachrichtigung_verarbeiten(b),
        };

        if !antwort_senden(framed, reaktion).await? {
            return Ok(());
        }
    }
}

/// Sendet die Antwort einer Reaktion; `false` wenn die Verbindung endet
async fn antwort_senden<S>(
    framed: &mut Framed<S, tokio_util::codec::LinesCodec>,
    reaktion: Reaktion,
) -> Result<bool, LinesCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match reaktion {
        Reaktion::Keine => Ok(true),
        Reaktion::Antworten(antwort) => {
            framed.send(antwort.zeile()).await?;
            Ok(true)
        }
        Reaktion::AntwortenUndSchliessen(antwort) => {
            framed.send(antwort.zeile()).await?;
            Ok(false)
        }
        Reaktion::Schliessen => Ok(false),
    }
}
