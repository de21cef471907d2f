//! Admission-Client: Gegenstueck zum Admission-Server
//!
//! Eine Steuerverbindung pro Sender. Nach `0` sendet der Client in festem
//! Takt `wait`, bis der Server einen Port oder einen negativen Code schickt.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use portier_protocol::{zeilen_codec, AdmissionNachricht, Antwort};

use crate::error::{SenderError, SenderResult};

/// Steuerverbindung zum Broker
pub struct AdmissionClient {
    framed: Framed<TcpStream, LinesCodec>,
    server: SocketAddr,
}

impl AdmissionClient {
    /// Baut die Steuerverbindung auf
    pub async fn verbinden(host: &str, port: u16) -> SenderResult<Self> {
        let stream =
            TcpStream::connect((host, port))
                .await
                .map_err(|quelle| SenderError::Verbindung {
                    addr: format!("{host}:{port}"),
                    quelle,
                })?;
        stream.set_nodelay(true)?;
        let server = stream.peer_addr()?;
        tracing::debug!(server = %server, "Steuerverbindung aufgebaut");
        Ok(Self {
            framed: Framed::new(stream, zeilen_codec()),
            server,
        })
    }

    pub fn server_adresse(&self) -> SocketAddr {
        self.server
    }

    async fn senden(&mut self, nachricht: &AdmissionNachricht) -> SenderResult<()> {
        self.framed.send(nachricht.zeile()).await?;
        Ok(())
    }

    /// Fordert einen Slot an und liefert die erste Antwort
    pub async fn anfordern(
        &mut self,
        anzeigename: Option<&str>,
        rate_kbps: Option<u32>,
        warten: bool,
    ) -> SenderResult<Antwort> {
        self.senden(&AdmissionNachricht::SlotAnfrage {
            anzeigename: anzeigename.map(String::from),
            rate_kbps,
            warten,
        })
        .await?;
        self.naechste_antwort().await?.ok_or(SenderError::Getrennt)
    }

    /// Sendet einen Warte-Poll
    pub async fn poll(&mut self) -> SenderResult<()> {
        self.senden(&AdmissionNachricht::Warten).await
    }

    /// Naechste Zeile vom Server; `None` wenn die Verbindung geschlossen wurde
    pub async fn naechste_antwort(&mut self) -> SenderResult<Option<Antwort>> {
        antwort_aus(self.framed.next().await)
    }

    /// Pollt im Takt `intervall`, bis der Server etwas schickt
    pub async fn warte_auf_zuweisung(&mut self, intervall: Duration) -> SenderResult<Antwort> {
        let mut takt = tokio::time::interval_at(tokio::time::Instant::now() + intervall, intervall);
        loop {
            tokio::select! {
                _ = takt.tick() => self.poll().await?,
                zeile = self.framed.next() => {
                    return antwort_aus(zeile)?.ok_or(SenderError::Getrennt);
                }
            }
        }
    }

    /// Meldet sich ordentlich ab; Fehler sind hier egal
    pub async fn beenden(&mut self) {
        if let Err(e) = self.senden(&AdmissionNachricht::Beenden).await {
            tracing::debug!(fehler = %e, "quit nicht zugestellt");
        }
    }
}

fn antwort_aus(zeile: Option<Result<String, LinesCodecError>>) -> SenderResult<Option<Antwort>> {
    match zeile {
        Some(Ok(zeile)) => Ok(Some(Antwort::parsen(&zeile)?)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    async fn gegenstelle() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn anfrage_zeile_und_direkte_zuweisung() {
        let (listener, port) = gegenstelle().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (lesen, mut schreiben) = stream.into_split();
            let mut zeilen = BufReader::new(lesen).lines();
            let anfrage = zeilen.next_line().await.unwrap().unwrap();
            schreiben.write_all(b"9000\n").await.unwrap();
            anfrage
        });

        let mut client = AdmissionClient::verbinden("127.0.0.1", port).await.unwrap();
        let antwort = client
            .anfordern(Some("Copain"), Some(128), false)
            .await
            .unwrap();
        assert_eq!(antwort, Antwort::Port(9000));
        assert_eq!(server.await.unwrap(), "slot name=Copain rate=128 wait=0");
    }

    #[tokio::test]
    async fn wartet_mit_polls_bis_zur_zuweisung() {
        let (listener, port) = gegenstelle().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (lesen, mut schreiben) = stream.into_split();
            let mut zeilen = BufReader::new(lesen).lines();
            zeilen.next_line().await.unwrap();
            schreiben.write_all(b"0\n").await.unwrap();
            // Zwei Polls abwarten, dann zuweisen
            for _ in 0..2 {
                assert_eq!(zeilen.next_line().await.unwrap().unwrap(), "wait");
            }
            schreiben.write_all(b"9001\n").await.unwrap();
        });

        let mut client = AdmissionClient::verbinden("127.0.0.1", port).await.unwrap();
        assert_eq!(
            client.anfordern(None, None, true).await.unwrap(),
            Antwort::Wartend
        );
        let antwort = client
            .warte_auf_zuweisung(Duration::from_millis(30))
            .await
            .unwrap();
        assert_eq!(antwort, Antwort::Port(9001));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn geschlossene_verbindung() {
        let (listener, port) = gegenstelle().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut client = AdmissionClient::verbinden("127.0.0.1", port).await.unwrap();
        assert!(client.naechste_antwort().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unsinnige_antwort_ist_protokollfehler() {
        let (listener, port) = gegenstelle().await;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"hallo\n").await.unwrap();
        });

        let mut client = AdmissionClient::verbinden("127.0.0.1", port).await.unwrap();
        assert!(matches!(
            client.naechste_antwort().await,
            Err(SenderError::Protokoll(_))
        ));
    }

    #[tokio::test]
    async fn verbindungsfehler_nennt_adresse() {
        let (listener, port) = gegenstelle().await;
        drop(listener);
        match AdmissionClient::verbinden("127.0.0.1", port).await {
            Err(SenderError::Verbindung { addr, .. }) => {
                assert_eq!(addr, format!("127.0.0.1:{port}"))
            }
            Err(e) => panic!("falscher Fehler: {e}"),
            Ok(_) => panic!("Verbindung haette scheitern muessen"),
        }
    }
}
