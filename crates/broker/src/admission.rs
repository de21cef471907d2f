//! TCP-Listener fuer das Admission-Protokoll
//!
//! Eine Task pro Verbindung. Ueberzaehlige Verbindungen werden sofort
//! geschlossen, bevor eine Sitzung beim Broker angelegt wird.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::broker::Broker;
use crate::connection::verbindung_behandeln;
use crate::error::BrokerResult;

/// Konfiguration des Admission-Servers
#[derive(Debug, Clone)]
pub struct AdmissionKonfig {
    pub bind_addr: SocketAddr,
    pub max_verbindungen: usize,
}

impl Default for AdmissionKonfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8999)),
            max_verbindungen: 256,
        }
    }
}

/// Admission-Server: nimmt Sender-Verbindungen an
pub struct AdmissionServer {
    listener: TcpListener,
    konfig: AdmissionKonfig,
    broker: Arc<Broker>,
}

impl AdmissionServer {
    /// Bindet den Listener; ein belegter Port ist ein fataler Startfehler
    pub async fn binden(konfig: AdmissionKonfig, broker: Arc<Broker>) -> BrokerResult<Self> {
        let listener = TcpListener::bind(konfig.bind_addr).await?;
        Ok(Self {
            listener,
            konfig,
            broker,
        })
    }

    /// Tatsaechlich gebundene Adresse (bei Port 0 relevant)
    pub fn lokale_adresse(&self) -> BrokerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Nimmt Verbindungen an, bis das Shutdown-Signal kommt
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) -> BrokerResult<()> {
        let addr = self.lokale_adresse()?;
        tracing::info!(addr = %addr, "Admission-Server gestartet");

        let verbindungszaehler = Arc::new(AtomicUsize::new(0));
        let max_verbindungen = self.konfig.max_verbindungen;

        loop {
            let (stream, peer) = tokio::select! {
                angenommen = self.listener.accept() => match angenommen {
                    Ok(v) => v,
                    Err(e) => {
                        // z.B. EMFILE: Listener bleibt nutzbar
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
                    peer = %peer,
                    max = max_verbindungen,
                    "Verbindung abgelehnt: Connection-Limit erreicht"
                );
                continue;
            }

            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(peer = %peer, fehler = %e, "TCP_NODELAY nicht gesetzt");
            }

            let broker = Arc::clone(&self.broker);
            let zaehler = Arc::clone(&verbindungszaehler);
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                tracing::debug!(peer = %peer, "Neue Admission-Verbindung");
                verbindung_behandeln(stream, peer, broker, shutdown_rx).await;
                zaehler.fetch_sub(1, Ordering::SeqCst);
            });
        }

        tracing::info!("Admission-Server beendet");
        Ok(())
    }
}
