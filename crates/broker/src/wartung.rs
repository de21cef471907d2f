//! Hintergrund-Tasks des Brokers
//!
//! - Worker-Ereignisse: Slot freigeben, optional Worker neu starten
//! - Warteschlangen-Pflege: stumme Wartende verdraengen

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use portier_core::WorkerId;

use crate::broker::Broker;
use crate::error::BrokerResult;
use crate::supervisor::{WorkerEreignis, WorkerSupervisor};

/// Neustart-Verhalten nach unerwartetem Worker-Ende
#[derive(Debug, Clone, Copy, Default)]
pub struct NeustartKonfig {
    pub aktiviert: bool,
    pub verzoegerung: Duration,
}

/// Startet den Worker an `port` neu und meldet das Ergebnis dem Broker
///
/// Schlaegt der Start fehl und laeuft kein anderer Worker am Port, wird der
/// Slot gesperrt.
pub fn worker_neu_starten(
    broker: &Broker,
    supervisor: &WorkerSupervisor,
    port: u16,
) -> BrokerResult<WorkerId> {
    match supervisor.starten(port) {
        Ok(id) => {
            broker.worker_gestartet(port, id)?;
            Ok(id)
        }
        Err(e) => {
            tracing::error!(port, fehler = %e, "Worker-Neustart fehlgeschlagen");
            if !supervisor.laeuft(port) {
                broker.slot_sperren(port)?;
            }
            Err(e)
        }
    }
}

/// Verarbeitet Worker-Ereignisse bis zum Shutdown
pub async fn worker_ereignisse_verarbeiten(
    broker: Arc<Broker>,
    supervisor: Arc<WorkerSupervisor>,
    mut ereignisse: mpsc::UnboundedReceiver<WorkerEreignis>,
    neustart: NeustartKonfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let ereignis = tokio::select! {
            e = ereignisse.recv() => match e {
                Some(e) => e,
                None => break,
            },
            _ = shutdown_rx.changed() => break,
        };

        let WorkerEreignis::Beendet {
            port,
            worker,
            exit_code,
        } = ereignis;

        if let Some(m) = broker.metriken() {
            m.worker_exits_total.inc();
        }
        broker.worker_beendet(port, worker, neustart.aktiviert);

        if neustart.aktiviert {
            tracing::info!(port, ?exit_code, verzoegerung_ms = neustart.verzoegerung.as_millis() as u64, "Worker-Neustart geplant");
            let broker = Arc::clone(&broker);
            let supervisor = Arc::clone(&supervisor);
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(neustart.verzoegerung).await;
                if *shutdown_rx.borrow() {
                    return;
                }
                let _ = worker_neu_starten(&broker, &supervisor, port);
            });
        }
    }
    tracing::debug!("Worker-Ereignisschleife beendet");
}

/// Verdraengt regelmaessig Wartende ohne aktuellen Poll
pub async fn warteschlange_pflegen(
    broker: Arc<Broker>,
    intervall: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    if broker.konfig().poll_timeout.is_none() {
        return;
    }
    let mut takt = tokio::time::interval(intervall);
    takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = takt.tick() => {
                let verdraengt = broker.abgelaufene_verdraengen(Instant::now());
                if !verdraengt.is_empty() {
                    tracing::debug!(anzahl = verdraengt.len(), "Warteschlange bereinigt");
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::broker::{AnfrageErgebnis, BrokerKonfig, SlotAnfrage, Benachrichtigung};
    use crate::error::BrokerError;
    use crate::slot_table::{SlotTable, SlotZustand};
    use crate::supervisor::{ProzessBackend, WorkerBackend, WorkerProzess};
    use portier_core::BefehlsVorlage;

    /// Startet die ersten `erlaubt` Worker normal, danach ist das Programm weg
    struct BegrenztesBackend {
        innen: ProzessBackend,
        erlaubt: usize,
        starts: AtomicUsize,
    }

    impl WorkerBackend for BegrenztesBackend {
        fn starten(&self, port: u16) -> BrokerResult<Box<dyn WorkerProzess>> {
            if self.starts.fetch_add(1, Ordering::SeqCst) >= self.erlaubt {
                return Err(BrokerError::worker_start(port, "Programm verschwunden"));
            }
            self.innen.starten(port)
        }
    }

    fn aufbau(programm: &str, argumente: &[&str]) -> (Arc<Broker>, Arc<WorkerSupervisor>, mpsc::UnboundedReceiver<WorkerEreignis>) {
        let backend = Arc::new(ProzessBackend::neu(BefehlsVorlage::neu(programm, argumente)));
        aufbau_mit(backend)
    }

    fn aufbau_mit(backend: Arc<dyn WorkerBackend>) -> (Arc<Broker>, Arc<WorkerSupervisor>, mpsc::UnboundedReceiver<WorkerEreignis>) {
        let broker = Arc::new(Broker::neu(SlotTable::neu(9000, 1).unwrap(), BrokerKonfig::default(), None));
        let (sup, rx) = WorkerSupervisor::neu(backend, Duration::from_millis(500));
        let sup = Arc::new(sup);
        broker.start_ergebnisse_uebernehmen(&sup.alle_starten(&broker.ports()));
        (broker, sup, rx)
    }

    #[tokio::test]
    async fn worker_ende_entzieht_slot() {
        let (broker, sup, rx) = aufbau("sh", &["-c", "sleep 0.3"]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, mut client_rx) = mpsc::unbounded_channel();
        let client = broker.anmelden("127.0.0.1:1".parse().unwrap(), tx);
        broker.anfordern(client, SlotAnfrage { warten: true, ..Default::default() }).unwrap();
        let (tx, mut wartend_rx) = mpsc::unbounded_channel();
        let wartend = broker.anmelden("127.0.0.1:2".parse().unwrap(), tx);
        assert_eq!(
            broker.anfordern(wartend, SlotAnfrage { warten: true, ..Default::default() }).unwrap(),
            AnfrageErgebnis::Wartend { position: 1 }
        );

        let task = tokio::spawn(worker_ereignisse_verarbeiten(
            Arc::clone(&broker),
            Arc::clone(&sup),
            rx,
            NeustartKonfig::default(),
            shutdown_rx,
        ));

        let b = tokio::time::timeout(Duration::from_secs(5), client_rx.recv()).await.unwrap();
        assert_eq!(b, Some(Benachrichtigung::Entzogen));

        // Ohne Neustart geht der freie Slot direkt an den Wartenden
        let b = tokio::time::timeout(Duration::from_secs(5), wartend_rx.recv()).await.unwrap();
        assert_eq!(b, Some(Benachrichtigung::Zugewiesen(9000)));
        assert_eq!(broker.slot_liste()[0].zustand, SlotZustand::Belegt(wartend));
        assert_eq!(broker.slot_liste()[0].worker, None);
        assert_eq!(broker.status().wartend, 0);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn zweiter_start_bei_laufendem_worker_sperrt_nicht() {
        let (broker, sup, _rx) = aufbau("sleep", &["30"]);
        sup.beenden(9000).await;

        // Neustart klappt, solange das Programm startbar ist
        assert!(worker_neu_starten(&broker, &sup, 9000).is_ok());
        // Laufender Worker: zweiter Start schlaegt fehl, Slot bleibt nutzbar
        assert!(worker_neu_starten(&broker, &sup, 9000).is_err());
        assert_eq!(broker.status().gesperrt, 0);
        sup.alle_beenden().await;
    }

    #[tokio::test]
    async fn neustart_fehlschlag_sperrt_slot() {
        let backend = Arc::new(BegrenztesBackend {
            innen: ProzessBackend::neu(BefehlsVorlage::neu("sh", &["-c", "sleep 0.2"])),
            erlaubt: 1,
            starts: AtomicUsize::new(0),
        });
        let (broker, sup, rx) = aufbau_mit(Arc::clone(&backend) as Arc<dyn WorkerBackend>);
        assert_eq!(broker.status().gesperrt, 0);

        let (tx, mut client_rx) = mpsc::unbounded_channel();
        let client = broker.anmelden("127.0.0.1:1".parse().unwrap(), tx);
        broker.anfordern(client, SlotAnfrage::default()).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(worker_ereignisse_verarbeiten(
            Arc::clone(&broker),
            Arc::clone(&sup),
            rx,
            NeustartKonfig {
                aktiviert: true,
                verzoegerung: Duration::from_millis(50),
            },
            shutdown_rx,
        ));

        let b = tokio::time::timeout(Duration::from_secs(5), client_rx.recv()).await.unwrap();
        assert_eq!(b, Some(Benachrichtigung::Entzogen));

        // Warten, bis der Neustart versucht wurde
        let frist = tokio::time::Instant::now() + Duration::from_secs(5);
        while backend.starts.load(Ordering::SeqCst) < 2 {
            assert!(tokio::time::Instant::now() < frist, "kein Neustart-Versuch");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(broker.slot_liste()[0].zustand, SlotZustand::Gesperrt);
        assert_eq!(broker.status().gesperrt, 1);
        assert_eq!(broker.status().frei, 0);
        assert!(!sup.laeuft(9000));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn nicht_startbarer_worker_bleibt_gesperrt() {
        let (broker, sup, _rx) = aufbau("/nicht/vorhanden", &[]);
        assert_eq!(broker.status().gesperrt, 1);
        assert!(worker_neu_starten(&broker, &sup, 9000).is_err());
        assert_eq!(broker.status().gesperrt, 1);
    }
}
