//! Admin-Kanal ueber echte TCP-Verbindungen

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use portier_broker::{Broker, BrokerKonfig, ProzessBackend, SlotAnfrage, SlotTable, WorkerSupervisor};
use portier_commander::{AdminExecutor, TcpServer, TcpServerKonfig};
use portier_core::BefehlsVorlage;

struct Admin {
    zeilen: Lines<BufReader<OwnedReadHalf>>,
    schreiben: OwnedWriteHalf,
}

impl Admin {
    async fn verbinden(addr: std::net::SocketAddr) -> Self {
        let (lesen, schreiben) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut admin = Self {
            zeilen: BufReader::new(lesen).lines(),
            schreiben,
        };
        assert_eq!(admin.zeile().await.as_deref(), Some("PORTIER"));
        admin
    }

    async fn zeile(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.zeilen.next_line())
            .await
            .unwrap()
            .unwrap()
    }

    async fn befehl(&mut self, zeile: &str) -> String {
        self.schreiben.write_all(format!("{zeile}\n").as_bytes()).await.unwrap();
        self.zeile().await.unwrap()
    }
}

async fn starten(passwort: Option<&str>) -> (std::net::SocketAddr, Arc<Broker>, watch::Sender<bool>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let broker = Arc::new(Broker::neu(SlotTable::neu(9700, 2).unwrap(), BrokerKonfig::default(), None));
    let backend = Arc::new(ProzessBackend::neu(BefehlsVorlage::neu("sleep", &["30"])));
    let (supervisor, _ereignisse) = WorkerSupervisor::neu(backend, Duration::from_millis(200));
    let executor = Arc::new(AdminExecutor::neu(Arc::clone(&broker), Arc::new(supervisor)));

    let server = TcpServer::binden(TcpServerKonfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        max_verbindungen: 4,
        passwort: passwort.map(String::from),
    })
    .await
    .unwrap();
    let addr = server.lokale_adresse().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(server.starten(executor, shutdown_rx));
    (addr, broker, shutdown_tx)
}

#[tokio::test]
async fn status_und_slotliste() {
    let (addr, broker, _shutdown) = starten(None).await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let client = broker.anmelden("127.0.0.1:1".parse().unwrap(), tx);
    broker
        .anfordern(
            client,
            SlotAnfrage {
                anzeigename: Some("Copain".into()),
                rate_kbps: Some(64),
                warten: true,
            },
        )
        .unwrap();

    let mut admin = Admin::verbinden(addr).await;
    let status = admin.befehl("status").await;
    assert!(status.starts_with("ok slots=2 occupied=1 free=1 unusable=0 waiting=0 clients=1"), "{status}");

    let liste = admin.befehl("slotlist").await;
    assert_eq!(
        liste,
        format!("ok port=9700 state=belegt client={} name=Copain rate=64|port=9701 state=frei", client.inner())
    );
    assert_eq!(admin.befehl("queuelist").await, "ok");
}

#[tokio::test]
async fn release_geht_durch_den_broker() {
    let (addr, broker, _shutdown) = starten(None).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = broker.anmelden("127.0.0.1:1".parse().unwrap(), tx);
    broker.anfordern(client, SlotAnfrage { warten: true, ..Default::default() }).unwrap();

    let mut admin = Admin::verbinden(addr).await;
    assert_eq!(
        admin.befehl("release port=9700").await,
        format!("ok port=9700 client={}", client.inner())
    );
    assert!(rx.recv().await.is_some());
    assert_eq!(admin.befehl("release port=9700").await, "ok port=9700");
    assert!(admin.befehl("release port=1").await.starts_with("error id=1004"));
    assert!(admin.befehl("release").await.starts_with("error id=1005"));
    assert!(admin.befehl("kick client=999999").await.starts_with("error id=1004"));
    assert!(admin.befehl("frobnicate").await.starts_with("error id=5003"));
}

#[tokio::test]
async fn passwort_erforderlich() {
    let (addr, _broker, _shutdown) = starten(Some("geheim")).await;
    let mut admin = Admin::verbinden(addr).await;

    assert!(admin.befehl("status").await.starts_with("error id=1002"));
    assert!(admin.befehl("login password=falsch").await.starts_with("error id=1001"));
    assert_eq!(admin.befehl("login password=geheim").await, "ok");
    assert!(admin.befehl("status").await.starts_with("ok slots=2"));

    assert_eq!(admin.befehl("quit").await, "ok msg=bye");
    assert_eq!(admin.zeile().await, None);
}

#[tokio::test]
async fn shutdown_schliesst_sessions() {
    let (addr, _broker, shutdown) = starten(None).await;
    let mut admin = Admin::verbinden(addr).await;
    assert!(admin.befehl("status").await.starts_with("ok"));
    shutdown.send(true).unwrap();
    assert_eq!(admin.zeile().await, None);
}
