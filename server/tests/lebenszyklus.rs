//! Hochfahren und Herunterfahren des kompletten Servers

#![cfg(unix)]

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use portier_server::config::ServerConfig;
use portier_server::Server;

fn test_config(basis_port: u16, programm: &str, argumente: &[&str]) -> ServerConfig {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut cfg = ServerConfig::default();
    cfg.server.slots = 2;
    cfg.server.basis_port = basis_port;
    cfg.netzwerk.bind_adresse = "127.0.0.1".into();
    cfg.netzwerk.admission_port = 0;
    cfg.worker.programm = programm.into();
    cfg.worker.argumente = argumente.iter().map(|a| a.to_string()).collect();
    cfg.worker.beenden_timeout_ms = 500;
    cfg.observability.aktiviert = false;
    cfg
}

async fn zeile_lesen<R: tokio::io::AsyncBufRead + Unpin>(leser: &mut R) -> String {
    let mut zeile = String::new();
    tokio::time::timeout(Duration::from_secs(5), leser.read_line(&mut zeile))
        .await
        .expect("Zeitlimit beim Lesen")
        .expect("Lesefehler");
    zeile.trim_end().to_string()
}

#[tokio::test]
async fn slot_vergabe_und_shutdown() {
    let cfg = test_config(23100, "sleep", &["30"]);
    let server = Server::neu(cfg).hochfahren().await.unwrap();
    assert_eq!(server.broker().status().frei, 2);

    let stream = TcpStream::connect(server.admission_adresse()).await.unwrap();
    let (lesen, mut schreiben) = stream.into_split();
    let mut leser = BufReader::new(lesen);

    schreiben
        .write_all(b"request name=Copain rate=128 wait=0\n")
        .await
        .unwrap();
    assert_eq!(zeile_lesen(&mut leser).await, "23100");

    let supervisor = std::sync::Arc::clone(server.supervisor());
    assert!(supervisor.laeuft(23100));

    server.herunterfahren().await.unwrap();
    assert_eq!(zeile_lesen(&mut leser).await, "-3");
    assert!(!supervisor.laeuft(23100));
    assert!(!supervisor.laeuft(23101));
}

#[tokio::test]
async fn fehlender_worker_sperrt_alle_slots() {
    let cfg = test_config(23200, "/nicht/vorhanden/portier-rx", &[]);
    let server = Server::neu(cfg).hochfahren().await.unwrap();

    let status = server.broker().status();
    assert_eq!(status.gesperrt, 2);
    assert_eq!(status.frei, 0);

    let stream = TcpStream::connect(server.admission_adresse()).await.unwrap();
    let (lesen, mut schreiben) = stream.into_split();
    let mut leser = BufReader::new(lesen);
    schreiben.write_all(b"request name=x rate=64 wait=0\n").await.unwrap();
    assert_eq!(zeile_lesen(&mut leser).await, "-1");

    server.herunterfahren().await.unwrap();
}

#[tokio::test]
async fn admin_kanal_wird_gebunden() {
    let mut cfg = test_config(23300, "sleep", &["30"]);
    cfg.commander.aktiviert = true;
    cfg.commander.port = 0;
    let server = Server::neu(cfg).hochfahren().await.unwrap();
    let admin = server.admin_adresse().expect("Admin-Kanal aktiv");

    let stream = TcpStream::connect(admin).await.unwrap();
    let (lesen, mut schreiben) = stream.into_split();
    let mut leser = BufReader::new(lesen);
    assert_eq!(zeile_lesen(&mut leser).await, "PORTIER");

    schreiben.write_all(b"status\n").await.unwrap();
    let antwort = zeile_lesen(&mut leser).await;
    assert!(antwort.starts_with("ok "), "{antwort}");
    assert!(antwort.contains("slots=2"), "{antwort}");

    server.herunterfahren().await.unwrap();
}

#[tokio::test]
async fn ungueltige_konfiguration_bricht_ab() {
    let mut cfg = test_config(23400, "sleep", &["30"]);
    cfg.server.slots = 0;
    assert!(Server::neu(cfg).hochfahren().await.is_err());
}
