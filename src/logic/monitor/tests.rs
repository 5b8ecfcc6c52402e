//! Ingestion scenarios against an in-memory store

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use super::*;
use crate::config::{NoiseConfig, ResponseConfig};
use crate::db::test_pool;
use crate::logic::response::testing::{RecordingFirewall, RecordingNotifier};
use crate::logic::response::{ActiveResponse, Notifier};
use crate::logic::threat::NoiseFilter;
use crate::models::{Alert, AlertAction, BlockedIp};

const ATTACKER: &str = "203.0.113.5";

fn eve_line(signature: &str, severity: u8, src_ip: &str, dest_ip: &str) -> String {
    serde_json::json!({
        "timestamp": "2024-01-10T08:00:00.000000+0000",
        "event_type": "alert",
        "src_ip": src_ip,
        "src_port": 51514,
        "dest_ip": dest_ip,
        "dest_port": 22,
        "proto": "TCP",
        "alert": {
            "action": "allowed",
            "signature": signature,
            "category": "Attempted Information Leak",
            "severity": severity
        }
    })
    .to_string()
}

struct Harness {
    pool: SqlitePool,
    firewall: Arc<RecordingFirewall>,
    notifier: Arc<RecordingNotifier>,
    response: Arc<ActiveResponse>,
    ingestor: Arc<AlertIngestor>,
}

async fn harness() -> Harness {
    let pool = test_pool().await;
    let firewall = RecordingFirewall::new();
    let notifier = RecordingNotifier::new();
    let response = Arc::new(ActiveResponse::new(
        pool.clone(),
        firewall.clone(),
        &ResponseConfig::default(),
    ));
    let ingestor = Arc::new(AlertIngestor::new(
        pool.clone(),
        Arc::new(NoiseFilter::new(&NoiseConfig::default())),
        response.clone(),
        Some(notifier.clone() as Arc<dyn Notifier>),
    ));

    Harness { pool, firewall, notifier, response, ingestor }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn critical_alert_blocks_source_once() {
    let h = harness().await;
    let line = eve_line("ET SCAN Nmap", 1, ATTACKER, "10.0.0.2");

    let first = h.ingestor.ingest_line(&line).await.unwrap().unwrap();
    assert_eq!(first.action, AlertAction::Blocked);

    let second = h.ingestor.ingest_line(&line).await.unwrap().unwrap();
    assert_eq!(second.action, AlertAction::Blocked);

    let stored = Alert::find_by_id(&h.pool, second.id).await.unwrap().unwrap();
    assert_eq!(stored.action, AlertAction::Blocked);

    let history = BlockedIp::history(&h.pool, ATTACKER).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].active);
    assert_eq!(h.firewall.drops().len(), 1);
}

#[tokio::test]
async fn unblock_then_new_alert_keeps_history() {
    let h = harness().await;
    let line = eve_line("ET SCAN Nmap", 1, ATTACKER, "10.0.0.2");

    h.ingestor.ingest_line(&line).await.unwrap();
    h.response.unblock(ATTACKER.parse().unwrap()).await.unwrap();
    h.ingestor.ingest_line(&line).await.unwrap();

    let history = BlockedIp::history(&h.pool, ATTACKER).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.iter().filter(|b| b.active).count(), 1);
    assert!(!history[0].active);
}

#[tokio::test]
async fn low_severity_is_stored_but_allowed() {
    let h = harness().await;
    let alert = h.ingestor
        .ingest_line(&eve_line("ET POLICY Outdated Browser", 3, ATTACKER, "10.0.0.2"))
        .await
        .unwrap()
        .unwrap();

    settle().await;
    assert_eq!(alert.action, AlertAction::Allowed);
    assert!(h.firewall.drops().is_empty());
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn noise_is_stored_without_response() {
    let h = harness().await;
    let alert = h.ingestor
        .ingest_line(&eve_line("ET HUNTING Telegram API Domain in DNS Lookup", 1, ATTACKER, "10.0.0.2"))
        .await
        .unwrap()
        .unwrap();

    settle().await;
    assert_eq!(alert.action, AlertAction::Allowed);
    assert!(h.firewall.drops().is_empty());
    assert!(h.notifier.sent().is_empty());
    assert!(Alert::find_by_id(&h.pool, alert.id).await.unwrap().is_some());
}

#[tokio::test]
async fn high_severity_is_notified() {
    let h = harness().await;
    h.ingestor
        .ingest_line(&eve_line("ET EXPLOIT Possible Shellshock", 2, ATTACKER, "10.0.0.2"))
        .await
        .unwrap();

    settle().await;
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].action, "blocked");
    assert_eq!(sent[0].src_ip, ATTACKER);
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    let h = harness().await;
    for line in [
        "",
        "garbage",
        "{\"event_type\":\"alert\",\"src_ip\":",
        r#"{"event_type":"dns","src_ip":"1.1.1.1","dest_ip":"10.0.0.2"}"#,
    ] {
        assert!(h.ingestor.ingest_line(line).await.unwrap().is_none());
    }

    assert!(Alert::all(&h.pool).await.unwrap().is_empty());
    assert!(h.firewall.drops().is_empty());
}

#[tokio::test]
async fn tailer_feeds_ingestor_end_to_end() {
    let h = harness().await;
    let file = tempfile::NamedTempFile::new().unwrap();

    let handle = LogTailer::new(file.path(), Duration::from_millis(5))
        .start(h.ingestor.clone())
        .unwrap();

    {
        let mut f = std::fs::OpenOptions::new().append(true).open(file.path()).unwrap();
        writeln!(f, "not json").unwrap();
        writeln!(f, "{}", eve_line("ET SCAN Nmap", 1, ATTACKER, "10.0.0.2")).unwrap();
        writeln!(f, "{}", eve_line("ET POLICY curl", 4, "198.51.100.3", "10.0.0.2")).unwrap();
    }

    let mut alerts = Vec::new();
    for _ in 0..200 {
        alerts = Alert::all(&h.pool).await.unwrap();
        if alerts.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].action, AlertAction::Blocked);
    assert_eq!(alerts[1].action, AlertAction::Allowed);
    assert!(handle.is_running());

    handle.shutdown().await;
}
