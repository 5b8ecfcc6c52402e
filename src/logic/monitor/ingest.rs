//! Alert ingestion
//!
//! Parse → classify → store → contain → notify, one line at a time on the
//! tailer task. Enrichment and correlation are left to the read path.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::logic::response::{ActiveResponse, AlertNotice, BlockOutcome, Notifier};
use crate::logic::threat::NoiseFilter;
use crate::models::{Alert, AlertAction, NewAlert};
use super::event::parse_alert;
use super::tailer::EventSink;

pub struct AlertIngestor {
    pool: SqlitePool,
    noise: Arc<NoiseFilter>,
    response: Arc<ActiveResponse>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl AlertIngestor {
    pub fn new(
        pool: SqlitePool,
        noise: Arc<NoiseFilter>,
        response: Arc<ActiveResponse>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self { pool, noise, response, notifier }
    }

    /// Ingest one raw line. `Ok(None)` when the line is not a usable alert.
    pub async fn ingest_line(&self, line: &str) -> Result<Option<Alert>, sqlx::Error> {
        match parse_alert(line, Utc::now()) {
            Ok(new_alert) => self.ingest(new_alert).await.map(Some),
            Err(e) => {
                tracing::debug!("Skipping EVE line: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn ingest(&self, new_alert: NewAlert) -> Result<Alert, sqlx::Error> {
        let is_noise = self.noise.is_noise(&new_alert);
        let mut alert = Alert::insert(&self.pool, &new_alert).await?;

        if is_noise {
            tracing::debug!("Alert {} classified as noise: {}", alert.id, alert.signature);
            return Ok(alert);
        }

        if self.response.should_block(alert.severity) && self.contain(&alert).await {
            Alert::set_action(&self.pool, alert.id, AlertAction::Blocked).await?;
            alert.action = AlertAction::Blocked;
        }

        if alert.severity <= self.response.threshold() {
            self.notify(&alert);
        }

        Ok(alert)
    }

    /// True when containment was attempted, whatever the firewall said
    async fn contain(&self, alert: &Alert) -> bool {
        let ip: IpAddr = match alert.src_ip.parse() {
            Ok(ip) => ip,
            Err(_) => return false,
        };

        let reason = format!("Automated Active Response: {}", alert.signature);
        match self.response.block(ip, &reason).await {
            Ok(BlockOutcome::Blocked { .. }) | Ok(BlockOutcome::AlreadyBlocked(_)) => true,
            Ok(BlockOutcome::NotEnforced(e)) => {
                tracing::warn!("Block of {} for alert {} not enforced: {}", ip, alert.id, e);
                true
            }
            Err(e) => {
                tracing::error!("Block registry error for {} (alert {}): {}", ip, alert.id, e);
                false
            }
        }
    }

    fn notify(&self, alert: &Alert) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };

        let notice = AlertNotice::from(alert);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&notice).await {
                tracing::warn!("Failed to send notification for alert {}: {}", notice.alert_id, e);
            }
        });
    }
}

#[async_trait]
impl EventSink for AlertIngestor {
    async fn handle_line(&self, line: &str) {
        if let Err(e) = self.ingest_line(line).await {
            tracing::error!("Failed to store alert: {}", e);
        }
    }
}
