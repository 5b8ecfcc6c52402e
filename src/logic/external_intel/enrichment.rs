//! Per-alert enrichment
//!
//! Attaches source/destination reputation, mapped techniques and the
//! kill-chain phase to an alert. Recomputed only when missing or stale.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{Alert, EnrichmentUpdate};
use super::mitre::TechniqueMapper;
use super::reputation::ThreatIntelClient;
use super::types::{IpReputation, ThreatIntelSnapshot};

pub struct AlertEnricher {
    pool: SqlitePool,
    intel: Arc<ThreatIntelClient>,
    mapper: TechniqueMapper,
    stale_after_secs: i64,
}

impl AlertEnricher {
    pub fn new(pool: SqlitePool, intel: Arc<ThreatIntelClient>, stale_after_secs: i64) -> Self {
        Self {
            pool,
            intel,
            mapper: TechniqueMapper::new(),
            stale_after_secs,
        }
    }

    pub fn mapper(&self) -> &TechniqueMapper {
        &self.mapper
    }

    pub fn cached_reputations(&self) -> usize {
        self.intel.cached_entries()
    }

    /// Enrich and persist, or hand back the alert untouched when its
    /// snapshot is still fresh
    pub async fn enrich(&self, alert: Alert) -> Result<Alert, sqlx::Error> {
        if !alert.needs_enrichment(self.stale_after_secs, Utc::now()) {
            return Ok(alert);
        }

        let (source, destination) = tokio::join!(
            self.lookup(&alert.src_ip),
            self.lookup(&alert.dest_ip),
        );

        let techniques = self.mapper.map_signature(&alert.signature);
        let update = EnrichmentUpdate {
            threat_intel: ThreatIntelSnapshot { source, destination },
            kill_chain_phase: self.mapper.kill_chain_phase(&techniques),
            mitre_techniques: techniques,
            enriched_at: Utc::now(),
        };

        tracing::debug!(
            "Enriched alert {} ({} techniques, phase {:?})",
            alert.id, update.mitre_techniques.len(), update.kill_chain_phase
        );

        Alert::save_enrichment(&self.pool, alert.id, &update)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn lookup(&self, ip: &str) -> Option<IpReputation> {
        match ip.parse::<IpAddr>() {
            Ok(ip) => Some(self.intel.reputation(ip).await),
            Err(_) => {
                tracing::warn!("Skipping reputation for unparsable address {}", ip);
                None
            }
        }
    }
}
