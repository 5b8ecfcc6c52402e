//! Active response controller
//!
//! The block registry (`blocked_ips`) decides whether a firewall call is
//! needed, so repeated block requests for an active IP are no-ops. Block and
//! unblock of the same IP are serialized, so the registry check and the
//! firewall call happen as one step.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use sqlx::SqlitePool;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::ResponseConfig;
use crate::models::BlockedIp;
use super::network::Firewall;
use super::types::{BlockOutcome, FirewallError};

pub struct ActiveResponse {
    pool: SqlitePool,
    firewall: Arc<dyn Firewall>,
    enabled: bool,
    threshold: u8,
    record_unenforced: bool,
    locks: IpLocks,
}

impl ActiveResponse {
    pub fn new(pool: SqlitePool, firewall: Arc<dyn Firewall>, config: &ResponseConfig) -> Self {
        Self {
            pool,
            firewall,
            enabled: config.enabled,
            threshold: config.block_severity_threshold,
            record_unenforced: config.record_unenforced_blocks,
            locks: IpLocks::default(),
        }
    }

    /// Automatic containment applies to `severity <= threshold`
    pub fn should_block(&self, severity: u8) -> bool {
        self.enabled && severity <= self.threshold
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub async fn block(&self, ip: IpAddr, reason: &str) -> Result<BlockOutcome, sqlx::Error> {
        let _lease = self.locks.acquire(ip).await;
        let ip_str = ip.to_string();

        if let Some(existing) = BlockedIp::find_active(&self.pool, &ip_str).await? {
            tracing::info!("IP {} is already blocked (since {})", ip, existing.blocked_at);
            return Ok(BlockOutcome::AlreadyBlocked(existing));
        }

        let enforced = match self.run_firewall(ip, FirewallOp::Drop).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to drop traffic for {} via {}: {}", ip, self.firewall.name(), e);
                if !self.record_unenforced {
                    return Ok(BlockOutcome::NotEnforced(e));
                }
                false
            }
        };

        match BlockedIp::insert_active(&self.pool, &ip_str, reason, enforced).await? {
            Some(record) => {
                tracing::warn!(
                    "Active response: blocked {} (enforced: {}) - reason: {}",
                    ip, enforced, reason
                );
                Ok(BlockOutcome::Blocked { record, enforced })
            }
            None => {
                // Another process sharing the store blocked it first
                let existing = BlockedIp::find_active(&self.pool, &ip_str)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                Ok(BlockOutcome::AlreadyBlocked(existing))
            }
        }
    }

    /// Lift the active block. Firewall removal is best-effort. Returns `None`
    /// when the IP had no active block.
    pub async fn unblock(&self, ip: IpAddr) -> Result<Option<BlockedIp>, sqlx::Error> {
        let _lease = self.locks.acquire(ip).await;
        let ip_str = ip.to_string();

        if BlockedIp::find_active(&self.pool, &ip_str).await?.is_none() {
            return Ok(None);
        }

        if let Err(e) = self.run_firewall(ip, FirewallOp::Undrop).await {
            tracing::error!("Failed to remove drop rules for {}: {}", ip, e);
        }

        let record = BlockedIp::deactivate(&self.pool, &ip_str).await?;
        if record.is_some() {
            tracing::info!("Unblocked {}", ip);
        }
        Ok(record)
    }

    async fn run_firewall(&self, ip: IpAddr, op: FirewallOp) -> Result<(), FirewallError> {
        let firewall = Arc::clone(&self.firewall);
        tokio::task::spawn_blocking(move || match op {
            FirewallOp::Drop => firewall.drop_ip(ip),
            FirewallOp::Undrop => firewall.undrop_ip(ip),
        })
        .await
        .map_err(|e| FirewallError::Interrupted(e.to_string()))?
    }
}

#[derive(Debug, Clone, Copy)]
enum FirewallOp {
    Drop,
    Undrop,
}

/// One async lock per IP with work in flight. Entries are removed once the
/// last holder or waiter is gone.
#[derive(Default)]
struct IpLocks {
    slots: Mutex<HashMap<IpAddr, Arc<AsyncMutex<()>>>>,
}

impl IpLocks {
    async fn acquire(&self, ip: IpAddr) -> IpLease<'_> {
        let slot = Arc::clone(self.slots.lock().entry(ip).or_default());
        let guard = slot.lock_owned().await;
        IpLease { locks: self, ip, guard: Some(guard) }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.slots.lock().len()
    }
}

struct IpLease<'a> {
    locks: &'a IpLocks,
    ip: IpAddr,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IpLease<'_> {
    fn drop(&mut self) {
        let mut slots = self.locks.slots.lock();
        self.guard.take();
        if slots.get(&self.ip).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&self.ip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::logic::response::testing::RecordingFirewall;

    fn controller(pool: SqlitePool, firewall: Arc<RecordingFirewall>, record_unenforced: bool) -> ActiveResponse {
        let config = ResponseConfig {
            record_unenforced_blocks: record_unenforced,
            ..Default::default()
        };
        ActiveResponse::new(pool, firewall, &config)
    }

    fn ip() -> IpAddr {
        "203.0.113.5".parse().unwrap()
    }

    #[tokio::test]
    async fn block_is_idempotent() {
        let pool = test_pool().await;
        let firewall = RecordingFirewall::new();
        let response = controller(pool.clone(), firewall.clone(), true);

        let first = response.block(ip(), "ET SCAN Nmap").await.unwrap();
        assert!(matches!(first, BlockOutcome::Blocked { enforced: true, .. }));

        let second = response.block(ip(), "ET SCAN Nmap").await.unwrap();
        assert!(matches!(second, BlockOutcome::AlreadyBlocked(_)));

        assert_eq!(firewall.drops(), vec![ip()]);
        assert_eq!(BlockedIp::history(&pool, "203.0.113.5").await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_blocks_call_firewall_once() {
        let pool = test_pool().await;
        let firewall = RecordingFirewall::new();
        let response = Arc::new(controller(pool.clone(), firewall.clone(), true));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let response = Arc::clone(&response);
                tokio::spawn(async move { response.block(ip(), "ET SCAN Nmap").await })
            })
            .collect();

        let mut blocked = 0;
        for task in tasks {
            match task.await.unwrap().unwrap() {
                BlockOutcome::Blocked { .. } => blocked += 1,
                BlockOutcome::AlreadyBlocked(_) => {}
                other => panic!("unexpected outcome: {:?}", other),
            }
        }

        assert_eq!(blocked, 1);
        assert_eq!(firewall.drops(), vec![ip()]);
        assert_eq!(response.locks.in_flight(), 0);

        response.unblock(ip()).await.unwrap().unwrap();
        assert_eq!(firewall.undrops(), vec![ip()]);
        assert!(BlockedIp::find_active(&pool, "203.0.113.5").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_firewall_still_records_intent() {
        let pool = test_pool().await;
        let response = controller(pool.clone(), RecordingFirewall::failing(), true);

        let outcome = response.block(ip(), "ET EXPLOIT").await.unwrap();
        match outcome {
            BlockOutcome::Blocked { record, enforced } => {
                assert!(!enforced);
                assert!(!record.enforced);
                assert!(record.active);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        match response.block(ip(), "ET EXPLOIT").await.unwrap() {
            BlockOutcome::AlreadyBlocked(existing) => assert!(!existing.enforced),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn strict_policy_records_nothing_on_failure() {
        let pool = test_pool().await;
        let response = controller(pool.clone(), RecordingFirewall::failing(), false);

        let outcome = response.block(ip(), "ET EXPLOIT").await.unwrap();
        assert!(matches!(outcome, BlockOutcome::NotEnforced(_)));
        assert!(BlockedIp::find_active(&pool, "203.0.113.5").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unblock_then_reblock_creates_new_row() {
        let pool = test_pool().await;
        let firewall = RecordingFirewall::new();
        let response = controller(pool.clone(), firewall.clone(), true);

        response.block(ip(), "first").await.unwrap();
        let lifted = response.unblock(ip()).await.unwrap().unwrap();
        assert!(!lifted.active);
        response.block(ip(), "second").await.unwrap();

        let history = BlockedIp::history(&pool, "203.0.113.5").await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].active);
        assert!(history[0].unblocked_at.is_some());
        assert!(history[1].active);
        assert_eq!(firewall.undrops(), vec![ip()]);
    }

    #[tokio::test]
    async fn unblock_unknown_ip_is_none() {
        let pool = test_pool().await;
        let firewall = RecordingFirewall::new();
        let response = controller(pool, firewall.clone(), true);

        assert!(response.unblock(ip()).await.unwrap().is_none());
        assert!(firewall.undrops().is_empty());
    }

    #[tokio::test]
    async fn threshold_and_switch() {
        let pool = test_pool().await;
        let response = controller(pool.clone(), RecordingFirewall::new(), true);
        assert!(response.should_block(1));
        assert!(response.should_block(2));
        assert!(!response.should_block(3));

        let disabled = ActiveResponse::new(
            pool,
            RecordingFirewall::new(),
            &ResponseConfig { enabled: false, ..Default::default() },
        );
        assert!(!disabled.should_block(1));
    }
}
