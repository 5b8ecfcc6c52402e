//! IP reputation client
//!
//! Private addresses are answered locally. Everything else goes to the
//! primary provider, then to the geolocation fallback for whatever is still
//! missing. Lookups never fail: the worst case is an empty record.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use ipnetwork::IpNetwork;
use once_cell::sync::Lazy;

use crate::config::IntelConfig;
use super::cache::{ExpiringCache, TtlCache};
use super::providers::{AbuseIpDbProvider, IpApiProvider, ReputationProvider};
use super::types::{IpReputation, LookupOutcome, ProviderError, ReputationStatus};

static NON_ROUTABLE: Lazy<Vec<IpNetwork>> = Lazy::new(|| {
    [
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "0.0.0.0/32",
        "::1/128",
        "::/128",
        "fc00::/7",
        "fe80::/10",
    ]
    .iter()
    .filter_map(|cidr| cidr.parse().ok())
    .collect()
});

/// Private, loopback, link-local or unspecified
pub fn is_private_ip(ip: IpAddr) -> bool {
    NON_ROUTABLE.iter().any(|net| net.contains(ip))
}

pub struct ThreatIntelClient {
    primary: Arc<dyn ReputationProvider>,
    fallback: Arc<dyn ReputationProvider>,
    cache: Arc<dyn ExpiringCache<IpAddr, IpReputation>>,
}

impl ThreatIntelClient {
    pub fn new(
        primary: Arc<dyn ReputationProvider>,
        fallback: Arc<dyn ReputationProvider>,
        cache: Arc<dyn ExpiringCache<IpAddr, IpReputation>>,
    ) -> Self {
        Self { primary, fallback, cache }
    }

    /// AbuseIPDB primary, ip-api fallback, in-memory TTL cache
    pub fn from_config(config: &IntelConfig) -> Self {
        let primary = AbuseIpDbProvider::new(
            config.abuseipdb_api_key.clone(),
            config.abuseipdb_url.clone(),
            config.timeout_secs,
        );
        if !primary.is_configured() {
            tracing::info!("ABUSEIPDB_API_KEY not set, reputation scores disabled (geolocation only)");
        }

        Self::new(
            Arc::new(primary),
            Arc::new(IpApiProvider::new(config.geo_api_url.clone(), config.timeout_secs)),
            Arc::new(TtlCache::new(
                Duration::from_secs(config.cache_ttl_secs),
                config.cache_max_entries,
            )),
        )
    }

    /// Reputation for one IP
    pub async fn reputation(&self, ip: IpAddr) -> IpReputation {
        if is_private_ip(ip) {
            return IpReputation::private(ip);
        }

        if let Some(cached) = self.cache.get(&ip) {
            return cached;
        }

        let mut reputation = IpReputation::empty(ip);
        self.apply(&mut reputation, self.primary.as_ref(), ip).await;

        if reputation.status != ReputationStatus::Complete || reputation.needs_geolocation() {
            self.apply(&mut reputation, self.fallback.as_ref(), ip).await;
        }

        self.cache.insert(ip, reputation.clone());
        reputation
    }

    async fn apply(&self, reputation: &mut IpReputation, provider: &dyn ReputationProvider, ip: IpAddr) {
        match provider.lookup(ip).await {
            LookupOutcome::Found(report) => reputation.merge(report),
            LookupOutcome::NoData => {
                tracing::debug!("{} has no data for {}", provider.name(), ip);
            }
            LookupOutcome::Failed(ProviderError::NotConfigured { .. }) => {}
            LookupOutcome::Failed(e) => {
                tracing::warn!("Reputation lookup for {} failed: {}", ip, e);
            }
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}
