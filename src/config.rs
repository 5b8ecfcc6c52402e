//! Configuration module

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use ipnetwork::IpNetwork;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    pub monitor: MonitorConfig,
    pub response: ResponseConfig,
    pub intel: IntelConfig,
    pub notify: NotifyConfig,
    pub noise: NoiseConfig,
}

/// Suricata EVE log tailing
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub eve_log_path: PathBuf,
    pub poll_interval_ms: u64,
}

/// Which firewall backend enforces blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallBackend {
    Iptables,
    LogOnly,
}

/// Active response (IP containment)
#[derive(Debug, Clone)]
pub struct ResponseConfig {
    pub enabled: bool,
    /// Alerts with `severity <= block_severity_threshold` are contained
    pub block_severity_threshold: u8,
    pub backend: FirewallBackend,
    pub use_sudo: bool,
    /// Persist a block row even when the firewall command failed
    pub record_unenforced_blocks: bool,
}

/// Reputation / geolocation providers and enrichment caching
#[derive(Debug, Clone)]
pub struct IntelConfig {
    pub abuseipdb_api_key: Option<String>,
    pub abuseipdb_url: String,
    pub geo_api_url: String,
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    pub enrichment_stale_secs: i64,
}

/// Telegram notification sink
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub timeout_secs: u64,
}

/// Known-benign alert patterns
#[derive(Debug, Clone)]
pub struct NoiseConfig {
    pub signatures: Vec<String>,
    pub test_ips: Vec<String>,
    pub private_ranges: Vec<IpNetwork>,
}

pub const DEFAULT_NOISE_SIGNATURES: &[&str] = &[
    "ET HUNTING Telegram API",
    "ET HUNTING Observed Telegram",
    "ET INFO External IP Lookup",
    "testmynids.org",
    "testmyids.com",
];

pub const DEFAULT_TEST_IPS: &[&str] = &[
    "3.175.196.35",
    "3.175.196.66",
    "3.175.196.11",
    "3.175.196.125",
];

pub const DEFAULT_PRIVATE_RANGES: &[&str] = &["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://oneshield-ids.db".to_string()),

            port: env_parse("PORT", 8080),

            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),

            monitor: MonitorConfig {
                eve_log_path: env::var("EVE_LOG_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/var/log/suricata/eve.json")),
                poll_interval_ms: env_parse("TAIL_POLL_MS", 100),
            },

            response: ResponseConfig {
                enabled: env_parse("ACTIVE_RESPONSE_ENABLED", true),
                block_severity_threshold: env_parse("BLOCK_SEVERITY_THRESHOLD", 2),
                backend: match env::var("FIREWALL_BACKEND").as_deref() {
                    Ok("log-only") | Ok("log_only") | Ok("none") => FirewallBackend::LogOnly,
                    _ => FirewallBackend::Iptables,
                },
                use_sudo: env_parse("FIREWALL_USE_SUDO", true),
                record_unenforced_blocks: env_parse("RECORD_UNENFORCED_BLOCKS", true),
            },

            intel: IntelConfig {
                abuseipdb_api_key: env_non_empty("ABUSEIPDB_API_KEY"),
                abuseipdb_url: env::var("ABUSEIPDB_URL")
                    .unwrap_or_else(|_| "https://api.abuseipdb.com/api/v2/check".to_string()),
                geo_api_url: env::var("GEO_API_URL")
                    .unwrap_or_else(|_| "http://ip-api.com/json".to_string()),
                timeout_secs: env_parse("INTEL_TIMEOUT_SECS", 5),
                cache_ttl_secs: env_parse("INTEL_CACHE_TTL_SECS", 3600),
                cache_max_entries: env_parse("INTEL_CACHE_MAX_ENTRIES", 1000),
                enrichment_stale_secs: env_parse("ENRICHMENT_STALE_SECS", 3600),
            },

            notify: NotifyConfig {
                telegram_bot_token: env_non_empty("TELEGRAM_BOT_TOKEN"),
                telegram_chat_id: env_non_empty("TELEGRAM_CHAT_ID"),
                timeout_secs: env_parse("NOTIFY_TIMEOUT_SECS", 5),
            },

            noise: NoiseConfig {
                signatures: env_list("NOISE_SIGNATURES")
                    .unwrap_or_else(|| to_strings(DEFAULT_NOISE_SIGNATURES)),
                test_ips: env_list("NOISE_TEST_IPS")
                    .unwrap_or_else(|| to_strings(DEFAULT_TEST_IPS)),
                private_ranges: parse_ranges(
                    env_list("NOISE_PRIVATE_RANGES")
                        .unwrap_or_else(|| to_strings(DEFAULT_PRIVATE_RANGES)),
                ),
            },
        }
    }
}

/// `LOG_FORMAT=json` selects JSON log lines
pub fn json_logs_from_env() -> bool {
    env::var("LOG_FORMAT")
        .map(|f| f.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            signatures: to_strings(DEFAULT_NOISE_SIGNATURES),
            test_ips: to_strings(DEFAULT_TEST_IPS),
            private_ranges: parse_ranges(to_strings(DEFAULT_PRIVATE_RANGES)),
        }
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_severity_threshold: 2,
            backend: FirewallBackend::Iptables,
            use_sudo: true,
            record_unenforced_blocks: true,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_non_empty(key).map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn parse_ranges(raw: Vec<String>) -> Vec<IpNetwork> {
    raw.iter()
        .filter_map(|cidr| match cidr.parse::<IpNetwork>() {
            Ok(net) => Some(net),
            Err(e) => {
                tracing::warn!("Ignoring invalid private range {}: {}", cidr, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_noise_config_has_rfc1918_ranges() {
        let noise = NoiseConfig::default();
        assert_eq!(noise.private_ranges.len(), 3);
        assert!(noise.signatures.iter().any(|s| s.contains("Telegram")));
    }

    #[test]
    fn invalid_ranges_are_skipped() {
        let ranges = parse_ranges(vec!["10.0.0.0/8".into(), "not-a-cidr".into()]);
        assert_eq!(ranges.len(), 1);
    }
}
