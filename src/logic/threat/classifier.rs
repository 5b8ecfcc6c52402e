//! Noise classifier
//!
//! Pure decision over an alert's signature and addresses. The same filter is
//! used at ingestion and for retrospective statistics, so one alert always
//! gets the same answer.

use std::net::IpAddr;

use ipnetwork::IpNetwork;

use crate::config::NoiseConfig;
use crate::models::{Alert, NewAlert};

/// Fields the classifier looks at
pub trait Classifiable {
    fn signature(&self) -> &str;
    fn src_ip(&self) -> &str;
    fn dest_ip(&self) -> &str;
}

impl Classifiable for Alert {
    fn signature(&self) -> &str {
        &self.signature
    }
    fn src_ip(&self) -> &str {
        &self.src_ip
    }
    fn dest_ip(&self) -> &str {
        &self.dest_ip
    }
}

impl Classifiable for NewAlert {
    fn signature(&self) -> &str {
        &self.signature
    }
    fn src_ip(&self) -> &str {
        &self.src_ip
    }
    fn dest_ip(&self) -> &str {
        &self.dest_ip
    }
}

/// Why an alert counts as noise
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoiseReason {
    BenignSignature(String),
    TestSource,
    InternalTraffic(IpNetwork),
}

#[derive(Debug, Clone)]
pub struct NoiseFilter {
    /// Lowercased once at construction
    signatures: Vec<String>,
    test_ips: Vec<String>,
    private_ranges: Vec<IpNetwork>,
}

impl NoiseFilter {
    pub fn new(config: &NoiseConfig) -> Self {
        Self {
            signatures: config
                .signatures
                .iter()
                .map(|s| s.to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            test_ips: config.test_ips.clone(),
            private_ranges: config.private_ranges.clone(),
        }
    }

    pub fn is_noise<A: Classifiable + ?Sized>(&self, alert: &A) -> bool {
        self.classify(alert).is_some()
    }

    /// First matching noise rule, if any
    pub fn classify<A: Classifiable + ?Sized>(&self, alert: &A) -> Option<NoiseReason> {
        let signature = alert.signature().to_lowercase();
        if let Some(pattern) = self.signatures.iter().find(|p| signature.contains(p.as_str())) {
            return Some(NoiseReason::BenignSignature(pattern.clone()));
        }

        if self.test_ips.iter().any(|ip| ip == alert.src_ip()) {
            return Some(NoiseReason::TestSource);
        }

        let src = alert.src_ip().parse::<IpAddr>().ok()?;
        let dest = alert.dest_ip().parse::<IpAddr>().ok()?;
        self.private_ranges
            .iter()
            .find(|range| range.contains(src) && range.contains(dest))
            .map(|range| NoiseReason::InternalTraffic(*range))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::alert::fixtures::new_alert;

    fn filter() -> NoiseFilter {
        NoiseFilter::new(&NoiseConfig::default())
    }

    #[test]
    fn test_benign_signature_is_case_insensitive() {
        let alert = new_alert("et hunting TELEGRAM api abuse", 2, "203.0.113.5", "8.8.8.8");
        assert!(filter().is_noise(&alert));

        let alert = new_alert("ET HUNTING Telegram API abuse", 2, "203.0.113.5", "8.8.8.8");
        assert_eq!(
            filter().classify(&alert),
            Some(NoiseReason::BenignSignature("et hunting telegram api".into()))
        );
    }

    #[test]
    fn test_known_test_source() {
        let alert = new_alert("ET SCAN Nmap", 1, "3.175.196.66", "10.0.0.2");
        assert_eq!(filter().classify(&alert), Some(NoiseReason::TestSource));
    }

    #[test]
    fn test_internal_traffic_same_range() {
        let alert = new_alert("ET SCAN Nmap", 1, "192.168.1.5", "192.168.1.9");
        assert!(filter().is_noise(&alert));
    }

    #[test]
    fn test_different_private_ranges_are_not_noise() {
        let alert = new_alert("ET SCAN Nmap", 1, "10.0.0.5", "192.168.1.9");
        assert!(!filter().is_noise(&alert));
    }

    #[test]
    fn test_real_threat_is_signal() {
        let alert = new_alert("ET EXPLOIT Apache Struts RCE", 1, "203.0.113.5", "192.168.1.9");
        assert!(!filter().is_noise(&alert));
        assert_eq!(filter().classify(&alert), None);
    }

    #[test]
    fn test_custom_config() {
        let config = NoiseConfig {
            signatures: vec!["GPL ICMP".into()],
            test_ips: vec![],
            private_ranges: vec!["fd00::/8".parse().unwrap()],
        };
        let noise = NoiseFilter::new(&config);

        assert!(noise.is_noise(&new_alert("GPL ICMP_INFO PING", 3, "203.0.113.5", "8.8.8.8")));
        assert!(noise.is_noise(&new_alert("ET SCAN", 3, "fd00::1", "fd00::2")));
        assert!(!noise.is_noise(&new_alert("ET SCAN", 3, "192.168.1.5", "192.168.1.9")));
    }
}
