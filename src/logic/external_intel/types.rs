//! External Intelligence Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

// ============================================================================
// IP REPUTATION TYPES
// ============================================================================

/// Score above which an IP is considered malicious
pub const MALICIOUS_SCORE_THRESHOLD: u8 = 50;

/// Merged reputation / geolocation view of one IP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpReputation {
    pub ip: String,
    /// Abuse confidence (0 - 100)
    pub score: u8,
    pub is_malicious: bool,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
    pub abuse_report_count: u32,
    pub last_reported_at: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: ReputationStatus,
    pub checked_at: DateTime<Utc>,
}

/// How much of the reputation record was actually filled in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationStatus {
    /// Private / loopback address, no lookup performed
    Private,
    /// Reputation provider answered
    Complete,
    /// Only geolocation data is available
    Partial,
    /// No provider produced data
    Empty,
}

impl IpReputation {
    /// All-defaults record: a valid outcome when no provider has data
    pub fn empty(ip: IpAddr) -> Self {
        Self {
            ip: ip.to_string(),
            score: 0,
            is_malicious: false,
            country: None,
            country_code: None,
            city: None,
            isp: None,
            abuse_report_count: 0,
            last_reported_at: None,
            latitude: None,
            longitude: None,
            status: ReputationStatus::Empty,
            checked_at: Utc::now(),
        }
    }

    /// Canned answer for addresses that never leave the local network
    pub fn private(ip: IpAddr) -> Self {
        Self {
            country: Some("Private".to_string()),
            country_code: Some("LAN".to_string()),
            city: Some("Local Network".to_string()),
            isp: Some("Private Network".to_string()),
            status: ReputationStatus::Private,
            ..Self::empty(ip)
        }
    }

    /// Apply a provider report. Fields already set are kept, so the
    /// first report applied wins on conflict.
    pub fn merge(&mut self, report: ProviderReport) {
        if let Some(score) = report.score {
            if self.status != ReputationStatus::Complete {
                self.score = score.min(100);
                self.is_malicious = self.score > MALICIOUS_SCORE_THRESHOLD;
                self.status = ReputationStatus::Complete;
            }
        } else if self.status == ReputationStatus::Empty {
            self.status = ReputationStatus::Partial;
        }

        fill(&mut self.country, report.country);
        fill(&mut self.country_code, report.country_code);
        fill(&mut self.city, report.city);
        fill(&mut self.isp, report.isp);
        fill(&mut self.last_reported_at, report.last_reported_at);
        fill(&mut self.latitude, report.latitude);
        fill(&mut self.longitude, report.longitude);

        if self.abuse_report_count == 0 {
            self.abuse_report_count = report.abuse_report_count.unwrap_or(0);
        }
    }

    /// Geolocation still worth asking for
    pub fn needs_geolocation(&self) -> bool {
        self.country.is_none() || self.isp.is_none()
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Source/destination reputation stored on an alert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreatIntelSnapshot {
    pub source: Option<IpReputation>,
    pub destination: Option<IpReputation>,
}

// ============================================================================
// PROVIDER TYPES
// ============================================================================

/// Fields a single provider managed to return
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderReport {
    pub score: Option<u8>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
    pub abuse_report_count: Option<u32>,
    pub last_reported_at: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Result of asking one provider about one IP
#[derive(Debug)]
pub enum LookupOutcome {
    Found(ProviderReport),
    /// The provider answered but knows nothing about the IP
    NoData,
    Failed(ProviderError),
}

/// Provider error types
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} is not configured")]
    NotConfigured { provider: &'static str },
    #[error("{provider} request failed: {message}")]
    Transport { provider: &'static str, message: String },
    #[error("{provider} returned HTTP {status}")]
    Status { provider: &'static str, status: u16 },
    #[error("{provider} returned an unreadable body: {message}")]
    Decode { provider: &'static str, message: String },
}

// ============================================================================
// MITRE ATT&CK TYPES
// ============================================================================

/// Technique mapped from an alert signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechniqueMatch {
    pub technique_id: String,
    pub tactic: String,
    pub technique_name: String,
    pub url: String,
}

/// MITRE ATT&CK Tactic, declared in kill-chain order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MitreTactic {
    Reconnaissance,
    InitialAccess,
    Execution,
    Persistence,
    PrivilegeEscalation,
    DefenseEvasion,
    CredentialAccess,
    Discovery,
    LateralMovement,
    Collection,
    CommandAndControl,
    Exfiltration,
    Impact,
}

impl MitreTactic {
    pub const ALL: [MitreTactic; 13] = [
        MitreTactic::Reconnaissance,
        MitreTactic::InitialAccess,
        MitreTactic::Execution,
        MitreTactic::Persistence,
        MitreTactic::PrivilegeEscalation,
        MitreTactic::DefenseEvasion,
        MitreTactic::CredentialAccess,
        MitreTactic::Discovery,
        MitreTactic::LateralMovement,
        MitreTactic::Collection,
        MitreTactic::CommandAndControl,
        MitreTactic::Exfiltration,
        MitreTactic::Impact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MitreTactic::Reconnaissance => "Reconnaissance",
            MitreTactic::InitialAccess => "Initial Access",
            MitreTactic::Execution => "Execution",
            MitreTactic::Persistence => "Persistence",
            MitreTactic::PrivilegeEscalation => "Privilege Escalation",
            MitreTactic::DefenseEvasion => "Defense Evasion",
            MitreTactic::CredentialAccess => "Credential Access",
            MitreTactic::Discovery => "Discovery",
            MitreTactic::LateralMovement => "Lateral Movement",
            MitreTactic::Collection => "Collection",
            MitreTactic::CommandAndControl => "Command and Control",
            MitreTactic::Exfiltration => "Exfiltration",
            MitreTactic::Impact => "Impact",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str().eq_ignore_ascii_case(name))
    }
}
