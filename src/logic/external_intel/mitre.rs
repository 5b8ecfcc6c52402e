//! MITRE ATT&CK Mapping Module
//!
//! Maps free-text Suricata signatures to ATT&CK techniques and derives the
//! kill-chain phase of an alert.

use std::collections::{HashMap, HashSet};
use once_cell::sync::Lazy;

use super::types::{MitreTactic, TechniqueMatch};

// ============================================================================
// MITRE TECHNIQUE DATABASE
// ============================================================================

struct TechniqueInfo {
    tactic: MitreTactic,
    name: &'static str,
}

static TECHNIQUES: Lazy<HashMap<&'static str, TechniqueInfo>> = Lazy::new(|| {
    use MitreTactic::*;

    let entries: &[(&str, MitreTactic, &str)] = &[
        ("T1595", Reconnaissance, "Active Scanning"),
        ("T1046", Discovery, "Network Service Scanning"),
        ("T1190", InitialAccess, "Exploit Public-Facing Application"),
        ("T1059", Execution, "Command and Scripting Interpreter"),
        ("T1204", Execution, "User Execution"),
        ("T1505.003", Persistence, "Web Shell"),
        ("T1068", PrivilegeEscalation, "Exploitation for Privilege Escalation"),
        ("T1027", DefenseEvasion, "Obfuscated Files or Information"),
        ("T1573", CommandAndControl, "Encrypted Channel"),
        ("T1110", CredentialAccess, "Brute Force"),
        ("T1003", CredentialAccess, "OS Credential Dumping"),
        ("T1087", Discovery, "Account Discovery"),
        ("T1021.002", LateralMovement, "SMB/Windows Admin Shares"),
        ("T1021.001", LateralMovement, "Remote Desktop Protocol"),
        ("T1021.004", LateralMovement, "SSH"),
        ("T1005", Collection, "Data from Local System"),
        ("T1071", CommandAndControl, "Application Layer Protocol"),
        ("T1071.004", CommandAndControl, "DNS"),
        ("T1071.001", CommandAndControl, "Web Protocols"),
        ("T1041", Exfiltration, "Exfiltration Over C2 Channel"),
        ("T1498", Impact, "Network Denial of Service"),
        ("T1486", Impact, "Data Encrypted for Impact"),
    ];

    entries
        .iter()
        .map(|(id, tactic, name)| (*id, TechniqueInfo { tactic: *tactic, name }))
        .collect()
});

// ============================================================================
// SIGNATURE TO TECHNIQUE MAPPING
// ============================================================================

/// Lowercase signature fragments and the techniques they indicate.
/// Matching walks this table in order.
pub const SIGNATURE_TO_MITRE: &[(&str, &[&str])] = &[
    // Reconnaissance
    ("scan", &["T1595", "T1046"]),
    ("port scan", &["T1046"]),
    ("nmap", &["T1046"]),

    // Initial Access
    ("exploit", &["T1190"]),
    ("sql injection", &["T1190"]),
    ("rce", &["T1190"]),
    ("remote code execution", &["T1190"]),
    ("shellshock", &["T1190"]),

    // Execution
    ("malware", &["T1059"]),
    ("trojan", &["T1204"]),
    ("backdoor", &["T1059"]),

    // Persistence
    ("webshell", &["T1505.003"]),

    // Privilege Escalation
    ("privilege escalation", &["T1068"]),
    ("root", &["T1068"]),

    // Defense Evasion
    ("obfuscated", &["T1027"]),
    ("encoding", &["T1027"]),
    ("encrypted", &["T1573"]),

    // Credential Access
    ("brute force", &["T1110"]),
    ("password", &["T1110"]),
    ("credential", &["T1003"]),

    // Discovery
    ("enumeration", &["T1087"]),

    // Lateral Movement
    ("smb", &["T1021.002"]),
    ("rdp", &["T1021.001"]),
    ("ssh", &["T1021.004"]),

    // Collection
    ("download", &["T1005"]),

    // Command and Control
    ("c2", &["T1071"]),
    ("c&c", &["T1071"]),
    ("command and control", &["T1071"]),
    ("beacon", &["T1071"]),
    ("callback", &["T1071"]),
    ("bot", &["T1071"]),
    ("dns tunnel", &["T1071.004"]),
    ("http", &["T1071.001"]),
    ("https", &["T1071.001"]),

    // Exfiltration
    ("exfiltration", &["T1041"]),
    ("upload", &["T1041"]),

    // Impact
    ("dos", &["T1498"]),
    ("ddos", &["T1498"]),
    ("flood", &["T1498"]),
    ("ransomware", &["T1486"]),
];

// ============================================================================
// TECHNIQUE MAPPER
// ============================================================================

/// Signature → technique mapper. Built once and shared.
#[derive(Debug, Default, Clone, Copy)]
pub struct TechniqueMapper;

impl TechniqueMapper {
    pub fn new() -> Self {
        Self
    }

    /// Map a signature to techniques, deduplicated by id in first-match order
    pub fn map_signature(&self, signature: &str) -> Vec<TechniqueMatch> {
        if signature.trim().is_empty() {
            return Vec::new();
        }

        let signature_lower = signature.to_lowercase();
        let mut seen = HashSet::new();
        let mut result = Vec::new();

        for (pattern, technique_ids) in SIGNATURE_TO_MITRE {
            if !signature_lower.contains(pattern) {
                continue;
            }
            for technique_id in technique_ids.iter() {
                if seen.insert(*technique_id) {
                    result.push(technique_match(technique_id));
                }
            }
        }

        result
    }

    /// Earliest canonical kill-chain phase among the techniques. Falls back to
    /// the first technique's tactic when none is canonical.
    pub fn kill_chain_phase(&self, techniques: &[TechniqueMatch]) -> Option<String> {
        techniques
            .iter()
            .filter_map(|t| MitreTactic::from_name(&t.tactic))
            .min()
            .map(|tactic| tactic.as_str().to_string())
            .or_else(|| techniques.first().map(|t| t.tactic.clone()))
    }
}

fn technique_match(technique_id: &str) -> TechniqueMatch {
    let (tactic, name) = TECHNIQUES
        .get(technique_id)
        .map(|info| (info.tactic.as_str(), info.name))
        .unwrap_or(("Unknown", "Unknown"));

    TechniqueMatch {
        technique_id: technique_id.to_string(),
        tactic: tactic.to_string(),
        technique_name: name.to_string(),
        url: format!(
            "https://attack.mitre.org/techniques/{}/",
            technique_id.replace('.', "/")
        ),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nmap_scan_mapping() {
        let techniques = TechniqueMapper::new().map_signature("ET SCAN Nmap Scripting Engine");
        let ids: Vec<_> = techniques.iter().map(|t| t.technique_id.as_str()).collect();

        // "scan" contributes T1595 then T1046, "nmap" repeats T1046
        assert_eq!(ids, vec!["T1595", "T1046"]);
        assert_eq!(techniques[0].tactic, "Reconnaissance");
    }

    #[test]
    fn test_empty_and_unmatched_signatures() {
        let mapper = TechniqueMapper::new();
        assert!(mapper.map_signature("").is_empty());
        assert!(mapper.map_signature("   ").is_empty());
        assert!(mapper.map_signature("GPL ICMP_INFO PING").is_empty());
    }

    #[test]
    fn test_sub_technique_url() {
        let techniques = TechniqueMapper::new().map_signature("ET POLICY SMB2 NT Create");
        assert_eq!(techniques[0].technique_id, "T1021.002");
        assert_eq!(techniques[0].url, "https://attack.mitre.org/techniques/T1021/002/");
    }

    #[test]
    fn test_kill_chain_picks_earliest_phase() {
        let mapper = TechniqueMapper::new();
        let techniques = mapper.map_signature("ET MALWARE Ransomware C2 Beacon via exploit");
        assert_eq!(mapper.kill_chain_phase(&techniques).as_deref(), Some("Initial Access"));
    }

    #[test]
    fn test_kill_chain_fallback_and_empty() {
        let mapper = TechniqueMapper::new();
        assert_eq!(mapper.kill_chain_phase(&[]), None);

        let custom = vec![TechniqueMatch {
            technique_id: "X1".into(),
            tactic: "Resource Development".into(),
            technique_name: "Custom".into(),
            url: String::new(),
        }];
        assert_eq!(mapper.kill_chain_phase(&custom).as_deref(), Some("Resource Development"));
    }
}
