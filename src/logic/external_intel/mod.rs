//! External Intelligence Module - Alert enrichment
//!
//! # Components
//! - `providers.rs`: AbuseIPDB reputation and ip-api geolocation clients
//! - `reputation.rs`: Cached, never-failing reputation lookup
//! - `cache.rs`: TTL cache abstraction
//! - `mitre.rs`: Signature to MITRE ATT&CK mapping and kill-chain phase
//! - `enrichment.rs`: Per-alert enrichment with staleness window

pub mod cache;
pub mod enrichment;
pub mod mitre;
pub mod providers;
pub mod reputation;
pub mod types;

pub use types::{TechniqueMatch, ThreatIntelSnapshot};

pub use enrichment::AlertEnricher;
pub use mitre::TechniqueMapper;
pub use reputation::ThreatIntelClient;
