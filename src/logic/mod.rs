//! Detection and response logic
//!
//! - `monitor`: EVE log tailing and ingestion
//! - `threat`: noise classification
//! - `response`: firewall containment and notifications
//! - `external_intel`: reputation, geolocation and ATT&CK enrichment
//! - `correlation`: related-alert lookup
//! - `stats`: dashboard aggregates

pub mod correlation;
pub mod external_intel;
pub mod monitor;
pub mod response;
pub mod stats;
pub mod threat;
