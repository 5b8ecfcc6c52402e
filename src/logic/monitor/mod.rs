//! Monitor Module - Suricata alert ingestion
//!
//! # Components
//! - `event.rs`: EVE JSON line → validated alert
//! - `tailer.rs`: Background follower of `eve.json`
//! - `ingest.rs`: Classification, storage, containment, notification

pub mod event;
pub mod ingest;
pub mod tailer;

#[cfg(test)]
mod tests;

pub use ingest::AlertIngestor;
pub use tailer::LogTailer;
