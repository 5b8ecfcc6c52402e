//! Response Module - Automated containment and alerting
//!
//! # Components
//! - `network.rs`: Host firewall backends (iptables, log-only)
//! - `controller.rs`: Severity-driven, idempotent IP blocking
//! - `webhook.rs`: Telegram notifications

pub mod controller;
pub mod network;
pub mod types;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::ActiveResponse;
pub use types::{AlertNotice, BlockOutcome};
pub use webhook::{Notifier, TelegramNotifier};
