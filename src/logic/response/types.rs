//! Response Types

use serde::Serialize;

use crate::models::{Alert, BlockedIp};

// ============================================================================
// FIREWALL
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum FirewallError {
    #[error("`{command}` exited with {exit_code}: {stderr}")]
    CommandFailed { command: String, exit_code: i32, stderr: String },

    #[error("could not run {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("firewall task aborted: {0}")]
    Interrupted(String),
}

// ============================================================================
// CONTAINMENT
// ============================================================================

/// Result of a containment request
#[derive(Debug, Clone)]
pub enum BlockOutcome {
    /// A new active row was written. `enforced` is false when the firewall
    /// command failed and the row was kept anyway.
    Blocked { record: BlockedIp, enforced: bool },
    /// An active row already existed, nothing was done
    AlreadyBlocked(BlockedIp),
    /// The firewall command failed and the strict policy kept no row
    NotEnforced(FirewallError),
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Transport(String),

    #[error("notification endpoint returned HTTP {0}")]
    Status(u16),
}

/// What gets pushed to the messaging channel for a high-severity alert
#[derive(Debug, Clone, Serialize)]
pub struct AlertNotice {
    pub alert_id: i64,
    pub signature: String,
    pub severity: u8,
    pub src_ip: String,
    pub src_port: Option<u16>,
    pub dest_ip: String,
    pub dest_port: Option<u16>,
    pub action: String,
}

impl From<&Alert> for AlertNotice {
    fn from(alert: &Alert) -> Self {
        Self {
            alert_id: alert.id,
            signature: alert.signature.clone(),
            severity: alert.severity,
            src_ip: alert.src_ip.clone(),
            src_port: alert.src_port,
            dest_ip: alert.dest_ip.clone(),
            dest_port: alert.dest_port,
            action: alert.action.as_str().to_string(),
        }
    }
}

impl AlertNotice {
    pub fn severity_emoji(&self) -> &'static str {
        match self.severity {
            1 => "🔴",
            2 => "🟠",
            3 => "🟡",
            _ => "🔵",
        }
    }
}
