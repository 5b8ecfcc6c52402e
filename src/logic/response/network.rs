//! Host firewall backends
//!
//! Blocking an IP drops inbound traffic from it and outbound traffic to it.
//! Calls are blocking (`std::process::Command`); async callers go through
//! `spawn_blocking`.

use std::net::IpAddr;
use std::process::Command;

use crate::config::{FirewallBackend, ResponseConfig};
use super::types::FirewallError;

pub trait Firewall: Send + Sync {
    fn name(&self) -> &'static str;

    /// Drop traffic from and to `ip`
    fn drop_ip(&self, ip: IpAddr) -> Result<(), FirewallError>;

    /// Remove the rules added by `drop_ip`
    fn undrop_ip(&self, ip: IpAddr) -> Result<(), FirewallError>;
}

/// Build the backend selected in configuration
pub fn from_config(config: &ResponseConfig) -> Box<dyn Firewall> {
    match config.backend {
        FirewallBackend::Iptables => Box::new(IptablesFirewall::new(config.use_sudo)),
        FirewallBackend::LogOnly => Box::new(LogOnlyFirewall),
    }
}

// ============================================================================
// IPTABLES
// ============================================================================

pub struct IptablesFirewall {
    use_sudo: bool,
}

/// `-I` inserts at the head of the chain, `-D` deletes the same rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleOp {
    Insert,
    Delete,
}

impl RuleOp {
    fn flag(self) -> &'static str {
        match self {
            RuleOp::Insert => "-I",
            RuleOp::Delete => "-D",
        }
    }
}

impl IptablesFirewall {
    pub fn new(use_sudo: bool) -> Self {
        Self { use_sudo }
    }

    fn binary(ip: IpAddr) -> &'static str {
        match ip {
            IpAddr::V4(_) => "iptables",
            IpAddr::V6(_) => "ip6tables",
        }
    }

    /// Full argv for one rule, sudo prefix included
    fn command_line(&self, op: RuleOp, chain: &str, ip: IpAddr) -> Vec<String> {
        let direction = if chain == "INPUT" { "-s" } else { "-d" };
        let ip_str = ip.to_string();
        let mut argv = Vec::with_capacity(9);
        if self.use_sudo {
            argv.push("sudo".to_string());
            argv.push("-n".to_string());
        }
        argv.extend(
            [Self::binary(ip), op.flag(), chain, direction, ip_str.as_str(), "-j", "DROP"]
                .iter()
                .map(|s| s.to_string()),
        );
        argv
    }

    fn run_rule(&self, op: RuleOp, chain: &str, ip: IpAddr) -> Result<(), FirewallError> {
        let argv = self.command_line(op, chain, ip);
        let (program, args) = argv.split_first().ok_or_else(|| FirewallError::Spawn {
            program: String::new(),
            message: "empty command line".to_string(),
        })?;

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| FirewallError::Spawn {
                program: program.clone(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(FirewallError::CommandFailed {
                command: argv.join(" "),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Remove the rules from both chains. Both are attempted, the first error is returned.
    fn remove_both(&self, ip: IpAddr) -> Result<(), FirewallError> {
        let inbound = self.run_rule(RuleOp::Delete, "INPUT", ip);
        let outbound = self.run_rule(RuleOp::Delete, "OUTPUT", ip);
        inbound.and(outbound)
    }
}

/// Insert the INPUT then the OUTPUT rule. If the OUTPUT insert fails the INPUT
/// rule is removed again, so a failed drop leaves nothing behind.
fn insert_both<F>(ip: IpAddr, mut run: F) -> Result<(), FirewallError>
where
    F: FnMut(RuleOp, &'static str) -> Result<(), FirewallError>,
{
    run(RuleOp::Insert, "INPUT")?;

    if let Err(e) = run(RuleOp::Insert, "OUTPUT") {
        if let Err(rollback) = run(RuleOp::Delete, "INPUT") {
            tracing::error!("Failed to roll back INPUT drop rule for {}: {}", ip, rollback);
        }
        return Err(e);
    }

    Ok(())
}

impl Firewall for IptablesFirewall {
    fn name(&self) -> &'static str {
        "iptables"
    }

    fn drop_ip(&self, ip: IpAddr) -> Result<(), FirewallError> {
        insert_both(ip, |op, chain| self.run_rule(op, chain, ip))
    }

    fn undrop_ip(&self, ip: IpAddr) -> Result<(), FirewallError> {
        self.remove_both(ip)
    }
}

// ============================================================================
// LOG ONLY
// ============================================================================

/// Dry-run backend: records intent in the log, touches nothing
pub struct LogOnlyFirewall;

impl Firewall for LogOnlyFirewall {
    fn name(&self) -> &'static str {
        "log-only"
    }

    fn drop_ip(&self, ip: IpAddr) -> Result<(), FirewallError> {
        tracing::info!("[log-only firewall] would drop traffic from/to {}", ip);
        Ok(())
    }

    fn undrop_ip(&self, ip: IpAddr) -> Result<(), FirewallError> {
        tracing::info!("[log-only firewall] would remove drop rules for {}", ip);
        Ok(())
    }
}
