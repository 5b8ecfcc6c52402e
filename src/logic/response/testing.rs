//! Test doubles for the response layer

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::network::Firewall;
use super::types::{AlertNotice, FirewallError, NotifyError};
use super::webhook::Notifier;

/// Records every call, optionally failing all of them
#[derive(Default)]
pub struct RecordingFirewall {
    fail: bool,
    drops: Mutex<Vec<IpAddr>>,
    undrops: Mutex<Vec<IpAddr>>,
}

impl RecordingFirewall {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { fail: true, ..Default::default() })
    }

    pub fn drops(&self) -> Vec<IpAddr> {
        self.drops.lock().clone()
    }

    pub fn undrops(&self) -> Vec<IpAddr> {
        self.undrops.lock().clone()
    }

    fn result(&self) -> Result<(), FirewallError> {
        if self.fail {
            Err(FirewallError::CommandFailed {
                command: "iptables".to_string(),
                exit_code: 4,
                stderr: "Permission denied (you must be root)".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl Firewall for RecordingFirewall {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn drop_ip(&self, ip: IpAddr) -> Result<(), FirewallError> {
        self.drops.lock().push(ip);
        self.result()
    }

    fn undrop_ip(&self, ip: IpAddr) -> Result<(), FirewallError> {
        self.undrops.lock().push(ip);
        self.result()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<AlertNotice>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<AlertNotice> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: &AlertNotice) -> Result<(), NotifyError> {
        self.sent.lock().push(notice.clone());
        Ok(())
    }
}
