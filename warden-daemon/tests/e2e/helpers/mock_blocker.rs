//! Recording blocker: remembers every call, fails on demand.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Mutex;

use warden_ban_guard::{BanError, BlockAction, Blocker};

#[derive(Default)]
pub struct RecordingBlocker {
    calls: Mutex<Vec<(BlockAction, Option<IpAddr>)>>,
    failing: Mutex<HashSet<IpAddr>>,
}

impl RecordingBlocker {
    pub fn fail_for(&self, address: IpAddr) {
        self.failing.lock().unwrap().insert(address);
    }

    pub fn calls(&self) -> Vec<(BlockAction, Option<IpAddr>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Addresses passed to `action`, in call order.
    pub fn addresses(&self, action: BlockAction) -> Vec<IpAddr> {
        self.calls()
            .into_iter()
            .filter(|(a, _)| *a == action)
            .filter_map(|(_, ip)| ip)
            .collect()
    }

    fn record(&self, action: BlockAction, address: Option<IpAddr>) -> Result<(), BanError> {
        self.calls.lock().unwrap().push((action, address));
        match address {
            Some(ip) if self.failing.lock().unwrap().contains(&ip) => Err(BanError::Blocker {
                action: action.as_str(),
                address: ip.to_string(),
                reason: "exit status: 1".to_owned(),
            }),
            _ => Ok(()),
        }
    }
}

impl Blocker for RecordingBlocker {
    async fn init(&self) -> Result<(), BanError> {
        self.record(BlockAction::Init, None)
    }

    async fn block(&self, address: IpAddr) -> Result<(), BanError> {
        self.record(BlockAction::Block, Some(address))
    }

    async fn unblock(&self, address: IpAddr) -> Result<(), BanError> {
        self.record(BlockAction::Unblock, Some(address))
    }
}
