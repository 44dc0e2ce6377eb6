//! Recording outbox standing in for a connected controller session.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use warden_daemon::handlers::Outbox;
use warden_remote_channel::RemoteError;

#[derive(Clone, Default)]
pub struct RecordingOutbox {
    sent: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingOutbox {
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().unwrap().clone()
    }

    /// Payload of the last event called `name`.
    pub fn last(&self, name: &str) -> Option<Value> {
        self.sent()
            .into_iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data)
    }
}

impl Outbox for RecordingOutbox {
    async fn emit(&self, name: &str, data: &Value) -> Result<(), RemoteError> {
        self.sent
            .lock()
            .unwrap()
            .push((name.to_owned(), data.clone()));
        Ok(())
    }
}
