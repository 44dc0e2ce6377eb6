//! Event fan-out to listeners.
//!
//! Every registered listener owns a bounded queue and a worker task. Events for one
//! listener are handled strictly in arrival order; listeners never wait on each other.
//! When a queue is full the event is dropped for that listener and counted.

use std::collections::HashMap;
use std::future::Future;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use warden_core::metrics as m;

/// Listener registry
pub struct Dispatcher {
    capacity: usize,
    listeners: HashMap<String, Vec<mpsc::Sender<Value>>>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            listeners: HashMap::new(),
            workers: Vec::new(),
        }
    }

    /// Registers `handler` for `event`. Must be called inside a tokio runtime.
    pub fn register<F, Fut>(&mut self, event: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let event = event.into();
        let (tx, mut rx) = mpsc::channel::<Value>(self.capacity);

        let name = event.clone();
        self.workers.push(tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                handler(payload).await;
            }
            tracing::debug!(event = %name, "listener worker stopped");
        }));

        self.listeners.entry(event).or_default().push(tx);
    }

    /// Number of listeners for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }

    /// Queues `payload` for every listener of `event`.
    ///
    /// Returns how many listeners accepted it.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        metrics::counter!(m::REMOTE_EVENTS_TOTAL, m::LABEL_EVENT => event.to_owned())
            .increment(1);

        let Some(senders) = self.listeners.get(event) else {
            tracing::debug!(event, "no listener registered");
            return 0;
        };

        let mut accepted = 0;
        for tx in senders {
            match tx.try_send(payload.clone()) {
                Ok(()) => accepted += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(event, "listener queue full, event dropped");
                    metrics::counter!(
                        m::REMOTE_EVENTS_DROPPED_TOTAL,
                        m::LABEL_EVENT => event.to_owned()
                    )
                    .increment(1);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::warn!(event, "listener worker gone, event dropped");
                }
            }
        }
        accepted
    }

    /// Closes every queue and waits for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.listeners);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "listener worker panicked");
            }
        }
    }
}
