//! Single-writer store.
//!
//! One dedicated thread owns the `rusqlite::Connection` ([`actor`]). Every other task
//! talks to it through a cloneable [`StoreHandle`]: a request goes over a bounded
//! channel and the caller waits for the reply on a oneshot. A submission-side mutex
//! keeps at most one request in flight, and each request is bounded by a timeout so
//! a stuck or dead store thread surfaces as [`StoreError::Timeout`] or
//! [`StoreError::ActorGone`] instead of stalling the caller forever.
//!
//! Typed helpers for the `bans` and `attacks` tables live in [`queries`].

mod actor;
mod queries;

pub use actor::Row;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::types::Value;
use tokio::sync::{Mutex, mpsc, oneshot};

use warden_core::config::StoreConfig;

use crate::error::StoreError;

use actor::{Reply, Request, StoreActor};

/// Store handle options
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Upper bound for one request, including queueing
    pub request_timeout: Duration,
    /// Request channel capacity
    pub queue_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            queue_capacity: 64,
        }
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            queue_capacity: config.queue_capacity.max(1),
        }
    }
}

/// Cloneable client of the store thread.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<Request>,
    gate: Arc<Mutex<()>>,
    timeout: Duration,
}

impl StoreHandle {
    /// Opens (or creates) the database file and starts the store thread.
    ///
    /// The parent directory is created when missing.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "store opened");
        Self::start(conn, options)
    }

    /// In-memory store, mainly for tests.
    pub fn open_in_memory(options: StoreOptions) -> Result<Self, StoreError> {
        Self::start(Connection::open_in_memory()?, options)
    }

    fn start(conn: Connection, options: StoreOptions) -> Result<Self, StoreError> {
        let actor = StoreActor::new(conn)?;
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));

        std::thread::Builder::new()
            .name("warden-store".to_owned())
            .spawn(move || actor.run(rx))?;

        Ok(Self {
            tx,
            gate: Arc::new(Mutex::new(())),
            timeout: options.request_timeout,
        })
    }

    /// Runs a read statement and returns every row.
    pub async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, StoreError> {
        let sql = sql.to_owned();
        self.request(|reply| Request::Query { sql, params, reply })
            .await
    }

    /// Runs a data-modifying statement inside the pending transaction.
    ///
    /// Returns the number of changed rows. Nothing is durable until [`commit`](Self::commit).
    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<usize, StoreError> {
        let sql = sql.to_owned();
        self.request(|reply| Request::Execute { sql, params, reply })
            .await
    }

    /// Commits pending writes. Returns `false` when there was nothing to commit.
    pub async fn commit(&self) -> Result<bool, StoreError> {
        self.request(|reply| Request::Commit { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, StoreError> {
        let _in_flight = self.gate.lock().await;
        let (reply_tx, reply_rx) = oneshot::channel();

        let exchange = async {
            self.tx
                .send(build(reply_tx))
                .await
                .map_err(|_| StoreError::ActorGone)?;
            reply_rx.await.map_err(|_| StoreError::ActorGone)?
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout.as_secs()))?
    }
}
