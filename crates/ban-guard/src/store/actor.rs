//! Store thread: the only owner of the SQLite connection.
//!
//! Requests arrive over a bounded channel and are executed strictly one at a time.
//! Writes open a transaction lazily; it stays open until a [`Request::Commit`]
//! arrives, so callers batch many writes into one commit.

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tokio::sync::{mpsc, oneshot};

use crate::error::StoreError;

/// One result row, column values in select order.
pub type Row = Vec<Value>;

/// Reply channel for a request
pub(crate) type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

pub(crate) enum Request {
    /// Read-only statement returning rows
    Query {
        sql: String,
        params: Vec<Value>,
        reply: Reply<Vec<Row>>,
    },
    /// Data-modifying statement returning the number of changed rows
    Execute {
        sql: String,
        params: Vec<Value>,
        reply: Reply<usize>,
    },
    /// Commit the open transaction, if any
    Commit { reply: Reply<bool> },
}

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS bans (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    time    INTEGER NOT NULL,
    address TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_bans_address ON bans(address);

CREATE TABLE IF NOT EXISTS attacks (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    time    INTEGER NOT NULL,
    address TEXT    NOT NULL,
    profile TEXT    NOT NULL,
    user    TEXT,
    data    TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attacks_key ON attacks(address, time, profile);
"#;

pub(crate) struct StoreActor {
    conn: Connection,
}

impl StoreActor {
    pub(crate) fn new(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Serves requests until every handle is dropped.
    pub(crate) fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        tracing::debug!("store actor started");

        while let Some(request) = rx.blocking_recv() {
            match request {
                Request::Query { sql, params, reply } => {
                    let _ = reply.send(self.query(&sql, &params));
                }
                Request::Execute { sql, params, reply } => {
                    let _ = reply.send(self.execute(&sql, &params));
                }
                Request::Commit { reply } => {
                    let _ = reply.send(self.commit());
                }
            }
        }

        if !self.conn.is_autocommit() {
            tracing::warn!("store closing with uncommitted writes, rolling back");
        }
        tracing::debug!("store actor stopped");
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let columns = stmt.column_count();
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            (0..columns)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Row>>()
        })?;
        Ok(rows.collect::<Result<Vec<Row>, _>>()?)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize, StoreError> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        let mut stmt = self.conn.prepare_cached(sql)?;
        Ok(stmt.execute(params_from_iter(params.iter()))?)
    }

    fn commit(&mut self) -> Result<bool, StoreError> {
        if self.conn.is_autocommit() {
            return Ok(false);
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(true)
    }
}
