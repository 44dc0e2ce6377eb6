//! Typed queries over the `bans` and `attacks` tables.

use rusqlite::types::Value;

use warden_core::types::{AttackRecord, BanRecord, Statistics, StoredAttack, Tally};

use crate::error::StoreError;

use super::{Row, StoreHandle};

fn text(value: &str) -> Value {
    Value::Text(value.to_owned())
}

fn page_bound(before: Option<i64>) -> Value {
    before.map_or(Value::Null, Value::Integer)
}

fn column<'a>(row: &'a Row, idx: usize) -> Result<&'a Value, StoreError> {
    row.get(idx)
        .ok_or_else(|| StoreError::Decode(format!("missing column {idx}")))
}

fn int_at(row: &Row, idx: usize) -> Result<i64, StoreError> {
    match column(row, idx)? {
        Value::Integer(v) => Ok(*v),
        // REAL times written by older tools are truncated to seconds
        Value::Real(v) => Ok(*v as i64),
        other => Err(StoreError::Decode(format!(
            "column {idx}: expected integer, got {other:?}"
        ))),
    }
}

fn text_at(row: &Row, idx: usize) -> Result<String, StoreError> {
    match column(row, idx)? {
        Value::Text(v) => Ok(v.clone()),
        other => Err(StoreError::Decode(format!(
            "column {idx}: expected text, got {other:?}"
        ))),
    }
}

fn opt_text_at(row: &Row, idx: usize) -> Result<Option<String>, StoreError> {
    match column(row, idx)? {
        Value::Null => Ok(None),
        _ => text_at(row, idx).map(Some),
    }
}

fn single_int(rows: &[Row]) -> Result<i64, StoreError> {
    let row = rows
        .first()
        .ok_or_else(|| StoreError::Decode("expected one row".to_owned()))?;
    int_at(row, 0)
}

impl StoreHandle {
    /// Whether a ban row exists for `address`.
    pub async fn is_banned(&self, address: &str) -> Result<bool, StoreError> {
        let rows = self
            .query(
                "SELECT COUNT(*) FROM bans WHERE address = ?1",
                vec![text(address)],
            )
            .await?;
        Ok(single_int(&rows)? > 0)
    }

    /// Records a ban. Not durable until commit.
    pub async fn insert_ban(&self, address: &str, time: i64) -> Result<(), StoreError> {
        self.execute(
            "INSERT INTO bans(time, address) VALUES (?1, ?2)",
            vec![Value::Integer(time), text(address)],
        )
        .await?;
        Ok(())
    }

    /// Removes every ban row for `address`; returns the number removed.
    pub async fn delete_ban(&self, address: &str) -> Result<usize, StoreError> {
        self.execute("DELETE FROM bans WHERE address = ?1", vec![text(address)])
            .await
    }

    /// Distinct banned addresses, oldest ban first.
    pub async fn banned_addresses(&self) -> Result<Vec<String>, StoreError> {
        let rows = self
            .query(
                "SELECT address FROM bans GROUP BY address ORDER BY MIN(id)",
                vec![],
            )
            .await?;
        rows.iter().map(|row| text_at(row, 0)).collect()
    }

    /// Distinct addresses whose ban is older than `cutoff`.
    pub async fn bans_older_than(&self, cutoff: i64) -> Result<Vec<String>, StoreError> {
        let rows = self
            .query(
                "SELECT address FROM bans WHERE time < ?1 GROUP BY address ORDER BY MIN(id)",
                vec![Value::Integer(cutoff)],
            )
            .await?;
        rows.iter().map(|row| text_at(row, 0)).collect()
    }

    /// Number of ban rows.
    pub async fn ban_count(&self) -> Result<i64, StoreError> {
        let rows = self.query("SELECT COUNT(*) FROM bans", vec![]).await?;
        single_int(&rows)
    }

    /// Whether the exact (address, time, profile) attack is already stored.
    pub async fn attack_exists(
        &self,
        address: &str,
        time: i64,
        profile: &str,
    ) -> Result<bool, StoreError> {
        let rows = self
            .query(
                "SELECT COUNT(*) FROM attacks WHERE address = ?1 AND time = ?2 AND profile = ?3",
                vec![text(address), Value::Integer(time), text(profile)],
            )
            .await?;
        Ok(single_int(&rows)? > 0)
    }

    /// Stores an attack with its captured variables serialized as JSON.
    pub async fn insert_attack(&self, attack: &AttackRecord) -> Result<(), StoreError> {
        let data = serde_json::to_string(&attack.vars)
            .map_err(|e| StoreError::Encode(format!("attack vars: {e}")))?;

        self.execute(
            "INSERT INTO attacks(time, address, profile, user, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            vec![
                Value::Integer(attack.timestamp),
                text(&attack.address),
                text(&attack.profile),
                attack.user.clone().map_or(Value::Null, Value::Text),
                Value::Text(data),
            ],
        )
        .await?;
        Ok(())
    }

    /// Newest attacks first; `before` is an exclusive upper bound on `id`.
    pub async fn list_attacks(
        &self,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<StoredAttack>, StoreError> {
        let rows = self
            .query(
                "SELECT id, time, address, profile, user, data FROM attacks \
                 WHERE (?1 IS NULL OR id < ?1) ORDER BY id DESC LIMIT ?2",
                vec![page_bound(before), Value::Integer(i64::from(limit))],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(StoredAttack {
                    id: int_at(row, 0)?,
                    time: int_at(row, 1)?,
                    address: text_at(row, 2)?,
                    profile: text_at(row, 3)?,
                    user: opt_text_at(row, 4)?,
                    data: text_at(row, 5)?,
                })
            })
            .collect()
    }

    /// Newest bans first, each with the number of stored attacks from its address.
    pub async fn list_bans(
        &self,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<BanRecord>, StoreError> {
        let rows = self
            .query(
                "SELECT b.id, b.time, b.address, \
                        (SELECT COUNT(*) FROM attacks a WHERE a.address = b.address) \
                 FROM bans b WHERE (?1 IS NULL OR b.id < ?1) ORDER BY b.id DESC LIMIT ?2",
                vec![page_bound(before), Value::Integer(i64::from(limit))],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(BanRecord {
                    id: int_at(row, 0)?,
                    time: int_at(row, 1)?,
                    address: text_at(row, 2)?,
                    attacks_count: Some(int_at(row, 3)?),
                })
            })
            .collect()
    }

    /// Totals, and counts newer than `midnight` (unix seconds).
    pub async fn statistics(&self, midnight: i64) -> Result<Statistics, StoreError> {
        let rows = self
            .query(
                "SELECT (SELECT COUNT(*) FROM attacks), \
                        (SELECT COUNT(*) FROM attacks WHERE time > ?1), \
                        (SELECT COUNT(*) FROM bans), \
                        (SELECT COUNT(*) FROM bans WHERE time > ?1)",
                vec![Value::Integer(midnight)],
            )
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| StoreError::Decode("expected one row".to_owned()))?;

        Ok(Statistics {
            attacks: Tally {
                total: int_at(row, 0)?,
                today: int_at(row, 1)?,
            },
            bans: Tally {
                total: int_at(row, 2)?,
                today: int_at(row, 3)?,
            },
        })
    }
}
