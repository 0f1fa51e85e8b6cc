//! Keyset-paginated scan over `(match_id, player_id)` candidates.
//!
//! Only one batch is ever held in memory. The cursor is the last key of the
//! previous batch rather than an OFFSET, so rows that appear or disappear
//! behind the cursor while a scan is running never shift later pages.

use serde::Serialize;
use sqlx::Row;
use tracing::debug;

use super::error::{storage, IntegrityError, Result};
use super::schema::{Schema, Table};
use crate::util::db::Db;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PlayerKey {
    pub match_id: i64,
    pub player_id: String,
}

/// Rows of interest: `predicate` is a SQL boolean expression over the alias `c`
/// bound to `table`. Both columns `match_id` and `player_id` must exist on it.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub table: Table,
    pub predicate: String,
}

pub struct BatchScanner<'a> {
    db: &'a Db,
    first_sql: String,
    next_sql: String,
    batch_size: usize,
    cursor: Option<PlayerKey>,
    exhausted: bool,
    batches: usize,
}

impl<'a> BatchScanner<'a> {
    pub fn new(db: &'a Db, schema: &Schema, query: &CandidateQuery, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(IntegrityError::precondition("batch size must be at least 1"));
        }
        let table = schema.table(query.table);
        let select = format!(
            "SELECT CAST(c.match_id AS BIGINT) AS match_id, c.player_id AS player_id \
             FROM {table} c WHERE ({predicate})",
            predicate = query.predicate
        );
        let first_sql = format!("{select} ORDER BY c.match_id, c.player_id LIMIT $1");
        let next_sql = format!(
            "{select} AND (c.match_id > $1 OR (c.match_id = $2 AND c.player_id > $3)) \
             ORDER BY c.match_id, c.player_id LIMIT $4"
        );
        Ok(Self {
            db,
            first_sql,
            next_sql,
            batch_size,
            cursor: None,
            exhausted: false,
            batches: 0,
        })
    }

    /// Restart the scan strictly after `key`.
    pub fn resume_after(mut self, key: PlayerKey) -> Self {
        self.cursor = Some(key);
        self.exhausted = false;
        self
    }

    pub fn batches_fetched(&self) -> usize {
        self.batches
    }

    /// Next batch, or `None` once a short batch has been seen.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<PlayerKey>>> {
        if self.exhausted {
            return Ok(None);
        }
        let limit = self.batch_size as i64;
        let rows = match &self.cursor {
            None => {
                sqlx::query(&self.first_sql)
                    .persistent(false)
                    .bind(limit)
                    .fetch_all(&self.db.pool)
                    .await
            }
            Some(key) => {
                sqlx::query(&self.next_sql)
                    .persistent(false)
                    .bind(key.match_id)
                    .bind(key.match_id)
                    .bind(key.player_id.as_str())
                    .bind(limit)
                    .fetch_all(&self.db.pool)
                    .await
            }
        }
        .map_err(storage("scanning candidate batch"))?;

        let batch = rows
            .iter()
            .map(|row| -> std::result::Result<PlayerKey, sqlx::Error> {
                Ok(PlayerKey {
                    match_id: row.try_get("match_id")?,
                    player_id: row.try_get("player_id")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(storage("decoding candidate batch"))?;

        self.batches += 1;
        if batch.len() < self.batch_size {
            self.exhausted = true;
        }
        if let Some(last) = batch.last() {
            self.cursor = Some(last.clone());
        }
        debug!(batch = self.batches, rows = batch.len(), "scanned candidate batch");

        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }
}
