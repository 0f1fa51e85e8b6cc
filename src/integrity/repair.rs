//! Whole-footprint removal for flagged matches.
//!
//! The engine only deletes. Re-populating the tables is left to ingestion,
//! which the caller re-triggers for the ids in [`RepairOutcome::match_ids`].

use std::collections::BTreeSet;

use serde::Serialize;
use sqlx::Row;
use tracing::{info, instrument, warn};

use super::error::{IntegrityError, PartialRepairError, Result};
use super::schema::{deletion_order, Schema, Table};
use crate::util::db::Db;

/// Ids per `IN (...)` list. Keeps every statement well under the bind
/// parameter limits of both Postgres and SQLite.
const ID_CHUNK: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: Table,
    pub rows: u64,
}

/// Proof that ingestion is not writing the ids being repaired.
///
/// Repair and ingestion are not otherwise serialized: a delete racing an
/// in-flight insert can leave a fresh partial footprint behind.
#[derive(Debug, Clone, Copy)]
pub struct RepairConfirmation {
    _private: (),
}

impl RepairConfirmation {
    /// The caller asserts that ingestion is paused for the affected ids.
    pub fn ingestion_quiesced() -> Self {
        Self { _private: () }
    }
}

#[derive(Debug, Clone)]
pub struct RepairOptions {
    pub dry_run: bool,
    pub confirmation: Option<RepairConfirmation>,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self::preview()
    }
}

impl RepairOptions {
    pub fn preview() -> Self {
        Self {
            dry_run: true,
            confirmation: None,
        }
    }

    pub fn execute(confirmation: RepairConfirmation) -> Self {
        Self {
            dry_run: false,
            confirmation: Some(confirmation),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub dry_run: bool,
    pub match_ids: BTreeSet<i64>,
    /// In deletion order. Counts are rows that would be deleted on a dry run.
    pub tables: Vec<TableCount>,
}

impl RepairOutcome {
    pub fn total(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn count_for(&self, table: Table) -> u64 {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| t.rows)
            .unwrap_or(0)
    }
}

pub struct RepairEngine<'a> {
    db: &'a Db,
    schema: &'a Schema,
}

impl<'a> RepairEngine<'a> {
    pub fn new(db: &'a Db, schema: &'a Schema) -> Self {
        Self { db, schema }
    }

    /// Remove (or count, on a dry run) every row of every footprint table for
    /// `match_ids`, children before parents.
    ///
    /// Each table is its own statement. A failure partway through returns
    /// [`PartialRepairError`]; calling again with the same ids finishes the job.
    #[instrument(skip_all, fields(matches = match_ids.len(), dry_run = options.dry_run))]
    pub async fn repair(&self, match_ids: &BTreeSet<i64>, options: &RepairOptions) -> Result<RepairOutcome> {
        if match_ids.is_empty() {
            return Err(IntegrityError::precondition("no match ids to repair"));
        }
        if !options.dry_run && options.confirmation.is_none() {
            return Err(IntegrityError::precondition(
                "executing a repair requires confirmation that ingestion is quiesced",
            ));
        }

        let ids: Vec<i64> = match_ids.iter().copied().collect();
        let order = deletion_order();
        let mut tables = Vec::with_capacity(order.len());

        for (idx, table) in order.iter().copied().enumerate() {
            let result = if options.dry_run {
                self.count_rows(table, &ids).await
            } else {
                self.delete_rows(table, &ids).await
            };
            match result {
                Ok(rows) => {
                    info!(%table, rows, dry_run = options.dry_run, "repair step");
                    tables.push(TableCount { table, rows });
                }
                Err(source) if options.dry_run => {
                    return Err(IntegrityError::Storage {
                        context: format!("counting rows in {table}"),
                        source,
                    });
                }
                Err(source) => {
                    warn!(%table, completed = tables.len(), error = %source, "repair stopped partway");
                    return Err(PartialRepairError {
                        completed: tables,
                        failed_table: table,
                        remaining: order[idx + 1..].to_vec(),
                        match_ids: ids,
                        source,
                    }
                    .into());
                }
            }
        }

        let outcome = RepairOutcome {
            dry_run: options.dry_run,
            match_ids: match_ids.clone(),
            tables,
        };
        info!(total = outcome.total(), dry_run = outcome.dry_run, "repair finished");
        Ok(outcome)
    }

    async fn count_rows(&self, table: Table, ids: &[i64]) -> std::result::Result<u64, sqlx::Error> {
        let name = self.schema.table(table);
        let mut total = 0u64;
        for chunk in ids.chunks(ID_CHUNK) {
            let sql = format!(
                "SELECT CAST(COUNT(*) AS BIGINT) AS n FROM {name} WHERE match_id IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql).persistent(false);
            for id in chunk {
                query = query.bind(*id);
            }
            let row = query.fetch_one(&self.db.pool).await?;
            let n: i64 = row.try_get("n")?;
            total += n.max(0) as u64;
        }
        Ok(total)
    }

    async fn delete_rows(&self, table: Table, ids: &[i64]) -> std::result::Result<u64, sqlx::Error> {
        let name = self.schema.table(table);
        let mut total = 0u64;
        for chunk in ids.chunks(ID_CHUNK) {
            let sql = format!(
                "DELETE FROM {name} WHERE match_id IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql).persistent(false);
            for id in chunk {
                query = query.bind(*id);
            }
            total += query.execute(&self.db.pool).await?.rows_affected();
        }
        Ok(total)
    }
}

/// `$1, $2, ..., $n`
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("${i}")).collect::<Vec<_>>().join(", ")
}
