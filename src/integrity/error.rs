use thiserror::Error;

use super::repair::TableCount;
use super::schema::Table;

pub type Result<T> = std::result::Result<T, IntegrityError>;

#[derive(Debug, Error)]
pub enum IntegrityError {
    /// A query or delete against the store failed. Never swallowed.
    #[error("storage error while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Usage error; the operation was refused before touching the store.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    PartialRepair(#[from] PartialRepairError),
}

impl IntegrityError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }
}

/// `.map_err(storage("counting rows"))`
pub(crate) fn storage(context: impl Into<String>) -> impl FnOnce(sqlx::Error) -> IntegrityError {
    let context = context.into();
    move |source| IntegrityError::Storage { context, source }
}

/// A repair that stopped partway through the deletion sequence.
///
/// Tables in `completed` are already clean for every id in `match_ids`;
/// `failed_table` and everything in `remaining` still hold rows. Re-running the
/// repair with the same ids only touches what is left.
#[derive(Debug, Error)]
#[error(
    "repair of {} match id(s) failed at {failed_table} after {} table(s) were cleaned: {source}",
    .match_ids.len(),
    .completed.len()
)]
pub struct PartialRepairError {
    pub completed: Vec<TableCount>,
    pub failed_table: Table,
    pub remaining: Vec<Table>,
    pub match_ids: Vec<i64>,
    #[source]
    pub source: sqlx::Error,
}
