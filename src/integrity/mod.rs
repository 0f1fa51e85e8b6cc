//! Detection and repair of partially-written match footprints.
//!
//! Ingestion writes one match across six tables without a transaction, so an
//! interrupted run can leave any prefix of those writes behind. Detectors
//! produce an [`IntegrityReport`]; [`RepairEngine`] removes the affected
//! footprints so ingestion can write them again.

pub mod checks;
pub mod error;
pub mod player_count;
pub mod repair;
pub mod report;
pub mod scan;
pub mod schema;
pub mod standard;
pub mod thorough;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{IntegrityError, PartialRepairError, Result};
pub use player_count::{fix_player_counts, PlayerCountFix};
pub use repair::{RepairConfirmation, RepairEngine, RepairOptions, RepairOutcome, TableCount};
pub use report::{DetectionMode, IntegrityIssue, IntegrityReport, IssueCategory};
pub use scan::{BatchScanner, DEFAULT_BATCH_SIZE};
pub use schema::{Schema, Table};
pub use standard::StandardDetector;
pub use thorough::ThoroughDetector;

use crate::util::db::Db;

#[derive(Debug, Clone, Copy)]
pub struct DetectOptions {
    pub mode: DetectionMode,
    pub batch_size: usize,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            mode: DetectionMode::Standard,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Run the detector selected by `options.mode`.
///
/// Individual check failures end up in the report's failed checks; only an
/// invalid batch size is an error here.
pub async fn validate(db: &Db, schema: &Schema, options: DetectOptions) -> Result<IntegrityReport> {
    match options.mode {
        DetectionMode::Standard => Ok(StandardDetector::new(db, schema).detect().await),
        DetectionMode::Thorough => Ok(ThoroughDetector::new(db, schema, options.batch_size)?
            .detect()
            .await),
    }
}
