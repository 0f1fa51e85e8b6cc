use futures::future::join_all;
use tracing::{info, instrument, warn};

use super::checks::StandardCheck;
use super::report::{DetectionMode, IntegrityReport, ReportBuilder};
use super::schema::Schema;
use crate::util::db::Db;

/// Match-level detection: the six aggregate checks, run concurrently.
///
/// The victim/nemesis checks here only see matches where *every* player with
/// kills (deaths) lacks opponent rows. Per-player gaps need [`ThoroughDetector`].
///
/// [`ThoroughDetector`]: super::thorough::ThoroughDetector
pub struct StandardDetector<'a> {
    db: &'a Db,
    schema: &'a Schema,
}

impl<'a> StandardDetector<'a> {
    pub fn new(db: &'a Db, schema: &'a Schema) -> Self {
        Self { db, schema }
    }

    #[instrument(skip_all)]
    pub async fn detect(&self) -> IntegrityReport {
        let mut builder = ReportBuilder::new(DetectionMode::Standard);
        self.run_checks(&mut builder).await;
        builder.finish()
    }

    /// A failing check is recorded on the builder and does not stop the others.
    pub(crate) async fn run_checks(&self, builder: &mut ReportBuilder) {
        let results = join_all(
            StandardCheck::ALL
                .into_iter()
                .map(|check| async move { (check, check.run(self.db, self.schema).await) }),
        )
        .await;

        for (check, result) in results {
            match result {
                Ok(findings) => {
                    info!(check = %check.category(), matches = findings.len(), "standard check done");
                    builder.record(check.category(), findings);
                }
                Err(err) => {
                    warn!(check = %check.category(), error = %err, "standard check failed; continuing");
                    builder.record_failure(check.category(), err);
                }
            }
        }
    }
}
