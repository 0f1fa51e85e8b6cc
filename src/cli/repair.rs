use std::collections::BTreeSet;
use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{ConfigOverrides, IntegrityConfig};
use crate::integrity::{
    validate, DetectOptions, DetectionMode, IntegrityError, RepairConfirmation, RepairEngine,
    RepairOptions, RepairOutcome,
};
use crate::util::db::Db;

#[derive(Debug, Clone, Default)]
pub struct RepairConfig {
    pub overrides: ConfigOverrides,
    /// Detect with the per-player checks as well.
    pub thorough: bool,
    /// Repair exactly these ids and skip detection.
    pub match_ids: Option<Vec<i64>>,
    /// Actually delete. Without it the command only previews.
    pub execute: bool,
    /// Skip the interactive prompt.
    pub assume_yes: bool,
}

pub async fn run(cfg: RepairConfig) -> Result<Option<RepairOutcome>> {
    let (resolved, db) = super::connect(cfg.overrides.clone()).await?;
    let result = run_on(&db, &resolved, &cfg, &mut io::stdout()).await;
    db.close().await;
    result
}

/// Detect (unless ids were given), preview, then delete once confirmed.
/// Everything meant for the operator goes to `out`.
pub async fn run_on(
    db: &Db,
    resolved: &IntegrityConfig,
    cfg: &RepairConfig,
    out: &mut impl Write,
) -> Result<Option<RepairOutcome>> {
    let ids: BTreeSet<i64> = match &cfg.match_ids {
        Some(ids) => ids.iter().copied().collect(),
        None => {
            let mode = if cfg.thorough {
                DetectionMode::Thorough
            } else {
                DetectionMode::Standard
            };
            let report = validate(
                db,
                &resolved.schema,
                DetectOptions {
                    mode,
                    batch_size: resolved.batch_size,
                },
            )
            .await?;
            write!(out, "{report}")?;
            if report.is_partial() {
                warn!(failed = report.failed_checks().len(), "repairing from a partial report");
            }
            report.affected_match_ids()
        }
    };

    if ids.is_empty() {
        writeln!(out, "\nNothing to repair.")?;
        return Ok(None);
    }

    let engine = RepairEngine::new(db, &resolved.schema);
    let preview = engine.repair(&ids, &RepairOptions::preview()).await?;
    writeln!(out, "\n{}", render_outcome(&preview))?;

    if !cfg.execute {
        writeln!(out, "Dry run only. Re-run with --execute to delete these rows.")?;
        return Ok(Some(preview));
    }

    if !cfg.assume_yes {
        let prompt = format!(
            "Delete {} rows for {} match(es)? Make sure ingestion is paused for these ids.",
            preview.total(),
            ids.len()
        );
        if !super::confirm(&prompt)? {
            writeln!(out, "Aborted; nothing was deleted.")?;
            return Ok(None);
        }
    }

    let options = RepairOptions::execute(RepairConfirmation::ingestion_quiesced());
    let outcome = match engine.repair(&ids, &options).await {
        Ok(outcome) => outcome,
        Err(IntegrityError::PartialRepair(partial)) => {
            let done: Vec<String> = partial
                .completed
                .iter()
                .map(|t| format!("{}={}", t.table, t.rows))
                .collect();
            writeln!(out, "Repair stopped at {}. Cleaned: [{}]", partial.failed_table, done.join(", "))?;
            writeln!(out, "Re-run the same command to finish; completed tables are not touched twice.")?;
            return Err(IntegrityError::PartialRepair(partial)).context("repair incomplete");
        }
        Err(err) => return Err(err.into()),
    };

    writeln!(out, "{}", render_outcome(&outcome))?;
    let reingest: Vec<i64> = outcome.match_ids.iter().copied().collect();
    writeln!(out, "Matches to re-ingest: {reingest:?}")?;
    info!(matches = reingest.len(), rows = outcome.total(), "repair complete");
    Ok(Some(outcome))
}

pub fn render_outcome(outcome: &RepairOutcome) -> String {
    let verb = if outcome.dry_run { "Would delete" } else { "Deleted" };
    let mut out = format!(
        "{verb} {} rows across {} match(es):\n",
        outcome.total(),
        outcome.match_ids.len()
    );
    for t in &outcome.tables {
        out.push_str(&format!("  {:<20} {}\n", t.table.name(), t.rows));
    }
    out
}
