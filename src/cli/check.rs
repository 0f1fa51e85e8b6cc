use anyhow::Result;

use crate::config::{ConfigOverrides, IntegrityConfig};
use crate::integrity::{validate, DetectOptions, DetectionMode, IntegrityReport};
use crate::util::db::Db;

/// Every check ran and nothing was flagged.
pub const EXIT_CLEAN: u8 = 0;
pub const EXIT_ISSUES: u8 = 1;
/// At least one check could not run, so the store was not fully verified.
pub const EXIT_INCOMPLETE: u8 = 2;

#[derive(Debug, Clone, Default)]
pub struct CheckConfig {
    pub overrides: ConfigOverrides,
    pub thorough: bool,
    pub verbose: bool,
    /// Emit the report as JSON instead of the text summary.
    pub json: bool,
}

/// Runs detection and prints the report. Returns the report so the binary can
/// pick its exit code with [`exit_status`].
pub async fn run(cfg: CheckConfig) -> Result<IntegrityReport> {
    let (resolved, db) = super::connect(cfg.overrides.clone()).await?;
    let result = detect(&db, &resolved, cfg.thorough).await;
    db.close().await;
    let report = result?;

    print!("{}", render(&report, cfg.verbose, cfg.json)?);
    Ok(report)
}

pub async fn detect(db: &Db, resolved: &IntegrityConfig, thorough: bool) -> Result<IntegrityReport> {
    let options = DetectOptions {
        mode: if thorough {
            DetectionMode::Thorough
        } else {
            DetectionMode::Standard
        },
        batch_size: resolved.batch_size,
    };
    Ok(validate(db, &resolved.schema, options).await?)
}

/// A report with failed checks is never treated as clean, even when the
/// checks that did run found nothing.
pub fn exit_status(report: &IntegrityReport) -> u8 {
    if report.is_partial() {
        EXIT_INCOMPLETE
    } else if report.has_issues() {
        EXIT_ISSUES
    } else {
        EXIT_CLEAN
    }
}

pub fn render(report: &IntegrityReport, verbose: bool, json: bool) -> Result<String> {
    if json {
        let mut out = serde_json::to_string_pretty(report)?;
        out.push('\n');
        return Ok(out);
    }
    let mut out = report.to_string();
    if verbose && report.has_issues() {
        out.push('\n');
        out.push_str(&report.verbose_detail());
    }
    if report.has_issues() && report.mode == DetectionMode::Standard {
        out.push_str("\nStandard mode only flags matches where every player lacks victim/nemesis rows.\n");
        out.push_str("Run with --thorough to find individual players with gaps.\n");
    }
    Ok(out)
}
