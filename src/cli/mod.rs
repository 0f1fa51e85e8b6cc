//! Subcommand bodies for the `match-integrity` binary.

pub mod check;
pub mod fix_counts;
pub mod repair;

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::config::{ConfigOverrides, IntegrityConfig};
use crate::util::db::Db;
use crate::util::env as env_util;

/// Resolve config and open the pool. The DSN is only ever logged redacted.
pub async fn connect(overrides: ConfigOverrides) -> Result<(IntegrityConfig, Db)> {
    let cfg = IntegrityConfig::resolve(overrides)?;
    info!(
        url = %env_util::redact_value("DATABASE_URL", &cfg.database_url),
        schema = cfg.schema.name().unwrap_or("<none>"),
        max_connections = cfg.max_connections,
        "integrity: connecting"
    );
    let db = Db::connect(&cfg.database_url, cfg.max_connections)
        .await
        .context("connecting to the match store")?;
    Ok((cfg, db))
}

/// Interactive gate before any mutation. Only a literal `yes` proceeds.
pub fn confirm(prompt: &str) -> Result<bool> {
    let stdin = io::stdin();
    confirm_from(prompt, &mut stdin.lock(), &mut io::stdout())
}

fn confirm_from(prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> Result<bool> {
    write!(output, "{prompt} Type 'yes' to continue: ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer).context("reading confirmation")?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_requires_literal_yes() {
        let mut out = Vec::new();
        assert!(confirm_from("Delete?", &mut "yes\n".as_bytes(), &mut out).unwrap());
        assert!(confirm_from("Delete?", &mut " YES \n".as_bytes(), &mut out).unwrap());
        assert!(!confirm_from("Delete?", &mut "y\n".as_bytes(), &mut out).unwrap());
        assert!(!confirm_from("Delete?", &mut "".as_bytes(), &mut out).unwrap());
        assert!(String::from_utf8(out).unwrap().starts_with("Delete? Type 'yes'"));
    }
}
