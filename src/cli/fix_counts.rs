use std::io::{self, Write};

use anyhow::Result;

use crate::config::{ConfigOverrides, IntegrityConfig};
use crate::integrity::{fix_player_counts, PlayerCountFix, RepairConfirmation, RepairOptions};
use crate::util::db::Db;

#[derive(Debug, Clone, Default)]
pub struct FixCountsConfig {
    pub overrides: ConfigOverrides,
    pub execute: bool,
    pub assume_yes: bool,
}

pub async fn run(cfg: FixCountsConfig) -> Result<PlayerCountFix> {
    let (resolved, db) = super::connect(cfg.overrides.clone()).await?;
    let result = run_on(&db, &resolved, &cfg, &mut io::stdout()).await;
    db.close().await;
    result
}

pub async fn run_on(
    db: &Db,
    resolved: &IntegrityConfig,
    cfg: &FixCountsConfig,
    out: &mut impl Write,
) -> Result<PlayerCountFix> {
    let preview = fix_player_counts(db, &resolved.schema, &RepairOptions::preview()).await?;
    writeln!(out, "{} match(es) have a stale player_count.", preview.matches)?;
    if !cfg.execute || preview.matches == 0 {
        return Ok(preview);
    }

    if !cfg.assume_yes && !super::confirm("Rewrite player_count from player_match_stats?")? {
        writeln!(out, "Aborted; nothing was updated.")?;
        return Ok(preview);
    }

    let options = RepairOptions::execute(RepairConfirmation::ingestion_quiesced());
    let fixed = fix_player_counts(db, &resolved.schema, &options).await?;
    writeln!(out, "Updated player_count on {} match(es).", fixed.matches)?;
    Ok(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::testing::{fixture_db, player, MatchSeed};
    use crate::integrity::Schema;

    fn resolved(schema: Schema) -> IntegrityConfig {
        IntegrityConfig {
            database_url: "sqlite::memory:".into(),
            schema,
            batch_size: 10,
            max_connections: 1,
        }
    }

    #[tokio::test]
    async fn test_preview_then_execute() {
        let (db, schema) = fixture_db().await;
        MatchSeed::complete(1, vec![player("a", 1, 1), player("b", 0, 0)])
            .player_count(Some(7))
            .write(&db)
            .await;
        let resolved = resolved(schema);

        let mut out = Vec::new();
        let preview = run_on(&db, &resolved, &FixCountsConfig::default(), &mut out).await.unwrap();
        assert!(preview.dry_run);
        assert_eq!(preview.matches, 1);
        assert!(String::from_utf8(out).unwrap().contains("1 match(es) have a stale player_count."));

        let cfg = FixCountsConfig {
            execute: true,
            assume_yes: true,
            ..Default::default()
        };
        let mut out = Vec::new();
        let fixed = run_on(&db, &resolved, &cfg, &mut out).await.unwrap();
        assert!(!fixed.dry_run);
        assert_eq!(fixed.matches, 1);
        assert!(String::from_utf8(out).unwrap().contains("Updated player_count on 1 match(es)."));

        let mut out = Vec::new();
        let after = run_on(&db, &resolved, &cfg, &mut out).await.unwrap();
        assert!(after.dry_run);
        assert_eq!(after.matches, 0);
    }
}
