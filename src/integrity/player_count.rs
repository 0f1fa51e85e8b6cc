//! In-place correction of `match_history.player_count`.
//!
//! Unlike a repair this keeps the footprint: it only rewrites the recorded
//! count to the number of distinct players in `player_match_stats`. Matches
//! with no player stats are left alone; those need a full repair.

use sqlx::Row;
use tracing::{info, instrument};

use super::error::{storage, IntegrityError, Result};
use super::repair::RepairOptions;
use super::schema::{Schema, Table};
use crate::util::db::Db;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PlayerCountFix {
    pub dry_run: bool,
    /// Matches updated, or that would be on a dry run.
    pub matches: u64,
}

fn stale_count_predicate(pms: &str) -> String {
    format!(
        "EXISTS (SELECT 1 FROM {pms} p WHERE p.match_id = mh.match_id)
         AND (mh.player_count IS NULL
              OR mh.player_count <> (
                  SELECT COUNT(DISTINCT p.player_id) FROM {pms} p WHERE p.match_id = mh.match_id
              ))"
    )
}

/// Counts (dry run) or rewrites every stale `player_count`. Executing takes
/// the same confirmation as a repair.
#[instrument(skip_all, fields(dry_run = options.dry_run))]
pub async fn fix_player_counts(db: &Db, schema: &Schema, options: &RepairOptions) -> Result<PlayerCountFix> {
    let mh = schema.table(Table::MatchHistory);
    let pms = schema.table(Table::PlayerMatchStats);
    let predicate = stale_count_predicate(&pms);

    let matches = if options.dry_run {
        let sql = format!("SELECT CAST(COUNT(*) AS BIGINT) AS n FROM {mh} mh WHERE {predicate}");
        let row = sqlx::query(&sql)
            .persistent(false)
            .fetch_one(&db.pool)
            .await
            .map_err(storage("counting stale player counts"))?;
        let n: i64 = row
            .try_get("n")
            .map_err(storage("decoding stale player count total"))?;
        n.max(0) as u64
    } else {
        if options.confirmation.is_none() {
            return Err(IntegrityError::precondition(
                "updating player counts requires confirmation that ingestion is quiesced",
            ));
        }
        let sql = format!(
            "UPDATE {mh} AS mh
             SET player_count = (
                 SELECT COUNT(DISTINCT p.player_id) FROM {pms} p WHERE p.match_id = mh.match_id
             )
             WHERE {predicate}"
        );
        sqlx::query(&sql)
            .persistent(false)
            .execute(&db.pool)
            .await
            .map_err(storage("updating player counts"))?
            .rows_affected()
    };

    info!(matches, dry_run = options.dry_run, "player count fix");
    Ok(PlayerCountFix {
        dry_run: options.dry_run,
        matches,
    })
}
