//! Named match-level checks. Each one is a single indexed aggregate or
//! `NOT EXISTS` query that returns the matches it flags; none of them depends
//! on another, so they can run in any order or concurrently.

use std::collections::BTreeMap;

use sqlx::any::AnyRow;
use sqlx::Row;
use tracing::debug;

use super::error::{storage, IntegrityError, Result};
use super::report::{IssueCategory, MatchFinding};
use super::scan::CandidateQuery;
use super::schema::{Schema, Table};
use crate::util::db::Db;

/// One of the six standard-mode checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardCheck(StandardKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StandardKind {
    NoPlayerStats,
    BadPlayerCount,
    MissingKillStats,
    MissingDeathStats,
    AllMissingVictimStats,
    AllMissingNemesisStats,
}

enum RowShape {
    MatchOnly,
    PlayerCount,
    PerPlayer,
}

impl StandardCheck {
    pub const NO_PLAYER_STATS: Self = Self(StandardKind::NoPlayerStats);
    pub const BAD_PLAYER_COUNT: Self = Self(StandardKind::BadPlayerCount);
    pub const MISSING_KILL_STATS: Self = Self(StandardKind::MissingKillStats);
    pub const MISSING_DEATH_STATS: Self = Self(StandardKind::MissingDeathStats);
    pub const ALL_MISSING_VICTIM_STATS: Self = Self(StandardKind::AllMissingVictimStats);
    pub const ALL_MISSING_NEMESIS_STATS: Self = Self(StandardKind::AllMissingNemesisStats);

    pub const ALL: [StandardCheck; 6] = [
        Self::NO_PLAYER_STATS,
        Self::BAD_PLAYER_COUNT,
        Self::MISSING_KILL_STATS,
        Self::MISSING_DEATH_STATS,
        Self::ALL_MISSING_VICTIM_STATS,
        Self::ALL_MISSING_NEMESIS_STATS,
    ];

    pub fn for_category(category: IssueCategory) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.category() == category)
    }

    pub fn category(self) -> IssueCategory {
        match self.0 {
            StandardKind::NoPlayerStats => IssueCategory::NoPlayerStats,
            StandardKind::BadPlayerCount => IssueCategory::BadPlayerCount,
            StandardKind::MissingKillStats => IssueCategory::MissingKillStats,
            StandardKind::MissingDeathStats => IssueCategory::MissingDeathStats,
            StandardKind::AllMissingVictimStats => IssueCategory::AllMissingVictimStats,
            StandardKind::AllMissingNemesisStats => IssueCategory::AllMissingNemesisStats,
        }
    }

    fn shape(self) -> RowShape {
        match self.0 {
            StandardKind::NoPlayerStats => RowShape::MatchOnly,
            StandardKind::BadPlayerCount => RowShape::PlayerCount,
            _ => RowShape::PerPlayer,
        }
    }

    pub fn sql(self, schema: &Schema) -> String {
        let mh = schema.table(Table::MatchHistory);
        let pms = schema.table(Table::PlayerMatchStats);
        match self.0 {
            StandardKind::NoPlayerStats => format!(
                "SELECT CAST(mh.match_id AS BIGINT) AS match_id
                 FROM {mh} mh
                 WHERE NOT EXISTS (
                     SELECT 1 FROM {pms} pms WHERE pms.match_id = mh.match_id
                 )
                 ORDER BY mh.match_id"
            ),
            // Matches without any player stats are NoPlayerStats only.
            StandardKind::BadPlayerCount => format!(
                "SELECT CAST(mh.match_id AS BIGINT) AS match_id,
                        CAST(mh.player_count AS BIGINT) AS recorded_count,
                        CAST(s.actual_count AS BIGINT) AS actual_count
                 FROM {mh} mh
                 JOIN (
                     SELECT match_id, COUNT(DISTINCT player_id) AS actual_count
                     FROM {pms}
                     GROUP BY match_id
                 ) s ON s.match_id = mh.match_id
                 WHERE mh.player_count IS NULL
                    OR mh.player_count = 0
                    OR mh.player_count <> s.actual_count
                 ORDER BY mh.match_id"
            ),
            StandardKind::MissingKillStats => {
                missing_row_sql(&pms, &schema.table(Table::PlayerKillStats))
            }
            StandardKind::MissingDeathStats => {
                missing_row_sql(&pms, &schema.table(Table::PlayerDeathStats))
            }
            StandardKind::AllMissingVictimStats => all_missing_opponent_sql(
                &pms,
                &schema.table(Table::PlayerVictim),
                "total_kills",
            ),
            StandardKind::AllMissingNemesisStats => all_missing_opponent_sql(
                &pms,
                &schema.table(Table::PlayerNemesis),
                "total_deaths",
            ),
        }
    }

    pub async fn run(self, db: &Db, schema: &Schema) -> Result<Vec<MatchFinding>> {
        let sql = self.sql(schema);
        let rows = sqlx::query(&sql)
            .persistent(false)
            .fetch_all(&db.pool)
            .await
            .map_err(storage(format!("running check {}", self.category())))?;

        let decoded: std::result::Result<Vec<MatchFinding>, sqlx::Error> = match self.shape() {
            RowShape::MatchOnly => rows
                .iter()
                .map(|row| row.try_get("match_id").map(MatchFinding::match_only))
                .collect(),
            RowShape::PlayerCount => rows
                .iter()
                .map(|row| -> std::result::Result<MatchFinding, sqlx::Error> {
                    Ok(MatchFinding {
                        match_id: row.try_get("match_id")?,
                        player_ids: Vec::new(),
                        recorded_count: row.try_get("recorded_count")?,
                        actual_count: row.try_get("actual_count")?,
                    })
                })
                .collect(),
            RowShape::PerPlayer => group_by_match(&rows),
        };
        let findings = decoded.map_err(storage(format!("decoding check {}", self.category())))?;

        debug!(check = %self.category(), matches = findings.len(), "check finished");
        Ok(findings)
    }
}

/// Players present in `player_match_stats` with no row in `target`.
fn missing_row_sql(pms: &str, target: &str) -> String {
    format!(
        "SELECT CAST(pms.match_id AS BIGINT) AS match_id, pms.player_id AS player_id
         FROM {pms} pms
         WHERE NOT EXISTS (
             SELECT 1 FROM {target} t
             WHERE t.match_id = pms.match_id AND t.player_id = pms.player_id
         )
         ORDER BY pms.match_id, pms.player_id"
    )
}

/// Every player with a non-zero `total_column` in matches where none of those
/// players has a single row in `target`. Catches whole-table omissions only: a
/// match where 9 of 10 killers have victim rows is not flagged here.
fn all_missing_opponent_sql(pms: &str, target: &str, total_column: &str) -> String {
    format!(
        "SELECT CAST(p.match_id AS BIGINT) AS match_id, p.player_id AS player_id
         FROM {pms} p
         WHERE COALESCE(p.{total_column}, 0) > 0
           AND NOT EXISTS (
               SELECT 1
               FROM {target} t
               JOIN {pms} k ON k.match_id = t.match_id AND k.player_id = t.player_id
               WHERE t.match_id = p.match_id
                 AND COALESCE(k.{total_column}, 0) > 0
           )
         ORDER BY p.match_id, p.player_id"
    )
}

fn group_by_match(rows: &[AnyRow]) -> std::result::Result<Vec<MatchFinding>, sqlx::Error> {
    let mut by_match: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    for row in rows {
        let match_id: i64 = row.try_get("match_id")?;
        let player_id: String = row.try_get("player_id")?;
        by_match.entry(match_id).or_default().push(player_id);
    }
    Ok(by_match
        .into_iter()
        .map(|(match_id, player_ids)| MatchFinding {
            match_id,
            player_ids,
            recorded_count: None,
            actual_count: None,
        })
        .collect())
}

/// Per-player opponent checks used by thorough mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerCheck(IssueCategory);

impl PlayerCheck {
    pub const MISSING_VICTIM_STATS: Self = Self(IssueCategory::PlayerMissingVictimStats);
    pub const MISSING_NEMESIS_STATS: Self = Self(IssueCategory::PlayerMissingNemesisStats);

    pub const ALL: [PlayerCheck; 2] = [Self::MISSING_VICTIM_STATS, Self::MISSING_NEMESIS_STATS];

    pub fn for_category(category: IssueCategory) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.0 == category)
    }

    pub fn category(self) -> IssueCategory {
        self.0
    }

    /// Candidates: players known to have kills (deaths) with no victim
    /// (nemesis) row for the same match.
    pub fn candidates(self, schema: &Schema) -> Result<CandidateQuery> {
        let (target, total_column) = match self.0 {
            IssueCategory::PlayerMissingVictimStats => (Table::PlayerVictim, "total_kills"),
            IssueCategory::PlayerMissingNemesisStats => (Table::PlayerNemesis, "total_deaths"),
            other => {
                return Err(IntegrityError::precondition(format!(
                    "{other} is not a per-player check"
                )))
            }
        };
        let target = schema.table(target);
        Ok(CandidateQuery {
            table: Table::PlayerMatchStats,
            predicate: format!(
                "COALESCE(c.{total_column}, 0) > 0 AND NOT EXISTS (
                     SELECT 1 FROM {target} t
                     WHERE t.match_id = c.match_id AND t.player_id = c.player_id
                 )"
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::testing::{exec, fixture_db, player, MatchSeed};

    fn ids(findings: &[MatchFinding]) -> Vec<i64> {
        findings.iter().map(|f| f.match_id).collect()
    }

    #[tokio::test]
    async fn test_complete_match_passes_every_check() {
        let (db, schema) = fixture_db().await;
        MatchSeed::complete(1, vec![player("a", 3, 1), player("b", 0, 2), player("c", 0, 0)])
            .write(&db)
            .await;

        for check in StandardCheck::ALL {
            let findings = check.run(&db, &schema).await.unwrap();
            assert!(findings.is_empty(), "{} flagged a complete match", check.category());
        }
    }

    #[tokio::test]
    async fn test_no_player_stats() {
        let (db, schema) = fixture_db().await;
        MatchSeed::complete(10, vec![player("a", 1, 1)])
            .without_player_stats()
            .write(&db)
            .await;
        MatchSeed::complete(11, vec![player("a", 1, 1)]).write(&db).await;

        let findings = StandardCheck::NO_PLAYER_STATS.run(&db, &schema).await.unwrap();
        assert_eq!(ids(&findings), vec![10]);
        // no stats at all is not also a player-count problem
        assert!(StandardCheck::BAD_PLAYER_COUNT.run(&db, &schema).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_player_count_null_zero_and_mismatch() {
        let (db, schema) = fixture_db().await;
        let two = || vec![player("a", 1, 1), player("b", 1, 1)];
        MatchSeed::complete(1, two()).player_count(None).write(&db).await;
        MatchSeed::complete(2, two()).player_count(Some(0)).write(&db).await;
        MatchSeed::complete(3, two()).player_count(Some(3)).write(&db).await;
        MatchSeed::complete(4, two()).write(&db).await;

        let findings = StandardCheck::BAD_PLAYER_COUNT.run(&db, &schema).await.unwrap();
        assert_eq!(ids(&findings), vec![1, 2, 3]);
        assert_eq!(findings[0].recorded_count, None);
        assert_eq!(findings[1].recorded_count, Some(0));
        assert_eq!(findings[2].recorded_count, Some(3));
        assert!(findings.iter().all(|f| f.actual_count == Some(2)));
    }

    #[tokio::test]
    async fn test_missing_kill_and_death_stats_group_players() {
        let (db, schema) = fixture_db().await;
        MatchSeed::complete(500, vec![player("b", 1, 0), player("a", 2, 1)])
            .without_kill_stats()
            .write(&db)
            .await;
        MatchSeed::complete(501, vec![player("a", 1, 1)])
            .without_death_stats()
            .write(&db)
            .await;

        let kills = StandardCheck::MISSING_KILL_STATS.run(&db, &schema).await.unwrap();
        assert_eq!(kills.len(), 1);
        assert_eq!(kills[0].match_id, 500);
        assert_eq!(kills[0].player_ids, vec!["a".to_string(), "b".to_string()]);

        let deaths = StandardCheck::MISSING_DEATH_STATS.run(&db, &schema).await.unwrap();
        assert_eq!(ids(&deaths), vec![501]);
    }

    #[tokio::test]
    async fn test_all_missing_victims_only_flags_whole_omission() {
        let (db, schema) = fixture_db().await;
        // every killer lacks victims
        MatchSeed::complete(1, vec![player("a", 2, 1), player("b", 1, 1), player("c", 0, 1)])
            .without_victims()
            .write(&db)
            .await;
        // one of two killers lacks victims: a per-player gap, invisible here
        MatchSeed::complete(2, vec![player("a", 2, 1), player("b", 1, 1)])
            .skip_victims_for("b")
            .write(&db)
            .await;
        // nobody scored a kill, so no victim rows are expected
        MatchSeed::complete(3, vec![player("a", 0, 1), player("b", 0, 1)])
            .without_victims()
            .write(&db)
            .await;

        let findings = StandardCheck::ALL_MISSING_VICTIM_STATS.run(&db, &schema).await.unwrap();
        assert_eq!(ids(&findings), vec![1]);
        assert_eq!(findings[0].player_ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_all_missing_nemesis_symmetric() {
        let (db, schema) = fixture_db().await;
        MatchSeed::complete(7, vec![player("a", 1, 3), player("b", 1, 0)])
            .without_nemeses()
            .write(&db)
            .await;

        let findings = StandardCheck::ALL_MISSING_NEMESIS_STATS.run(&db, &schema).await.unwrap();
        assert_eq!(ids(&findings), vec![7]);
        assert_eq!(findings[0].player_ids, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_check_against_missing_table_is_storage_error() {
        let (db, schema) = fixture_db().await;
        exec(&db, "DROP TABLE player_nemesis").await;
        let result = StandardCheck::ALL_MISSING_NEMESIS_STATS.run(&db, &schema).await;
        assert!(matches!(result, Err(IntegrityError::Storage { .. })));
    }

    #[test]
    fn test_sql_uses_schema_qualified_tables() {
        let schema = Schema::default();
        let sql = StandardCheck::MISSING_KILL_STATS.sql(&schema);
        assert!(sql.contains("pathfinder_stats.player_match_stats pms"));
        assert!(sql.contains("pathfinder_stats.player_kill_stats t"));

        let candidates = PlayerCheck::MISSING_NEMESIS_STATS.candidates(&schema).unwrap();
        assert_eq!(candidates.table, Table::PlayerMatchStats);
        assert!(candidates.predicate.contains("total_deaths"));
        assert!(candidates.predicate.contains("pathfinder_stats.player_nemesis"));
    }

    #[test]
    fn test_every_standard_check_maps_to_its_category() {
        let schema = Schema::unqualified();
        let categories: Vec<IssueCategory> = StandardCheck::ALL.iter().map(|c| c.category()).collect();
        assert_eq!(categories, IssueCategory::STANDARD.to_vec());
        for check in StandardCheck::ALL {
            assert!(check.sql(&schema).contains("AS match_id"), "{}", check.category());
            assert_eq!(StandardCheck::for_category(check.category()), Some(check));
        }
    }

    #[test]
    fn test_category_lookup() {
        assert_eq!(
            StandardCheck::for_category(IssueCategory::MissingDeathStats),
            Some(StandardCheck::MISSING_DEATH_STATS)
        );
        assert_eq!(StandardCheck::for_category(IssueCategory::PlayerMissingVictimStats), None);
        assert_eq!(
            PlayerCheck::for_category(IssueCategory::PlayerMissingVictimStats).map(PlayerCheck::category),
            Some(IssueCategory::PlayerMissingVictimStats)
        );
    }
}
