//! In-memory SQLite fixture mirroring the stats schema, driven through the
//! same `AnyPool` code path as production.

use sqlx::Row;

use super::schema::{Schema, Table};
use crate::util::db::Db;

const FIXTURE_DDL: &[&str] = &[
    "CREATE TABLE match_history (
        match_id INTEGER PRIMARY KEY,
        map_name TEXT,
        player_count INTEGER
    )",
    "CREATE TABLE player_match_stats (
        player_id TEXT NOT NULL,
        match_id INTEGER NOT NULL REFERENCES match_history(match_id),
        player_name TEXT,
        total_kills INTEGER,
        total_deaths INTEGER,
        PRIMARY KEY (player_id, match_id)
    )",
    "CREATE TABLE player_kill_stats (
        player_id TEXT NOT NULL,
        match_id INTEGER NOT NULL REFERENCES match_history(match_id),
        infantry INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (player_id, match_id)
    )",
    "CREATE TABLE player_death_stats (
        player_id TEXT NOT NULL,
        match_id INTEGER NOT NULL REFERENCES match_history(match_id),
        infantry INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (player_id, match_id)
    )",
    "CREATE TABLE player_victim (
        player_id TEXT NOT NULL,
        match_id INTEGER NOT NULL REFERENCES match_history(match_id),
        victim_name TEXT NOT NULL,
        kill_count INTEGER NOT NULL,
        PRIMARY KEY (player_id, match_id, victim_name)
    )",
    "CREATE TABLE player_nemesis (
        player_id TEXT NOT NULL,
        match_id INTEGER NOT NULL REFERENCES match_history(match_id),
        nemesis_name TEXT NOT NULL,
        death_count INTEGER NOT NULL,
        PRIMARY KEY (player_id, match_id, nemesis_name)
    )",
];

pub(crate) async fn fixture_db() -> (Db, Schema) {
    let db = Db::connect("sqlite::memory:", 1).await.expect("connect sqlite");
    for ddl in FIXTURE_DDL {
        exec(&db, ddl).await;
    }
    (db, Schema::unqualified())
}

pub(crate) async fn exec(db: &Db, sql: &str) {
    sqlx::query(sql)
        .execute(&db.pool)
        .await
        .unwrap_or_else(|e| panic!("fixture sql failed: {e}\n{sql}"));
}

#[derive(Debug, Clone)]
pub(crate) struct SeedPlayer {
    pub id: String,
    pub kills: i64,
    pub deaths: i64,
}

pub(crate) fn player(id: &str, kills: i64, deaths: i64) -> SeedPlayer {
    SeedPlayer { id: id.to_string(), kills, deaths }
}

/// Builder for one match footprint. Everything is written by default; the
/// `without_*` switches reproduce an interrupted ingestion.
#[derive(Debug, Clone)]
pub(crate) struct MatchSeed {
    pub match_id: i64,
    pub players: Vec<SeedPlayer>,
    pub player_count: Option<i64>,
    pub player_stats: bool,
    pub kill_stats: bool,
    pub death_stats: bool,
    pub victims: bool,
    pub nemeses: bool,
    /// Players whose victim rows are skipped even when `victims` is on.
    pub skip_victims_for: Vec<String>,
    pub skip_nemeses_for: Vec<String>,
}

impl MatchSeed {
    pub fn complete(match_id: i64, players: Vec<SeedPlayer>) -> Self {
        let count = players.len() as i64;
        Self {
            match_id,
            players,
            player_count: Some(count),
            player_stats: true,
            kill_stats: true,
            death_stats: true,
            victims: true,
            nemeses: true,
            skip_victims_for: Vec::new(),
            skip_nemeses_for: Vec::new(),
        }
    }

    pub fn player_count(mut self, count: Option<i64>) -> Self {
        self.player_count = count;
        self
    }
    pub fn without_player_stats(mut self) -> Self {
        self.player_stats = false;
        self
    }
    pub fn without_kill_stats(mut self) -> Self {
        self.kill_stats = false;
        self
    }
    pub fn without_death_stats(mut self) -> Self {
        self.death_stats = false;
        self
    }
    pub fn without_victims(mut self) -> Self {
        self.victims = false;
        self
    }
    pub fn without_nemeses(mut self) -> Self {
        self.nemeses = false;
        self
    }
    pub fn skip_victims_for(mut self, player_id: &str) -> Self {
        self.skip_victims_for.push(player_id.to_string());
        self
    }
    pub fn skip_nemeses_for(mut self, player_id: &str) -> Self {
        self.skip_nemeses_for.push(player_id.to_string());
        self
    }

    pub async fn write(&self, db: &Db) {
        let id = self.match_id;
        sqlx::query("INSERT INTO match_history (match_id, map_name, player_count) VALUES ($1, $2, $3)")
            .bind(id)
            .bind("carentan")
            .bind(self.player_count)
            .execute(&db.pool)
            .await
            .expect("insert match_history");

        for p in &self.players {
            if self.player_stats {
                sqlx::query(
                    "INSERT INTO player_match_stats (player_id, match_id, player_name, total_kills, total_deaths)
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(p.id.as_str())
                .bind(id)
                .bind(format!("name-{}", p.id))
                .bind(p.kills)
                .bind(p.deaths)
                .execute(&db.pool)
                .await
                .expect("insert player_match_stats");
            }
            if self.kill_stats {
                sqlx::query("INSERT INTO player_kill_stats (player_id, match_id, infantry) VALUES ($1, $2, $3)")
                    .bind(p.id.as_str())
                    .bind(id)
                    .bind(p.kills)
                    .execute(&db.pool)
                    .await
                    .expect("insert player_kill_stats");
            }
            if self.death_stats {
                sqlx::query("INSERT INTO player_death_stats (player_id, match_id, infantry) VALUES ($1, $2, $3)")
                    .bind(p.id.as_str())
                    .bind(id)
                    .bind(p.deaths)
                    .execute(&db.pool)
                    .await
                    .expect("insert player_death_stats");
            }
            if self.victims && p.kills > 0 && !self.skip_victims_for.contains(&p.id) {
                sqlx::query(
                    "INSERT INTO player_victim (player_id, match_id, victim_name, kill_count) VALUES ($1, $2, $3, $4)",
                )
                .bind(p.id.as_str())
                .bind(id)
                .bind("axis-rifleman")
                .bind(p.kills)
                .execute(&db.pool)
                .await
                .expect("insert player_victim");
            }
            if self.nemeses && p.deaths > 0 && !self.skip_nemeses_for.contains(&p.id) {
                sqlx::query(
                    "INSERT INTO player_nemesis (player_id, match_id, nemesis_name, death_count) VALUES ($1, $2, $3, $4)",
                )
                .bind(p.id.as_str())
                .bind(id)
                .bind("axis-sniper")
                .bind(p.deaths)
                .execute(&db.pool)
                .await
                .expect("insert player_nemesis");
            }
        }
    }
}

pub(crate) async fn rows_for(db: &Db, table: Table, match_id: i64) -> i64 {
    let sql = format!("SELECT COUNT(*) AS n FROM {} WHERE match_id = $1", table.name());
    let row = sqlx::query(&sql)
        .bind(match_id)
        .fetch_one(&db.pool)
        .await
        .expect("count rows");
    row.try_get::<i64, _>("n").expect("decode count")
}

pub(crate) async fn total_rows(db: &Db, table: Table) -> i64 {
    let sql = format!("SELECT COUNT(*) AS n FROM {}", table.name());
    let row = sqlx::query(&sql).fetch_one(&db.pool).await.expect("count rows");
    row.try_get::<i64, _>("n").expect("decode count")
}
