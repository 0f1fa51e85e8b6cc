use anyhow::Result;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::sync::Once;
use std::time::Duration;
use tracing::{info, instrument};

use crate::util::env as env_util;

static DRIVERS: Once = Once::new();

fn install_drivers() {
    DRIVERS.call_once(sqlx::any::install_default_drivers);
}

/// Shared handle over the match store.
///
/// Production runs against Postgres; SQLite URLs are accepted for local
/// inspection and for the test fixture. All integrity SQL sticks to the
/// subset both dialects understand.
#[derive(Clone)]
pub struct Db {
    pub pool: AnyPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        install_drivers();
        let url = prepare_url(database_url, use_prepared_statements());

        let mut options = AnyPoolOptions::new()
            .acquire_timeout(Duration::from_secs(10))
            .max_connections(max_connections.max(1));

        if is_sqlite_memory(&url) {
            // Every new connection to :memory: is a fresh, empty database.
            options = options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            options = options.idle_timeout(Duration::from_secs(600));
        }

        let pool = options.connect(&url).await?;
        info!(backend = backend_name(&url), "connected to db");
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("database connection closed");
    }
}

fn use_prepared_statements() -> bool {
    env_util::env_flag("USE_PREPARED", false)
}

/// PgBouncer txn mode safe unless USE_PREPARED is set: disable the Postgres
/// statement cache through the DSN since `AnyPool` has no typed option for it.
fn prepare_url(database_url: &str, use_prepared: bool) -> String {
    let url = database_url.trim();
    let is_postgres = url.starts_with("postgres://") || url.starts_with("postgresql://");
    if !is_postgres || use_prepared || url.contains("statement-cache-capacity") {
        return url.to_string();
    }
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}statement-cache-capacity=0")
}

fn is_sqlite_memory(url: &str) -> bool {
    url.starts_with("sqlite:") && url.contains(":memory:")
}

fn backend_name(url: &str) -> &'static str {
    if url.starts_with("sqlite:") {
        "sqlite"
    } else if url.starts_with("postgres") {
        "postgres"
    } else {
        "other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_url_disables_statement_cache_for_postgres() {
        assert_eq!(
            prepare_url("postgres://u:p@h:5432/db", false),
            "postgres://u:p@h:5432/db?statement-cache-capacity=0"
        );
        assert_eq!(
            prepare_url("postgresql://u@h/db?sslmode=require", false),
            "postgresql://u@h/db?sslmode=require&statement-cache-capacity=0"
        );
        assert_eq!(prepare_url("postgres://u@h/db", true), "postgres://u@h/db");
        assert_eq!(prepare_url("sqlite::memory:", false), "sqlite::memory:");
    }

    #[test]
    fn test_backend_detection() {
        assert!(is_sqlite_memory("sqlite::memory:"));
        assert!(!is_sqlite_memory("sqlite://stats.db"));
        assert_eq!(backend_name("postgresql://h/db"), "postgres");
        assert_eq!(backend_name("sqlite://stats.db"), "sqlite");
    }

    #[tokio::test]
    async fn test_connect_memory_sqlite() {
        let db = Db::connect("sqlite::memory:", 4).await.expect("connect");
        let one: i64 = sqlx::query_scalar("SELECT CAST(1 AS BIGINT)")
            .fetch_one(&db.pool)
            .await
            .expect("select");
        assert_eq!(one, 1);
        db.close().await;
    }
}
