//! Runtime settings for the integrity CLI: environment first, flags on top.

use anyhow::{Context, Result};

use crate::integrity::{Schema, DEFAULT_BATCH_SIZE};
use crate::integrity::schema::DEFAULT_SCHEMA;
use crate::util::env as env_util;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub schema: Option<String>,
    pub batch_size: Option<usize>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct IntegrityConfig {
    pub database_url: String,
    pub schema: Schema,
    pub batch_size: usize,
    pub max_connections: u32,
}

impl IntegrityConfig {
    /// `INTEGRITY_SCHEMA`, `INTEGRITY_BATCH_SIZE` and `DB_MAX_CONNS` supply the
    /// defaults; the database URL comes from [`env_util::db_url`] unless given.
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self> {
        env_util::init_env();

        let database_url = match overrides.database_url {
            Some(url) if !url.trim().is_empty() => url,
            _ => env_util::db_url().context(
                "no database URL; pass --db-url or set DATABASE_URL / POSTGRES_HOST, POSTGRES_USER, POSTGRES_DB",
            )?,
        };

        let schema_name = overrides
            .schema
            .or_else(|| env_util::env_opt("INTEGRITY_SCHEMA"))
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        let schema = Schema::new(&schema_name)?;

        let batch_size = overrides
            .batch_size
            .unwrap_or_else(|| env_util::env_parse("INTEGRITY_BATCH_SIZE", DEFAULT_BATCH_SIZE));
        if batch_size == 0 {
            anyhow::bail!("batch size must be at least 1");
        }

        let max_connections = overrides
            .max_connections
            .unwrap_or_else(|| env_util::env_parse("DB_MAX_CONNS", DEFAULT_MAX_CONNECTIONS))
            .max(1);

        Ok(Self {
            database_url,
            schema,
            batch_size,
            max_connections,
        })
    }
}
