use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use match_integrity::cli::{check, fix_counts, repair};
use match_integrity::config::ConfigOverrides;
use match_integrity::logging::{init_tracing, DEFAULT_FILTER};
use match_integrity::util::env;

#[derive(Parser, Debug)]
#[command(
    name = "match-integrity",
    version,
    about = "Detect and repair partially-ingested matches in the stats store"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Optional override for the database URL
    #[arg(long, global = true)]
    db_url: Option<String>,
    /// Schema holding the stats tables; empty for unqualified names
    #[arg(long, global = true)]
    schema: Option<String>,
    /// Optional override for max pool connections
    #[arg(long, global = true)]
    max_connections: Option<u32>,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Report integrity issues; exits 1 when any are found, 2 when a check failed
    Check {
        /// Also check every player for missing victim/nemesis rows (slower)
        #[arg(long, default_value_t = false)]
        thorough: bool,
        /// Rows per page for the per-player scan (default: env/1000)
        #[arg(long)]
        batch_size: Option<usize>,
        /// List every issue with its players
        #[arg(long, short, default_value_t = false)]
        verbose: bool,
        /// Print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Detect, then remove every flagged match so it can be re-ingested
    Repair {
        #[arg(long, default_value_t = false)]
        thorough: bool,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Delete for real; without it only row counts are shown
        #[arg(long, default_value_t = false)]
        execute: bool,
        /// Do not prompt before deleting
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Remove the given matches from every stats table
    DeleteMatches {
        #[arg(required = true, num_args = 1..)]
        match_ids: Vec<i64>,
        #[arg(long, default_value_t = false)]
        execute: bool,
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Recompute match_history.player_count from player_match_stats
    FixPlayerCounts {
        #[arg(long, default_value_t = false)]
        execute: bool,
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

impl GlobalArgs {
    fn overrides(&self, batch_size: Option<usize>) -> ConfigOverrides {
        ConfigOverrides {
            database_url: self.db_url.clone(),
            schema: self.schema.clone(),
            batch_size,
            max_connections: self.max_connections,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env::init_env();
    let cli = Cli::parse();
    let verbose = matches!(cli.command, Commands::Check { verbose: true, .. });
    init_tracing(DEFAULT_FILTER, verbose)?;
    env::preflight_check(
        "match-integrity",
        &[],
        &[
            "DATABASE_URL",
            "POSTGRES_HOST",
            "POSTGRES_DB",
            "INTEGRITY_SCHEMA",
            "INTEGRITY_BATCH_SIZE",
            "DB_MAX_CONNS",
        ],
    )?;

    match cli.command {
        Commands::Check {
            thorough,
            batch_size,
            verbose,
            json,
        } => {
            let cfg = check::CheckConfig {
                overrides: cli.global.overrides(batch_size),
                thorough,
                verbose,
                json,
            };
            let report = check::run(cfg).await?;
            return Ok(ExitCode::from(check::exit_status(&report)));
        }
        Commands::Repair {
            thorough,
            batch_size,
            execute,
            yes,
        } => {
            let cfg = repair::RepairConfig {
                overrides: cli.global.overrides(batch_size),
                thorough,
                match_ids: None,
                execute,
                assume_yes: yes,
            };
            repair::run(cfg).await?;
        }
        Commands::DeleteMatches {
            match_ids,
            execute,
            yes,
        } => {
            let cfg = repair::RepairConfig {
                overrides: cli.global.overrides(None),
                thorough: false,
                match_ids: Some(match_ids),
                execute,
                assume_yes: yes,
            };
            repair::run(cfg).await?;
        }
        Commands::FixPlayerCounts { execute, yes } => {
            let cfg = fix_counts::FixCountsConfig {
                overrides: cli.global.overrides(None),
                execute,
                assume_yes: yes,
            };
            fix_counts::run(cfg).await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
