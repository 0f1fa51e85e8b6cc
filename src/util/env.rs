//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use tracing::info;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        // Values already present in the process environment win over .env.
        let _ = dotenv::dotenv();
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

/// Database URL: `DATABASE_URL` / `DB_URL` first, then composed from the
/// `POSTGRES_*` variables the ingestion pipeline shares.
pub fn db_url() -> anyhow::Result<String> {
    init_env();
    for k in ["DATABASE_URL", "DB_URL"] {
        if let Some(v) = env_opt(k) {
            info!(target = "env", key = k, "using database URL from env");
            return Ok(v);
        }
    }

    if let Some(dsn) = build_dsn_from_postgres_vars() {
        info!(target = "env", "using DSN composed from POSTGRES_* vars");
        return Ok(dsn);
    }

    Err(anyhow::anyhow!(
        "no database URL env vars set (DATABASE_URL or POSTGRES_HOST/POSTGRES_DB/POSTGRES_USER)"
    ))
}

fn build_dsn_from_postgres_vars() -> Option<String> {
    let host = env_opt("POSTGRES_HOST")?;
    let user = env_opt("POSTGRES_USER")?;
    let database = env_opt("POSTGRES_DB")?;
    let password = env_opt("POSTGRES_PASSWORD");
    let port = env_opt("POSTGRES_PORT").unwrap_or_else(|| "5432".into());
    let ssl_mode = env_opt("POSTGRES_SSLMODE");
    compose_dsn(&host, port.trim(), &database, &user, password.as_deref(), ssl_mode.as_deref())
}

// The password may contain reserved URL characters; build via `url::Url` so
// username/password are percent-encoded.
fn compose_dsn(
    host: &str,
    port: &str,
    database: &str,
    user: &str,
    password: Option<&str>,
    ssl_mode: Option<&str>,
) -> Option<String> {
    let port_u16: u16 = port.parse::<u16>().unwrap_or(5432);

    let mut out = url::Url::parse("postgresql://localhost").ok()?;
    out.set_username(user).ok()?;
    if let Some(pass) = password {
        out.set_password(Some(pass)).ok()?;
    }

    let host_trimmed = host.trim().trim_matches(|c| c == '[' || c == ']');
    if host_trimmed.contains(':') {
        out.set_host(Some(&format!("[{host_trimmed}]"))).ok()?;
    } else {
        out.set_host(Some(host_trimmed)).ok()?;
    }

    out.set_port(Some(port_u16)).ok()?;
    out.set_path(&format!("/{database}"));
    if let Some(mode) = ssl_mode.filter(|m| !m.eq_ignore_ascii_case("disable")) {
        out.query_pairs_mut().append_pair("sslmode", mode);
    }

    Some(out.to_string())
}

pub(crate) fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("PASSWORD") || k.contains("SECRET") || k.contains("TOKEN") {
        return "***".to_string();
    }

    let val_trim = val.trim();

    // Always redact postgres DSNs even if the key isn't obviously sensitive.
    if let Ok(mut u) = url::Url::parse(val_trim) {
        let scheme = u.scheme().to_ascii_lowercase();
        if scheme == "postgres" || scheme == "postgresql" {
            let _ = u.set_username("***");
            let _ = u.set_password(Some("***"));
            return u.to_string();
        }
    }

    val_trim.to_string()
}

/// Validate required keys and log a consolidated, redacted snapshot of configuration.
/// Returns error if any required key is missing.
pub fn preflight_check(title: &str, required: &[&str], also_log: &[&str]) -> anyhow::Result<()> {
    init_env();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|k| env_opt(k).is_none())
        .collect();
    let snapshot: Vec<(String, String)> = also_log
        .iter()
        .map(|&k| {
            let v = env_opt(k).unwrap_or_default();
            (k.to_string(), redact_value(k, &v))
        })
        .collect();
    info!(target = "preflight", title, snapshot = ?snapshot, "configuration snapshot");
    if !missing.is_empty() {
        return Err(anyhow::anyhow!("missing required env: {:?}", missing));
    }
    Ok(())
}
