//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Once;
use tracing::{debug, info};

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
///
/// Parse failures are ignored: the connection file may be a JSON document
/// rather than dotenv syntax, and `util::db_config` reads it on its own.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_err() {
            let _ = dotenv::from_filename(manifest_env_file());
        }
    });
}

/// Common bootstrap for CLI binaries: initialize dotenv once and note which
/// connection file will be used.
pub fn bootstrap_cli(bin_name: &str, env_file: Option<&str>) -> PathBuf {
    init_env();
    let path = resolve_env_file(env_file);
    info!(
        target = "bootstrap",
        bin = bin_name,
        env_file = %path.display(),
        "resolved connection config file"
    );
    path
}

/// Connection file resolution: explicit path, then `POKESEED_ENV_FILE`, then
/// `.env` in the working directory, then `.env` next to the crate manifest.
pub fn resolve_env_file(explicit: Option<&str>) -> PathBuf {
    if let Some(p) = explicit.map(str::trim).filter(|p| !p.is_empty()) {
        return PathBuf::from(p);
    }
    if let Some(p) = env_opt("POKESEED_ENV_FILE") {
        return PathBuf::from(p);
    }
    let local = PathBuf::from(".env");
    if local.exists() {
        return local;
    }
    let fallback = manifest_env_file();
    debug!(path = %fallback.display(), "no .env in working directory; using manifest dir");
    fallback
}

fn manifest_env_file() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".env")
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
