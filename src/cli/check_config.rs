use anyhow::Result;
use serde_json::json;
use tracing::info;

use crate::util::db_config::{ConfigError, ConfigFormat, ConnectionConfig};
use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct CheckConfig {
    /// Optional override for the connection config file.
    pub env_file: Option<String>,
}

/// Validate the connection file without touching the network or database and
/// print a redacted snapshot.
pub async fn run(cfg: CheckConfig) -> Result<()> {
    let path = env_util::bootstrap_cli("check-config", cfg.env_file.as_deref());
    let format = std::fs::read_to_string(&path)
        .ok()
        .map(|c| format!("{:?}", ConfigFormat::detect(&c)));

    let out = match ConnectionConfig::load(&path) {
        Ok(c) => json!({
            "file": path.display().to_string(),
            "format": format,
            "status": "ok",
            "dsn": c.redacted_dsn(),
        }),
        Err(e) => {
            let status = match &e {
                ConfigError::Unconfigured => "unconfigured",
                _ => "invalid",
            };
            let out = json!({
                "file": path.display().to_string(),
                "format": format,
                "status": status,
                "error": e.to_string(),
                "hint": e.remediation(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Err(e.into());
        }
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    info!("check-config done");
    Ok(())
}
