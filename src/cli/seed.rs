use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::info;

use crate::database_ops::pokeapi::client::{DEFAULT_TIMEOUT_SECS, PokeApiClient};
use crate::database_ops::repository::PgRepository;
use crate::database_ops::seed::{self, CommitStrategy, SeedOptions, SyncMode, Variant};
use crate::util::db::Db;
use crate::util::db_config::{ConfigError, ConnectionConfig};
use crate::util::env as env_util;

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub variant: Variant,
    /// Optional override for the connection config file.
    pub env_file: Option<String>,
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub mode: Option<SyncMode>,
    pub commit: Option<CommitStrategy>,
    pub delay_ms: Option<u64>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub sample_limit: Option<i64>,
}

impl SeedConfig {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            env_file: None,
            start: None,
            end: None,
            mode: None,
            commit: None,
            delay_ms: None,
            base_url: None,
            timeout_secs: None,
            sample_limit: None,
        }
    }

    /// Flags win over `SEED_*` env vars, which win over the variant defaults.
    pub fn options(&self) -> Result<SeedOptions> {
        let defaults = SeedOptions::for_variant(self.variant);
        let delay_ms = self.delay_ms.unwrap_or_else(|| {
            env_util::env_parse("SEED_DELAY_MS", defaults.delay.as_millis() as u64)
        });
        let opts = SeedOptions {
            start: self.start.unwrap_or(defaults.start),
            end: self.end.unwrap_or(defaults.end),
            mode: self.mode.unwrap_or(defaults.mode),
            commit: self.commit.unwrap_or(defaults.commit),
            delay: Duration::from_millis(delay_ms),
            sample_limit: self.sample_limit.unwrap_or(defaults.sample_limit),
            ..defaults
        };
        if opts.start == 0 || opts.start > opts.end {
            bail!(
                "invalid id range {}..={} (ids start at 1 and start must not exceed end)",
                opts.start,
                opts.end
            );
        }
        Ok(opts)
    }
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available: never interrupt.
        std::future::pending::<()>().await;
    }
}

pub async fn run(cfg: SeedConfig) -> Result<()> {
    let env_file = env_util::bootstrap_cli("pokeseed", cfg.env_file.as_deref());
    let options = cfg.options()?;
    println!(
        "Starting {} population (ids {}..={})...",
        options.variant.target().table(),
        options.start,
        options.end
    );

    let conn_cfg = match ConnectionConfig::load(&env_file) {
        Ok(c) => c,
        Err(ConfigError::Unconfigured) => {
            println!("\nPlease update the password in {}!", env_file.display());
            println!("{}", ConfigError::Unconfigured.remediation());
            return Ok(());
        }
        Err(e) => {
            let hint = e.remediation();
            return Err(anyhow::Error::new(e).context(hint));
        }
    };
    info!(config = ?conn_cfg, "connection config loaded");

    let base_url = cfg
        .base_url
        .clone()
        .or_else(|| env_util::env_opt("POKEAPI_BASE_URL"));
    let timeout = cfg
        .timeout_secs
        .unwrap_or_else(|| env_util::env_parse("POKEAPI_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS));
    let client = PokeApiClient::new(base_url.as_deref(), options.variant.resource(), Some(timeout))?;

    let db = Db::connect(&conn_cfg)
        .await
        .context("database connection failed")?;
    println!("Connected to database successfully");
    let mut repo = PgRepository::new(db);

    let summary = seed::run(&options, &client, &mut repo, ctrl_c()).await?;
    seed::print_summary(options.variant, &summary);
    println!("\nDatabase connection closed.");
    Ok(())
}
