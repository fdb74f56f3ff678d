use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::util::db_config::ConnectionConfig;
use crate::util::env::{env_flag, env_opt};

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: the config Debug impl masks the password, but keep it out of spans anyway.
    #[instrument(skip(cfg), fields(host = %cfg.host, database = %cfg.database))]
    pub async fn connect(cfg: &ConnectionConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            // Runs are strictly sequential; one connection carries the whole transaction.
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(connect_options(cfg)?)
            .await
            .with_context(|| format!("failed to connect to {}", cfg.redacted_dsn()))?;
        info!(dsn = %cfg.redacted_dsn(), "connected to db");
        Ok(Self { pool })
    }

    /// Connect from a raw DSN instead of an env file.
    pub async fn connect_url(database_url: &str) -> Result<Self> {
        let mut options = PgConnectOptions::from_str(database_url)?;
        if !env_flag("USE_PREPARED", false) {
            options = options.statement_cache_capacity(0);
        }
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("database connection closed");
    }
}

fn connect_options(cfg: &ConnectionConfig) -> Result<PgConnectOptions> {
    let ssl_mode = match env_opt("DB_SSLMODE") {
        Some(raw) => PgSslMode::from_str(raw.trim())
            .with_context(|| format!("unsupported DB_SSLMODE `{raw}`"))?,
        None => PgSslMode::Prefer,
    };
    let mut options = PgConnectOptions::new()
        .host(cfg.host.trim_matches(|c| c == '[' || c == ']'))
        .port(cfg.port)
        .database(&cfg.database)
        .username(&cfg.user)
        .password(&cfg.password)
        .ssl_mode(ssl_mode)
        .application_name("pokeseed");

    // Supabase poolers run PgBouncer in transaction mode; prepared statements break there.
    if !env_flag("USE_PREPARED", false) {
        options = options.statement_cache_capacity(0);
    }
    Ok(options)
}
