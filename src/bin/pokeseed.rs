use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use pokeseed::cli::check_config::{self, CheckConfig};
use pokeseed::cli::seed::{self, SeedConfig};
use pokeseed::database_ops::seed::{CommitStrategy, SyncMode, Variant};

#[derive(Parser, Debug)]
#[command(name = "pokeseed", version, about = "Seed Postgres with PokeAPI data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Rebuild public.characters from /pokemon/{id} (placeholder tier, single commit)
    Characters(SeedArgs),
    /// Add missing rows to public.moves from /move/{id} (commit per record)
    Moves(SeedArgs),
    /// Validate the connection config file and print a redacted summary
    CheckConfig {
        /// Path to the connection config file (defaults to POKESEED_ENV_FILE or ./.env)
        #[arg(long)]
        env_file: Option<String>,
    },
}

#[derive(Args, Debug)]
struct SeedArgs {
    /// Path to the connection config file (defaults to POKESEED_ENV_FILE or ./.env)
    #[arg(long)]
    env_file: Option<String>,
    /// First PokeAPI id (inclusive)
    #[arg(long)]
    start: Option<u32>,
    /// Last PokeAPI id (inclusive)
    #[arg(long)]
    end: Option<u32>,
    /// Truncate first (full) or skip existing names (incremental)
    #[arg(long, value_enum)]
    mode: Option<SyncMode>,
    /// Commit once at the end or after every insert
    #[arg(long, value_enum)]
    commit: Option<CommitStrategy>,
    /// Pause between API requests in milliseconds (overrides SEED_DELAY_MS)
    #[arg(long)]
    delay_ms: Option<u64>,
    /// PokeAPI base URL (overrides POKEAPI_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,
    /// HTTP timeout in seconds (overrides POKEAPI_TIMEOUT_SECS)
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Rows shown in the verification sample
    #[arg(long)]
    sample_limit: Option<i64>,
}

impl SeedArgs {
    fn into_config(self, variant: Variant) -> SeedConfig {
        SeedConfig {
            variant,
            env_file: self.env_file,
            start: self.start,
            end: self.end,
            mode: self.mode,
            commit: self.commit,
            delay_ms: self.delay_ms,
            base_url: self.base_url,
            timeout_secs: self.timeout_secs,
            sample_limit: self.sample_limit,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    pokeseed::tracing::init_tracing("pokeseed=info,sqlx=warn")?;

    match Cli::parse().command {
        Commands::Characters(args) => seed::run(args.into_config(Variant::Characters)).await,
        Commands::Moves(args) => seed::run(args.into_config(Variant::Moves)).await,
        Commands::CheckConfig { env_file } => check_config::run(CheckConfig { env_file }).await,
    }
}
