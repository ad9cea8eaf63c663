use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

#[path = "../schema/mod.rs"]
mod schema;
#[path = "../shared/mod.rs"]
mod shared;

#[derive(Parser)]
#[command(name = "esi-schema")]
#[command(about = "ESI Schema - create or inspect the chat history database")]
struct Args {
    /// SQLite database file (defaults to the configured path)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Only report table contents; do not create anything
    #[arg(long)]
    inspect_only: bool,

    /// Path to the ESI config file
    #[arg(long, env = "ESI_CONFIG_PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, _) = shared::config::EsiConfig::load(args.config)?;

    let _ = shared::logging::init_service_logging(&config.log_dir, "esi_schema");

    let db_path = args.db_path.unwrap_or(config.database_path);
    if args.inspect_only && !db_path.exists() {
        anyhow::bail!("Database file {} does not exist", db_path.display());
    }

    let pool = schema::connect(&db_path)
        .await
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    if !args.inspect_only {
        schema::create_schema(&pool).await?;
        println!("Database ready: {}", db_path.display());
    }

    let reports = schema::inspect(&pool).await?;
    print!("{}", schema::render_report(&reports));
    pool.close().await;
    Ok(())
}
