use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[path = "../fetcher/mod.rs"]
mod fetcher;
#[path = "../shared/mod.rs"]
mod shared;

#[derive(Parser)]
#[command(name = "esi-fetch")]
#[command(about = "ESI Fetch - scrape several pages concurrently and print the results as JSON")]
struct Args {
    /// URLs to fetch
    urls: Vec<String>,

    /// Maximum number of requests in flight (defaults to the configured value)
    #[arg(long, allow_negative_numbers = true)]
    max_concurrent: Option<i64>,

    /// Maximum characters of content kept per page
    #[arg(long)]
    content_limit: Option<usize>,

    /// Per-page timeout in seconds (0 disables it)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Path to the ESI config file
    #[arg(long, env = "ESI_CONFIG_PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (mut config, config_path) = shared::config::EsiConfig::load(args.config)?;

    let _ = shared::logging::init_service_logging(&config.log_dir, "esi_fetch");
    tracing::info!("Using config: {}", config_path.display());

    if let Some(limit) = args.content_limit {
        config.fetch.content_limit = limit;
    }
    if let Some(secs) = args.timeout_secs {
        config.fetch.timeout_secs = secs;
    }
    let max_concurrent = args.max_concurrent.unwrap_or(config.fetch.max_concurrent);

    let json = fetcher::run(&config.fetch, &args.urls, max_concurrent).await?;
    println!("{}", json);
    Ok(())
}
