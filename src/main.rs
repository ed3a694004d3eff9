use clap::Parser;
use listing_scout::catalog::CatalogClient;
use listing_scout::config::Config;
use listing_scout::crawler::{CrawlConfig, Crawler, RunReport};
use listing_scout::models::Platform;
use listing_scout::scrapers::{self, BrowserConfig, BrowserSession, StrategyOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "listing-scout", version, about = "Scrape listing sites for the catalog's search profiles")]
struct Cli {
    /// Only scrape this platform (repeatable)
    #[arg(long = "platform", value_parser = parse_platform)]
    platforms: Vec<Platform>,

    /// Extract but do not import or acknowledge
    #[arg(long)]
    dry_run: bool,

    /// Where failure snapshots are written (overrides SCRAPER_DEBUG_DIR)
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
}

fn parse_platform(key: &str) -> Result<Platform, String> {
    Platform::from_key(key).ok_or_else(|| {
        let known: Vec<_> = Platform::ALL.iter().map(|p| p.key()).collect();
        format!("unknown platform '{}' (expected one of: {})", key, known.join(", "))
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    info!("🏠 Listing Scout");
    info!("================");

    match run(cli).await {
        Ok(report) => {
            info!("✅ Run complete: {} unique listing(s)", report.unique_listings);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<RunReport> {
    let config = Config::from_env()?;

    let mut registry = scrapers::registry(&StrategyOptions::default())?;
    if !cli.platforms.is_empty() {
        registry.retain(&cli.platforms);
    }
    info!("Platforms: {:?}", registry.platforms());

    let catalog = Arc::new(CatalogClient::new(&config.api_url, config.api_key.clone())?);
    let session = Arc::new(BrowserSession::new(BrowserConfig {
        executable: config.chrome_path.clone(),
        debug_port: config.chrome_debug_port,
        profile_dir: config.chrome_profile_dir.clone(),
        headless: config.headless,
        ..BrowserConfig::default()
    }));

    let crawl = CrawlConfig {
        delay: config.delay,
        jitter: config.jitter,
        batch_size: config.batch_size,
        task_timeout: config.task_timeout,
        snapshot_dir: Some(cli.snapshot_dir.unwrap_or(config.debug_dir)),
        dry_run: cli.dry_run,
        // A partial run must not clear the pending flag
        acknowledge: !cli.dry_run && cli.platforms.is_empty(),
    };

    let crawler = Crawler::new(crawl, registry, catalog.clone(), catalog, session.clone())?;
    let result = crawler.run().await;

    let _ = tokio::task::spawn_blocking(move || session.shutdown()).await;
    result
}
