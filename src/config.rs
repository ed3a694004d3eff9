use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://appartagent-app.fly.dev/api";

/// Run configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
    pub chrome_path: Option<PathBuf>,
    pub chrome_debug_port: u16,
    pub chrome_profile_dir: PathBuf,
    pub headless: bool,
    pub debug_dir: PathBuf,
    pub delay: Duration,
    pub jitter: Duration,
    pub batch_size: usize,
    pub task_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            api_key: get("SCRAPER_API_KEY").context("SCRAPER_API_KEY must be set")?,
            api_url: get("CATALOG_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            chrome_path: get("CHROME_PATH").map(PathBuf::from),
            chrome_debug_port: parse_or(get("CHROME_DEBUG_PORT"), 9222)
                .context("CHROME_DEBUG_PORT must be a valid port")?,
            chrome_profile_dir: get("CHROME_PROFILE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".chrome-profile")),
            headless: parse_flag(get("SCRAPER_HEADLESS"), true)
                .context("SCRAPER_HEADLESS must be true or false")?,
            debug_dir: get("SCRAPER_DEBUG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("debug")),
            delay: Duration::from_millis(
                parse_or(get("SCRAPER_DELAY_MS"), 2000).context("SCRAPER_DELAY_MS must be a number")?,
            ),
            jitter: Duration::from_millis(
                parse_or(get("SCRAPER_JITTER_MS"), 3000).context("SCRAPER_JITTER_MS must be a number")?,
            ),
            batch_size: parse_or(get("SCRAPER_BATCH_SIZE"), 50usize)
                .context("SCRAPER_BATCH_SIZE must be a number")?
                .max(1),
            task_timeout: Duration::from_secs(
                parse_or(get("SCRAPER_TASK_TIMEOUT_SECS"), 180)
                    .context("SCRAPER_TASK_TIMEOUT_SECS must be a number")?,
            ),
        })
    }
}

fn parse_or<T>(value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => Ok(raw.parse()?),
        None => Ok(default),
    }
}

fn parse_flag(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => anyhow::bail!("unrecognised flag value '{}'", other),
    }
}
