use crate::models::{Platform, SearchProfile};
use crate::scrapers::browser::SessionMode;
use crate::scrapers::types::ExtractionOutcome;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// A browser tab as seen by extraction code.
///
/// All methods block; callers run them off the async runtime.
pub trait RenderedPage: Send + Sync {
    /// Navigate and wait for the load to settle, bounded by `timeout`
    fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    fn title(&self) -> Result<String>;

    /// Current serialized DOM
    fn content(&self) -> Result<String>;

    /// Wait until `selector` matches an element; false on timeout
    fn wait_for(&self, selector: &str, timeout: Duration) -> bool;

    /// Evaluate a script for its side effects
    fn run_script(&self, script: &str) -> Result<()>;

    fn move_pointer(&self, x: f64, y: f64) -> Result<()>;

    /// PNG screenshot of the full page
    fn snapshot(&self) -> Result<Vec<u8>>;

    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn close(&self) -> Result<()>;
}

/// Hands out pages; one task holds a page at a time.
pub trait PageProvider: Send + Sync {
    fn acquire(&self, mode: SessionMode) -> Result<Arc<dyn RenderedPage>>;

    fn release(&self, page: Arc<dyn RenderedPage>);
}

/// Request-based attempt against a platform endpoint
#[async_trait]
pub trait DirectAttempt: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, http: &reqwest::Client, profile: &SearchProfile) -> ExtractionOutcome;
}

/// Attempt that drives a rendered page
pub trait BrowserAttempt: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, page: &dyn RenderedPage, profile: &SearchProfile) -> ExtractionOutcome;
}

#[derive(Clone)]
pub enum Attempt {
    Direct(Arc<dyn DirectAttempt>),
    Browser(Arc<dyn BrowserAttempt>),
}

impl Attempt {
    pub fn name(&self) -> &'static str {
        match self {
            Attempt::Direct(attempt) => attempt.name(),
            Attempt::Browser(attempt) => attempt.name(),
        }
    }
}

/// Integration that is known but not built yet; always reports no results
pub struct PendingIntegration {
    pub name: &'static str,
}

#[async_trait]
impl DirectAttempt for PendingIntegration {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, _http: &reqwest::Client, profile: &SearchProfile) -> ExtractionOutcome {
        tracing::debug!(attempt = self.name, profile_id = profile.id, "integration not implemented, skipping");
        ExtractionOutcome::Empty
    }
}

/// Ordered attempts registered for one platform
#[derive(Clone)]
pub struct PlatformStrategy {
    pub platform: Platform,
    pub session_mode: SessionMode,
    pub attempts: Vec<Attempt>,
}

impl PlatformStrategy {
    pub fn new(platform: Platform, session_mode: SessionMode, attempts: Vec<Attempt>) -> Self {
        Self {
            platform,
            session_mode,
            attempts,
        }
    }
}

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<Platform, PlatformStrategy>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: PlatformStrategy) {
        self.strategies.insert(strategy.platform, strategy);
    }

    pub fn with(mut self, strategy: PlatformStrategy) -> Self {
        self.register(strategy);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<&PlatformStrategy> {
        self.strategies.get(&platform)
    }

    /// Keep only the given platforms
    pub fn retain(&mut self, platforms: &[Platform]) {
        self.strategies.retain(|platform, _| platforms.contains(platform));
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.strategies.keys().copied().collect()
    }
}
