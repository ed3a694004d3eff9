//! The run driver: plans (profile × platform) tasks, executes each
//! platform's attempt chain, paces between tasks, then deduplicates,
//! imports and acknowledges.

pub mod dedup;
pub mod slot;
pub mod stats;

pub use dedup::Deduplicator;
pub use slot::PageSlot;
pub use stats::{PlatformStats, RunReport};

use crate::catalog::{ListingSink, ProfileSource};
use crate::models::{Listing, Platform, SearchProfile};
use crate::scrapers::browser::{SessionMode, DESKTOP_USER_AGENT};
use crate::scrapers::traits::{Attempt, PageProvider, PlatformStrategy, RenderedPage, StrategyRegistry};
use crate::scrapers::types::{ExtractionOutcome, OutcomeKind};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rand::Rng;
use reqwest::Client;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub delay: Duration,
    pub jitter: Duration,
    pub batch_size: usize,
    pub task_timeout: Duration,
    /// Failure snapshots go here; none are written when unset
    pub snapshot_dir: Option<PathBuf>,
    /// Skip the import step
    pub dry_run: bool,
    /// Clear the pending flag of processed profiles
    pub acknowledge: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(2000),
            jitter: Duration::from_millis(3000),
            batch_size: 50,
            task_timeout: Duration::from_secs(180),
            snapshot_dir: Some(PathBuf::from("debug")),
            dry_run: false,
            acknowledge: true,
        }
    }
}

/// One (profile, platform) unit of work
#[derive(Debug, Clone)]
pub struct CrawlTask {
    pub profile: Arc<SearchProfile>,
    pub platform: Platform,
    pub elapsed: Duration,
    pub outcome: Option<OutcomeKind>,
}

impl CrawlTask {
    pub fn new(profile: Arc<SearchProfile>, platform: Platform) -> Self {
        Self {
            profile,
            platform,
            elapsed: Duration::ZERO,
            outcome: None,
        }
    }
}

/// The run's work list
#[derive(Debug, Default)]
pub struct CrawlPlan {
    pub tasks: Vec<CrawlTask>,
    /// Pending profiles to acknowledge once the run is over
    pub pending_ids: Vec<i64>,
    pub profiles: usize,
}

/// Pending profiles first (deduplicated by id), then the remaining active
/// ones; per profile, each of its platforms that has a strategy.
pub fn plan_tasks(
    pending: Vec<SearchProfile>,
    active: Vec<SearchProfile>,
    registry: &StrategyRegistry,
) -> CrawlPlan {
    let mut plan = CrawlPlan::default();
    let mut seen = HashSet::new();

    for profile in pending {
        if seen.insert(profile.id) {
            plan.pending_ids.push(profile.id);
            push_profile(&mut plan, profile, registry);
        }
    }
    for profile in active {
        if seen.insert(profile.id) {
            push_profile(&mut plan, profile, registry);
        }
    }
    plan
}

fn push_profile(plan: &mut CrawlPlan, profile: SearchProfile, registry: &StrategyRegistry) {
    plan.profiles += 1;
    let profile = Arc::new(profile);
    for platform in profile.platform_list() {
        if registry.get(platform).is_some() {
            plan.tasks.push(CrawlTask::new(profile.clone(), platform));
        } else {
            debug!(profile_id = profile.id, %platform, "platform not enabled, skipping");
        }
    }
}

pub struct Crawler {
    config: CrawlConfig,
    registry: StrategyRegistry,
    profiles: Arc<dyn ProfileSource>,
    sink: Arc<dyn ListingSink>,
    pages: Arc<dyn PageProvider>,
    http: Client,
}

impl Crawler {
    pub fn new(
        config: CrawlConfig,
        registry: StrategyRegistry,
        profiles: Arc<dyn ProfileSource>,
        sink: Arc<dyn ListingSink>,
        pages: Arc<dyn PageProvider>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(DESKTOP_USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            registry,
            profiles,
            sink,
            pages,
            http,
        })
    }

    /// Errors only when the profiles cannot be fetched; everything after that
    /// degrades into the report.
    pub async fn run(&self) -> Result<RunReport> {
        let pending = self
            .profiles
            .pending_profiles()
            .await
            .context("Failed to fetch pending search profiles")?;
        let active = self
            .profiles
            .active_profiles()
            .await
            .context("Failed to fetch active search profiles")?;

        let plan = plan_tasks(pending, active, &self.registry);
        let mut report = RunReport {
            profiles: plan.profiles,
            ..RunReport::default()
        };
        info!(
            pending = plan.pending_ids.len(),
            "🏠 {} task(s) across {} profile(s)",
            plan.tasks.len(),
            plan.profiles
        );

        let mut dedup = Deduplicator::new();
        let total = plan.tasks.len();
        for (idx, mut task) in plan.tasks.into_iter().enumerate() {
            let outcome = self.execute(&mut task).await;
            report.record(task.platform, &outcome);
            dedup.extend(outcome.into_listings());

            if idx + 1 < total {
                tokio::time::sleep(self.pace()).await;
            }
        }

        if dedup.is_empty() {
            info!("No listings extracted this run");
        }
        report.unique_listings = dedup.len();
        report.duplicates_dropped = dedup.dropped();
        let listings = dedup.into_listings();

        if self.config.dry_run {
            info!("Dry run: {} listing(s) not imported", listings.len());
        } else {
            ingest(self.sink.as_ref(), &listings, self.config.batch_size, &mut report).await;
        }

        if self.config.acknowledge {
            for id in &plan.pending_ids {
                match self.profiles.acknowledge(*id).await {
                    Ok(()) => report.acknowledged += 1,
                    Err(e) => {
                        report.ack_failures += 1;
                        warn!(profile_id = id, "acknowledge failed: {}", e);
                    }
                }
            }
        }

        report.log_summary();
        Ok(report)
    }

    fn pace(&self) -> Duration {
        let jitter_ms = self.config.jitter.as_millis() as u64;
        let extra = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..jitter_ms)
        } else {
            0
        };
        self.config.delay + Duration::from_millis(extra)
    }

    /// Run one task to an outcome; never fails
    pub async fn execute(&self, task: &mut CrawlTask) -> ExtractionOutcome {
        let Some(strategy) = self.registry.get(task.platform) else {
            return ExtractionOutcome::Empty;
        };

        let started = Instant::now();
        let slot = PageSlot::new();
        let chain = run_strategy(strategy, &self.http, &self.pages, task.profile.clone(), &slot);
        let outcome = match tokio::time::timeout(self.config.task_timeout, chain).await {
            Ok(outcome) => outcome,
            Err(_) => ExtractionOutcome::transient(format!(
                "task exceeded {}s",
                self.config.task_timeout.as_secs()
            )),
        };
        task.elapsed = started.elapsed();
        task.outcome = Some(outcome.kind());

        match &outcome {
            ExtractionOutcome::Success(listings) => {
                info!(platform = %task.platform, profile_id = task.profile.id, elapsed_ms = task.elapsed.as_millis() as u64, "✅ {} listing(s)", listings.len())
            }
            ExtractionOutcome::Empty => {
                info!(platform = %task.platform, profile_id = task.profile.id, "no results")
            }
            ExtractionOutcome::Blocked(reason) => {
                warn!(platform = %task.platform, profile_id = task.profile.id, "🚫 blocked: {}", reason)
            }
            ExtractionOutcome::TransientError(cause) => {
                error!(platform = %task.platform, profile_id = task.profile.id, "❌ failed: {}", cause)
            }
        }

        if let Some(page) = slot.close() {
            if let (ExtractionOutcome::TransientError(_), Some(dir)) = (&outcome, &self.config.snapshot_dir) {
                let (dir, platform, snap_page) = (dir.clone(), task.platform, page.clone());
                match tokio::task::spawn_blocking(move || save_snapshot(snap_page.as_ref(), &dir, platform)).await {
                    Ok(Ok(path)) => info!("📸 Saved failure snapshot to {}", path.display()),
                    Ok(Err(e)) => warn!("snapshot failed: {:#}", e),
                    Err(e) => warn!("snapshot task failed: {}", e),
                }
            }
            let pages = self.pages.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || pages.release(page)).await {
                warn!("page release failed: {}", e);
            }
        }

        outcome
    }
}

/// Try the strategy's attempts in order until one yields listings.
///
/// Every attempt runs on its own task, so a panic inside one is reported as
/// a `TransientError` instead of unwinding through the run. A page is
/// acquired the first time a browser attempt is reached and left in `slot`
/// for the caller to release.
pub async fn run_strategy(
    strategy: &PlatformStrategy,
    http: &Client,
    pages: &Arc<dyn PageProvider>,
    profile: Arc<SearchProfile>,
    slot: &Arc<PageSlot>,
) -> ExtractionOutcome {
    let mut last_failure = None;

    for attempt in &strategy.attempts {
        let outcome = match attempt {
            Attempt::Direct(direct) => {
                let (direct, http, profile) = (direct.clone(), http.clone(), profile.clone());
                tokio::spawn(async move { direct.run(&http, &profile).await })
                    .await
                    .unwrap_or_else(|e| ExtractionOutcome::transient(format!("attempt panicked: {}", e)))
            }
            Attempt::Browser(browser) => match acquire(pages, strategy.session_mode, slot).await {
                Ok(current) => {
                    let (browser, profile) = (browser.clone(), profile.clone());
                    tokio::task::spawn_blocking(move || browser.run(current.as_ref(), &profile))
                        .await
                        .unwrap_or_else(|e| ExtractionOutcome::transient(format!("attempt panicked: {}", e)))
                }
                Err(e) => ExtractionOutcome::transient(format!("browser unavailable: {:#}", e)),
            },
        };
        debug!(platform = %strategy.platform, attempt = attempt.name(), %outcome, "attempt finished");

        if matches!(outcome, ExtractionOutcome::Success(_)) {
            return outcome;
        }
        if outcome.is_failure() {
            last_failure = Some(outcome);
        }
    }

    last_failure.unwrap_or(ExtractionOutcome::Empty)
}

async fn acquire(
    pages: &Arc<dyn PageProvider>,
    mode: SessionMode,
    slot: &Arc<PageSlot>,
) -> Result<Arc<dyn RenderedPage>> {
    if let Some(page) = slot.current() {
        return Ok(page);
    }
    let (pages, slot) = (pages.clone(), slot.clone());
    tokio::task::spawn_blocking(move || {
        let page = pages.acquire(mode)?;
        slot.fill(page, pages.as_ref())
            .ok_or_else(|| anyhow!("task ended before the page was ready"))
    })
    .await
    .context("page acquisition aborted")?
}

/// Write `{platform}-{timestamp}.png` and `.html` into `dir`; returns the PNG path
pub fn save_snapshot(page: &dyn RenderedPage, dir: &Path, platform: Platform) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let stem = format!("{}-{}", platform, Utc::now().format("%Y%m%d-%H%M%S%.3f"));

    let html_path = dir.join(format!("{}.html", stem));
    match page.content() {
        Ok(html) => std::fs::write(&html_path, html)?,
        Err(e) => debug!("page content unavailable for snapshot: {:#}", e),
    }

    let png_path = dir.join(format!("{}.png", stem));
    std::fs::write(&png_path, page.snapshot()?)?;
    Ok(png_path)
}

/// Send listings in fixed-size batches. Item rejections and failed batches
/// are recorded; neither stops later batches.
pub async fn ingest(sink: &dyn ListingSink, listings: &[Listing], batch_size: usize, report: &mut RunReport) {
    for (idx, batch) in listings.chunks(batch_size.max(1)).enumerate() {
        match sink.import_batch(batch).await {
            Ok(summary) => {
                for rejected in &summary.errors {
                    warn!(external_id = %rejected.external_id, "listing rejected: {}", rejected.errors.join(", "));
                }
                info!(
                    batch = idx + 1,
                    created = summary.created,
                    updated = summary.updated,
                    rejected = summary.errors.len(),
                    "💾 Imported batch of {}",
                    batch.len()
                );
                report.import.absorb(summary);
            }
            Err(e) => {
                report.failed_batches += 1;
                error!(batch = idx + 1, size = batch.len(), "batch import failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests;
