use crate::catalog::ImportSummary;
use crate::models::Platform;
use crate::scrapers::types::{ExtractionOutcome, OutcomeKind};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Outcome counters for one platform over a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformStats {
    pub tasks: usize,
    pub listings: usize,
    pub successes: usize,
    pub empty: usize,
    pub blocked: usize,
    pub failed: usize,
}

impl PlatformStats {
    pub fn record(&mut self, outcome: &ExtractionOutcome) {
        self.tasks += 1;
        self.listings += outcome.listing_count();
        match outcome.kind() {
            OutcomeKind::Success => self.successes += 1,
            OutcomeKind::Empty => self.empty += 1,
            OutcomeKind::Blocked => self.blocked += 1,
            OutcomeKind::TransientError => self.failed += 1,
        }
    }

    /// No task was blocked or failed
    pub fn healthy(&self) -> bool {
        self.blocked == 0 && self.failed == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub platforms: BTreeMap<Platform, PlatformStats>,
    pub profiles: usize,
    pub extracted: usize,
    pub unique_listings: usize,
    pub duplicates_dropped: usize,
    pub import: ImportSummary,
    pub failed_batches: usize,
    pub acknowledged: usize,
    pub ack_failures: usize,
}

impl RunReport {
    pub fn record(&mut self, platform: Platform, outcome: &ExtractionOutcome) {
        self.extracted += outcome.listing_count();
        self.platforms.entry(platform).or_default().record(outcome);
    }

    pub fn platform(&self, platform: Platform) -> Option<&PlatformStats> {
        self.platforms.get(&platform)
    }

    pub fn is_healthy(&self, platform: Platform) -> bool {
        self.platform(platform).map_or(true, PlatformStats::healthy)
    }

    pub fn log_summary(&self) {
        info!("📊 Run summary: {} profile(s)", self.profiles);
        for (platform, stats) in &self.platforms {
            if stats.healthy() {
                info!(
                    %platform,
                    tasks = stats.tasks,
                    empty = stats.empty,
                    "✅ {}: {} listing(s)",
                    platform,
                    stats.listings
                );
            } else {
                warn!(
                    %platform,
                    tasks = stats.tasks,
                    blocked = stats.blocked,
                    failed = stats.failed,
                    "⚠️  {}: {} listing(s), degraded",
                    platform,
                    stats.listings
                );
            }
        }
        info!(
            extracted = self.extracted,
            duplicates = self.duplicates_dropped,
            "🧮 {} unique listing(s)",
            self.unique_listings
        );
        info!(
            created = self.import.created,
            updated = self.import.updated,
            rejected = self.import.errors.len(),
            failed_batches = self.failed_batches,
            "💾 Import finished"
        );
        if self.acknowledged > 0 || self.ack_failures > 0 {
            info!(failures = self.ack_failures, "🔔 {} pending profile(s) acknowledged", self.acknowledged);
        }
    }
}
