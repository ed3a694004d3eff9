pub mod bienici;
pub mod browser;
pub mod challenge;
pub mod chrome_process;
pub mod extract;
pub mod leboncoin;
pub mod normalize;
pub mod pap;
pub mod search_page;
pub mod seloger;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use browser::{BrowserConfig, BrowserSession, SessionMode};
pub use search_page::PageTiming;
pub use traits::{PageProvider, PlatformStrategy, RenderedPage, StrategyRegistry};
pub use types::{ExtractionOutcome, OutcomeKind};

use anyhow::Result;
use challenge::{ChallengeDetector, PageState};
use serde_json::Value;
use tracing::warn;

/// Knobs shared by every platform strategy
#[derive(Debug, Clone, Default)]
pub struct StrategyOptions {
    pub timing: PageTiming,
}

/// Every platform, with its ordered attempts
pub fn registry(options: &StrategyOptions) -> Result<StrategyRegistry> {
    Ok(StrategyRegistry::new()
        .with(leboncoin::strategy(options)?)
        .with(seloger::strategy(options)?)
        .with(pap::strategy(options)?)
        .with(bienici::strategy(options)?))
}

/// Send a platform API request and decode its JSON body.
///
/// Bodies that are not JSON go through the challenge detector so an
/// anti-bot interstitial is reported as `Blocked`, whatever its status.
pub(crate) async fn fetch_json(request: reqwest::RequestBuilder) -> Result<Value, ExtractionOutcome> {
    let response = request
        .send()
        .await
        .map_err(|e| ExtractionOutcome::transient(format!("request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ExtractionOutcome::transient(format!("failed to read body: {}", e)))?;

    let parsed = serde_json::from_str::<Value>(&body);
    if parsed.is_err() {
        if let Some(reason) = interstitial(&body) {
            warn!(%status, "platform API answered with a challenge page: {}", reason);
            return Err(ExtractionOutcome::Blocked(reason));
        }
    }

    if !status.is_success() {
        warn!("platform API returned status: {}", status);
        return Err(ExtractionOutcome::from_status(status));
    }

    parsed.map_err(|e| ExtractionOutcome::transient(format!("invalid JSON body: {}", e)))
}

fn interstitial(body: &str) -> Option<String> {
    match ChallengeDetector::shared()?.classify_document(body) {
        PageState::Blocked(reason) | PageState::ChallengePending(reason) => Some(reason),
        PageState::Ok | PageState::NoResults => None,
    }
}

/// First array found under any of `pointers`
pub(crate) fn records_at<'a>(body: &'a Value, pointers: &[&str]) -> &'a [Value] {
    pointers
        .iter()
        .find_map(|ptr| body.pointer(ptr).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default()
}
