//! Browser attempt shared by every platform: open the public search page,
//! classify it, and pull listing cards out of the rendered DOM.

use crate::models::{Platform, SearchProfile};
use crate::scrapers::challenge::{ChallengeDetector, PageState};
use crate::scrapers::extract::{extract_cards, CardRules};
use crate::scrapers::normalize::{normalize_all, RawListingRecord};
use crate::scrapers::traits::{BrowserAttempt, RenderedPage};
use crate::scrapers::types::ExtractionOutcome;
use anyhow::Result;
use rand::Rng;
use scraper::Html;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Clicks the first consent button it recognises
const CONSENT_SCRIPT: &str = r#"
(() => {
    const byId = document.querySelector('#didomi-notice-agree-button');
    if (byId) { byId.click(); return true; }
    const labels = ['Tout accepter', 'Accepter', 'Continuer sans accepter'];
    for (const button of document.querySelectorAll('button, a[role="button"], span[role="button"]')) {
        const text = (button.innerText || '').trim();
        if (labels.some(label => text.includes(label))) { button.click(); return true; }
    }
    return false;
})()
"#;

/// Bounds on the waits of one search page visit
#[derive(Debug, Clone)]
pub struct PageTiming {
    pub navigation: Duration,
    /// Random settle delay after navigation, in milliseconds
    pub settle_ms: (u64, u64),
    pub challenge_wait: Duration,
    pub card_wait: Duration,
}

impl Default for PageTiming {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(60),
            settle_ms: (1500, 3500),
            challenge_wait: Duration::from_secs(20),
            card_wait: Duration::from_secs(15),
        }
    }
}

pub struct SearchPageAttempt {
    name: &'static str,
    platform: Platform,
    search_url: fn(&SearchProfile) -> Option<String>,
    rules: CardRules,
    detector: ChallengeDetector,
    timing: PageTiming,
}

impl SearchPageAttempt {
    pub fn new(
        name: &'static str,
        platform: Platform,
        search_url: fn(&SearchProfile) -> Option<String>,
        rules: CardRules,
        timing: PageTiming,
    ) -> Result<Self> {
        Ok(Self {
            name,
            platform,
            search_url,
            rules,
            detector: ChallengeDetector::new()?,
            timing,
        })
    }

    fn visit(&self, page: &dyn RenderedPage, url: &str) -> Result<ExtractionOutcome> {
        page.navigate(url, self.timing.navigation)?;

        let (low, high) = self.timing.settle_ms;
        let settle = if high > low {
            rand::thread_rng().gen_range(low..high)
        } else {
            low
        };
        page.pause(Duration::from_millis(settle));

        let state = self.detector.inspect(page)?;
        match self
            .detector
            .resolve(page, state, self.timing.challenge_wait)?
        {
            PageState::NoResults if !self.has_cards(page)? => return Ok(ExtractionOutcome::Empty),
            PageState::Blocked(reason) | PageState::ChallengePending(reason) => {
                return Ok(ExtractionOutcome::Blocked(reason))
            }
            // An empty-results phrase next to real cards belongs to some other widget
            PageState::NoResults | PageState::Ok => {}
        }

        if let Err(e) = page.run_script(CONSENT_SCRIPT) {
            debug!("consent dismissal failed: {:#}", e);
        }

        if !page.wait_for(&self.rules.cards.any_of(), self.timing.card_wait) {
            // The empty-results banner can render after the first classification
            return Ok(match self.detector.inspect(page)? {
                PageState::NoResults => ExtractionOutcome::Empty,
                PageState::Blocked(reason) | PageState::ChallengePending(reason) => {
                    ExtractionOutcome::Blocked(reason)
                }
                PageState::Ok => ExtractionOutcome::transient(format!(
                    "no listing cards within {}s",
                    self.timing.card_wait.as_secs()
                )),
            });
        }

        let html = page.content()?;
        let cards = extract_cards(&html, &self.rules);
        let found = cards.len();
        let listings = normalize_all(
            self.platform,
            cards.into_iter().map(RawListingRecord::Card),
        );
        info!(platform = %self.platform, cards = found, listings = listings.len(), "search page extracted");
        Ok(ExtractionOutcome::from_listings(listings))
    }

    fn has_cards(&self, page: &dyn RenderedPage) -> Result<bool> {
        let html = page.content()?;
        Ok(self.rules.cards.is_present(&Html::parse_document(&html)))
    }
}

impl BrowserAttempt for SearchPageAttempt {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&self, page: &dyn RenderedPage, profile: &SearchProfile) -> ExtractionOutcome {
        let Some(url) = (self.search_url)(profile) else {
            warn!(platform = %self.platform, profile_id = profile.id, "no search URL for profile, skipping");
            return ExtractionOutcome::Empty;
        };

        info!(platform = %self.platform, profile_id = profile.id, "🌐 Opening {}", url);
        match self.visit(page, &url) {
            Ok(outcome) => outcome,
            Err(e) => ExtractionOutcome::transient(format!("{:#}", e)),
        }
    }
}

/// `base` with the given query pairs, percent-encoded; no `?` when there are none
pub fn with_query(base: &str, pairs: &[(&str, String)]) -> Option<String> {
    let mut url = Url::parse(base).ok()?;
    if !pairs.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())));
    }
    Some(url.into())
}
