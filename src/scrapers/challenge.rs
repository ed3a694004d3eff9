//! Anti-bot interstitial detection by signature matching.
//!
//! Classification looks at three things, in this order: an empty-results
//! phrase in the visible text, hard-block signatures, then signatures of
//! challenges that may still clear on their own.

use crate::scrapers::traits::RenderedPage;
use rand::Rng;
use regex::Regex;
use scraper::{Html, Node};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Ok,
    /// The site says explicitly that nothing matches
    NoResults,
    /// An interstitial that may clear after a wait
    ChallengePending(String),
    Blocked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Pending,
    Blocked,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Title,
    Markup,
}

#[derive(Debug, Clone)]
struct Signature {
    name: &'static str,
    target: Target,
    severity: Severity,
    pattern: Regex,
}

/// (name, target, severity, case-insensitive pattern)
const SIGNATURES: &[(&str, Target, Severity, &str)] = &[
    ("akamai", Target::Title, Severity::Blocked, r"access denied|accès refusé"),
    ("cloudflare", Target::Title, Severity::Blocked, r"attention required"),
    ("imperva", Target::Title, Severity::Blocked, r"pardon our interruption"),
    ("robot check", Target::Title, Severity::Blocked, r"\brobot\b"),
    ("akamai", Target::Markup, Severity::Blocked, r"errors\.edgesuite\.net"),
    ("cloudflare", Target::Title, Severity::Pending, r"just a moment|un instant|checking your browser|vérification"),
    ("cloudflare", Target::Markup, Severity::Pending, r"cf-challenge|challenge-platform|cf_chl_opt"),
    ("datadome", Target::Markup, Severity::Pending, r"captcha-delivery\.com|<iframe[^>]+datadome"),
    ("perimeterx", Target::Markup, Severity::Pending, r"px-captcha"),
];

const NO_RESULTS: &str = r"aucune annonce|aucun résultat|pas de résultat|\b0 résultat";

#[derive(Debug, Clone)]
pub struct ChallengeDetector {
    signatures: Vec<Signature>,
    no_results: Regex,
    title: Regex,
}

impl ChallengeDetector {
    pub fn new() -> Result<Self, regex::Error> {
        let signatures = SIGNATURES
            .iter()
            .map(|&(name, target, severity, pattern)| {
                Ok(Signature {
                    name,
                    target,
                    severity,
                    pattern: Regex::new(&format!("(?i){}", pattern))?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            signatures,
            no_results: Regex::new(&format!("(?i){}", NO_RESULTS))?,
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>")?,
        })
    }

    /// Process-wide instance for code that only sees raw response bodies
    pub fn shared() -> Option<&'static ChallengeDetector> {
        static DETECTOR: OnceLock<Option<ChallengeDetector>> = OnceLock::new();
        DETECTOR
            .get_or_init(|| match Self::new() {
                Ok(detector) => Some(detector),
                Err(e) => {
                    error!("challenge signatures failed to compile: {}", e);
                    None
                }
            })
            .as_ref()
    }

    /// Classify a raw HTML document, reading the title from its markup
    pub fn classify_document(&self, html: &str) -> PageState {
        let title = self
            .title
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map_or("", |m| m.as_str());
        self.classify(title, html)
    }

    pub fn classify(&self, title: &str, html: &str) -> PageState {
        if self.no_results.is_match(&visible_text(html)) {
            return PageState::NoResults;
        }

        let mut pending = None;
        for signature in &self.signatures {
            let haystack = match signature.target {
                Target::Title => title,
                Target::Markup => html,
            };
            if !signature.pattern.is_match(haystack) {
                continue;
            }
            let reason = format!("{} ({})", signature.name, describe(signature.target, title));
            match signature.severity {
                Severity::Blocked => return PageState::Blocked(reason),
                Severity::Pending => {
                    pending.get_or_insert(reason);
                }
            }
        }

        match pending {
            Some(reason) => PageState::ChallengePending(reason),
            None => PageState::Ok,
        }
    }

    /// Classify the live page
    pub fn inspect(&self, page: &dyn RenderedPage) -> anyhow::Result<PageState> {
        let title = page.title()?;
        let html = page.content()?;
        Ok(self.classify(&title, &html))
    }

    /// Give a pending challenge one bounded chance to clear.
    ///
    /// Moves the pointer a few times, waits `wait`, and classifies again. A
    /// challenge that is still there is reported as `Blocked`.
    pub fn resolve(&self, page: &dyn RenderedPage, state: PageState, wait: Duration) -> anyhow::Result<PageState> {
        let reason = match state {
            PageState::ChallengePending(reason) => reason,
            other => return Ok(other),
        };

        info!(%reason, wait_secs = wait.as_secs(), "challenge detected, waiting");
        let mut rng = rand::thread_rng();
        for _ in 0..5 {
            let x = 200.0 + rng.gen_range(0.0..600.0);
            let y = 200.0 + rng.gen_range(0.0..400.0);
            if let Err(e) = page.move_pointer(x, y) {
                debug!("pointer move failed: {:#}", e);
                break;
            }
            page.pause(Duration::from_millis(rng.gen_range(1000..3000)));
        }
        page.pause(wait);

        Ok(match self.inspect(page)? {
            PageState::ChallengePending(still) => PageState::Blocked(format!("{} did not clear", still)),
            other => other,
        })
    }
}

fn describe(target: Target, title: &str) -> String {
    match target {
        Target::Title => format!("title \"{}\"", title.trim()),
        Target::Markup => "page markup".to_string(),
    }
}

/// Text nodes of the document, minus script and style contents
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();
    for node in document.tree.nodes() {
        let Node::Text(chunk) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|el| el.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript" | "template"));
        if !hidden {
            text.push_str(chunk);
            text.push(' ');
        }
    }
    text
}
