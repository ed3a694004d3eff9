//! Listing-card extraction from rendered search pages.
//!
//! Site markup drifts, so every field is described by a [`SelectorChain`]:
//! an ordered list of candidate selectors where the first one that matches
//! wins. A redesign that renames one class usually leaves a later candidate
//! working.

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// Ordered candidate selectors for one field
#[derive(Debug, Clone)]
pub struct SelectorChain {
    name: &'static str,
    candidates: Vec<(String, Selector)>,
}

impl SelectorChain {
    pub fn new(name: &'static str, sources: &[&str]) -> Result<Self> {
        let candidates = sources
            .iter()
            .map(|source| {
                Selector::parse(source)
                    .map(|selector| (source.to_string(), selector))
                    .map_err(|e| anyhow::anyhow!("{}: {}", source, e))
                    .with_context(|| format!("invalid selector in rule '{}'", name))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { name, candidates })
    }

    /// Candidate sources joined into one selector group, for waiting on any of them
    pub fn any_of(&self) -> String {
        self.candidates
            .iter()
            .map(|(source, _)| source.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Whether any candidate matches somewhere in the document
    pub fn is_present(&self, document: &Html) -> bool {
        self.candidates
            .iter()
            .any(|(_, selector)| document.select(selector).next().is_some())
    }

    /// All document matches of the first candidate that matches anything
    pub fn select_all<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        for (source, selector) in &self.candidates {
            let found: Vec<_> = document.select(selector).collect();
            if !found.is_empty() {
                debug!(rule = self.name, selector = %source, count = found.len(), "rule matched");
                return found;
            }
        }
        Vec::new()
    }

    /// First match inside `scope`, the scope element itself included
    pub fn first<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.candidates.iter().find_map(|(_, selector)| {
            if selector.matches(&scope) {
                Some(scope)
            } else {
                scope.select(selector).next()
            }
        })
    }

    /// Every match inside `scope` for the first candidate that matches
    pub fn within<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        for (_, selector) in &self.candidates {
            let found: Vec<_> = scope.select(selector).collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Trimmed text of the first non-empty match
    pub fn text(&self, scope: ElementRef<'_>) -> Option<String> {
        self.first(scope).map(element_text).filter(|t| !t.is_empty())
    }
}

/// Extraction rules for one platform's search results page
#[derive(Debug, Clone)]
pub struct CardRules {
    pub cards: SelectorChain,
    pub link: SelectorChain,
    /// Detail links must contain this to count
    pub link_marker: &'static str,
    /// First capture group is the external id
    pub id_pattern: Regex,
    pub base_url: &'static str,
    pub title: Option<SelectorChain>,
    pub price: SelectorChain,
    /// Free-text block scanned for surface and rooms; whole card text when absent
    pub details: Option<SelectorChain>,
    pub location: Option<SelectorChain>,
    pub description: Option<SelectorChain>,
    pub image: SelectorChain,
}

/// DOM text pulled from one listing card, before normalization
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawCard {
    pub external_id: String,
    pub url: String,
    pub title: Option<String>,
    pub price_text: String,
    pub details: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

pub fn extract_cards(html: &str, rules: &CardRules) -> Vec<RawCard> {
    let document = Html::parse_document(html);
    let cards = rules.cards.select_all(&document);

    let mut out = Vec::with_capacity(cards.len());
    for (idx, card) in cards.into_iter().enumerate() {
        match extract_card(card, rules) {
            Some(raw) => out.push(raw),
            None => debug!(idx, "card skipped: no usable link or price"),
        }
    }
    out
}

fn extract_card(card: ElementRef<'_>, rules: &CardRules) -> Option<RawCard> {
    let href = rules
        .link
        .first(card)
        .and_then(|link| link.value().attr("href"))
        .filter(|href| href.contains(rules.link_marker))?;
    let external_id = rules.id_pattern.captures(href)?.get(1)?.as_str().to_string();

    let price_text = rules.price.text(card)?;
    if !price_text.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let details = match &rules.details {
        Some(chain) => chain
            .within(card)
            .into_iter()
            .map(element_text)
            .collect::<Vec<_>>()
            .join(" "),
        None => element_text(card),
    };

    Some(RawCard {
        external_id,
        url: absolute_url(rules.base_url, href),
        title: rules.title.as_ref().and_then(|chain| chain.text(card)),
        price_text,
        details,
        location: rules.location.as_ref().and_then(|chain| chain.text(card)),
        description: rules.description.as_ref().and_then(|chain| chain.text(card)),
        image: first_image(card, &rules.image),
    })
}

fn first_image(card: ElementRef<'_>, chain: &SelectorChain) -> Option<String> {
    chain.within(card).into_iter().find_map(|img| {
        let el = img.value();
        el.attr("src")
            .into_iter()
            .chain(el.attr("data-src"))
            .find(|src| src.starts_with("http") && !src.contains("logo") && !src.contains("icon"))
            .map(str::to_string)
    })
}

/// Whitespace-collapsed text content
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), href)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href)
    }
}
