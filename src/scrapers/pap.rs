use crate::models::{Platform, SearchProfile};
use crate::scrapers::browser::SessionMode;
use crate::scrapers::extract::{CardRules, SelectorChain};
use crate::scrapers::search_page::{with_query, SearchPageAttempt};
use crate::scrapers::traits::{Attempt, PlatformStrategy};
use crate::scrapers::StrategyOptions;
use anyhow::Result;
use regex::Regex;
use std::sync::Arc;

pub const BASE_URL: &str = "https://www.pap.fr";

/// PAP has no usable API; the search page is server-rendered and only
/// lightly defended, so a throwaway headless session is enough.
pub fn strategy(options: &StrategyOptions) -> Result<PlatformStrategy> {
    let page = SearchPageAttempt::new(
        "pap-search-page",
        Platform::Pap,
        search_url,
        card_rules()?,
        options.timing.clone(),
    )?;
    Ok(PlatformStrategy::new(
        Platform::Pap,
        SessionMode::Ephemeral,
        vec![Attempt::Browser(Arc::new(page))],
    ))
}

pub fn search_url(profile: &SearchProfile) -> Option<String> {
    let slug = profile.city_slug()?;
    let kind = if profile.is_rental() { "location" } else { "vente" };

    let mut pairs = Vec::new();
    let bounds = [
        ("prix-min", profile.min_budget),
        ("prix-max", profile.max_budget),
        ("surface-min", profile.min_surface),
        ("surface-max", profile.max_surface),
        ("nb-pieces-min", profile.min_rooms),
        ("nb-pieces-max", profile.max_rooms),
    ];
    for (key, value) in bounds {
        if let Some(value) = value {
            pairs.push((key, value.to_string()));
        }
    }

    with_query(
        &format!("{}/annonce/{}-appartement-maison-{}", BASE_URL, kind, slug),
        &pairs,
    )
}

pub fn card_rules() -> Result<CardRules> {
    Ok(CardRules {
        cards: SelectorChain::new("pap.cards", &[".search-list-item-alt", ".search-list-item"])?,
        link: SelectorChain::new("pap.link", &["a.item-title"])?,
        link_marker: "/annonces/",
        id_pattern: Regex::new(r"r(\d+)$")?,
        base_url: BASE_URL,
        // Cards have no headline; the link text is "City (postal)"
        title: None,
        price: SelectorChain::new("pap.price", &[".item-price"])?,
        details: Some(SelectorChain::new("pap.tags", &[".item-tags li"])?),
        location: Some(SelectorChain::new("pap.location", &["a.item-title"])?),
        description: Some(SelectorChain::new("pap.description", &[".item-description"])?),
        image: SelectorChain::new("pap.image", &[".item-thumb-link img", ".owl-item img", "img"])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn profile(value: serde_json::Value) -> SearchProfile {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn rental_url_carries_bounds() {
        let p = profile(serde_json::json!({
            "id": 1, "city": "Saint-Étienne", "min_budget": 400, "max_budget": 800,
            "min_rooms": 2, "transaction_type": "rental"
        }));
        let url = Url::parse(&search_url(&p).unwrap()).unwrap();
        assert_eq!(url.path(), "/annonce/location-appartement-maison-saint-etienne");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            query,
            vec![
                ("prix-min".to_string(), "400".to_string()),
                ("prix-max".to_string(), "800".to_string()),
                ("nb-pieces-min".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn sale_url_uses_vente() {
        let p = profile(serde_json::json!({"id": 1, "city": "Lyon", "transaction_type": "sale"}));
        assert_eq!(
            search_url(&p).unwrap(),
            "https://www.pap.fr/annonce/vente-appartement-maison-lyon"
        );
    }

    #[test]
    fn strategy_is_browser_only() {
        let strategy = strategy(&StrategyOptions::default()).unwrap();
        assert!(matches!(strategy.attempts[..], [Attempt::Browser(_)]));
        assert_eq!(strategy.session_mode, SessionMode::Ephemeral);
        assert_eq!(strategy.attempts.len(), 1);
    }
}
