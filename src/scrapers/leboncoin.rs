use crate::models::{Platform, SearchProfile};
use crate::scrapers::browser::SessionMode;
use crate::scrapers::extract::{CardRules, SelectorChain};
use crate::scrapers::normalize::JsonRules;
use crate::scrapers::search_page::{with_query, SearchPageAttempt};
use crate::scrapers::traits::{Attempt, PendingIntegration, PlatformStrategy};
use crate::scrapers::StrategyOptions;
use anyhow::Result;
use regex::Regex;
use std::sync::Arc;

pub const BASE_URL: &str = "https://www.leboncoin.fr";

/// Finder API ad objects
pub static JSON_RULES: JsonRules = JsonRules {
    id: &["/list_id", "/id"],
    title: &["/subject", "/title"],
    description: &["/body"],
    price: &["/price"],
    surface: &["/surface"],
    rooms: &["/rooms"],
    city: &["/location/city"],
    postal_code: &["/location/zipcode"],
    neighborhood: &["/location/district"],
    address: &["/location/city_label"],
    latitude: &["/location/lat"],
    longitude: &["/location/lng"],
    photos: &["/images/urls_large", "/images/urls"],
    energy_rating: &["/energy_rate"],
    furnished: &["/furnished"],
    published_at: &["/first_publication_date", "/index_date"],
    url: &["/url"],
    detail_url: detail_url,
};

fn detail_url(id: &str) -> String {
    format!("{}/ad/locations/{}", BASE_URL, id)
}

/// Leboncoin sits behind Datadome. The finder API needs a signed session we
/// do not have yet, so the real work is done by the search page in a
/// long-lived profile that keeps its cookies between runs.
pub fn strategy(options: &StrategyOptions) -> Result<PlatformStrategy> {
    let page = SearchPageAttempt::new(
        "leboncoin-search-page",
        Platform::Leboncoin,
        search_url,
        card_rules()?,
        options.timing.clone(),
    )?;
    Ok(PlatformStrategy::new(
        Platform::Leboncoin,
        SessionMode::Persistent,
        vec![
            // TODO: POST api.leboncoin.fr/finder/search once the api_key header can be obtained
            Attempt::Direct(Arc::new(PendingIntegration {
                name: "leboncoin-finder-api",
            })),
            Attempt::Browser(Arc::new(page)),
        ],
    ))
}

/// "min-max" with the site's open-ended placeholders
fn range(min: Option<i64>, max: Option<i64>) -> Option<String> {
    if min.is_none() && max.is_none() {
        return None;
    }
    let min = min.map_or_else(|| "min".to_string(), |v| v.to_string());
    let max = max.map_or_else(|| "max".to_string(), |v| v.to_string());
    Some(format!("{}-{}", min, max))
}

pub fn search_url(profile: &SearchProfile) -> Option<String> {
    let city = profile.city.as_deref().map(str::trim).filter(|c| !c.is_empty())?;
    let category = if profile.is_rental() { "10" } else { "9" };

    let mut pairs = vec![("category", category.to_string()), ("locations", city.to_string())];
    if let Some(price) = range(profile.min_budget, profile.max_budget) {
        pairs.push(("price", price));
    }
    if let Some(square) = range(profile.min_surface, profile.max_surface) {
        pairs.push(("square", square));
    }
    if let Some(rooms) = range(profile.min_rooms, profile.max_rooms) {
        pairs.push(("rooms", rooms));
    }
    if profile.furnished == Some(true) {
        pairs.push(("furnished", "1".to_string()));
    }
    pairs.push(("sort", "time".to_string()));
    pairs.push(("order", "desc".to_string()));

    with_query(&format!("{}/recherche", BASE_URL), &pairs)
}

pub fn card_rules() -> Result<CardRules> {
    Ok(CardRules {
        cards: SelectorChain::new(
            "leboncoin.cards",
            &[
                r#"a[data-test-id="adListCard"]"#,
                r#"[data-qa-id="aditem_container"]"#,
                r#"a[href*="/ad/locations/"]"#,
                r#"a[href*="/ad/ventes_immobilieres/"]"#,
            ],
        )?,
        link: SelectorChain::new("leboncoin.link", &[r#"a[href*="/ad/"]"#])?,
        link_marker: "/ad/",
        id_pattern: Regex::new(r"/(\d+)(?:\.htm)?(?:[?#]|$)")?,
        base_url: BASE_URL,
        title: Some(SelectorChain::new(
            "leboncoin.title",
            &[r#"[data-test-id="adTitle"]"#, r#"p[data-qa-id="aditem_title"]"#, "h2"],
        )?),
        price: SelectorChain::new(
            "leboncoin.price",
            &[
                r#"[data-test-id="adPrice"]"#,
                r#"[data-qa-id="aditem_price"]"#,
                r#"span[aria-label*="prix"]"#,
            ],
        )?,
        details: None,
        location: Some(SelectorChain::new(
            "leboncoin.location",
            &[
                r#"[data-test-id="adLocation"]"#,
                r#"[data-qa-id="aditem_location"]"#,
                r#"p[aria-label*="Localisation"]"#,
            ],
        )?),
        description: None,
        image: SelectorChain::new("leboncoin.image", &["img"])?,
    })
}
