use crate::models::{Platform, SearchProfile};
use crate::scrapers::browser::SessionMode;
use crate::scrapers::extract::{CardRules, SelectorChain};
use crate::scrapers::normalize::{normalize_all, JsonRules, RawListingRecord};
use crate::scrapers::search_page::{with_query, SearchPageAttempt};
use crate::scrapers::traits::{Attempt, DirectAttempt, PlatformStrategy};
use crate::scrapers::types::ExtractionOutcome;
use crate::scrapers::{fetch_json, records_at, StrategyOptions};
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::sync::Arc;
use tracing::{debug, info};

pub const BASE_URL: &str = "https://www.seloger.com";
pub const API_URL: &str = "https://api-seloger.svc.groupe-seloger.com/api/v1/listings";
const APP_USER_AGENT: &str = "SeLoger/14.5.0 (iPhone; iOS 17.2; Scale/3.00)";

/// Mobile API locality ids, keyed by city slug
const LOCALITY_IDS: &[(&str, &str)] = &[
    ("paris", "250"),
    ("lyon", "69123"),
    ("marseille", "13055"),
    ("bordeaux", "33063"),
    ("toulouse", "31555"),
    ("nantes", "44109"),
    ("lille", "59350"),
    ("montpellier", "34172"),
    ("nice", "6088"),
];

/// Search page `places` codes, keyed by city slug
const INSEE_CODES: &[(&str, &str)] = &[
    ("saint-etienne", "420218"),
    ("paris", "750056"),
    ("lyon", "690123"),
    ("marseille", "130055"),
    ("toulouse", "310555"),
    ("bordeaux", "330063"),
    ("nantes", "440109"),
    ("lille", "590350"),
];

pub static JSON_RULES: JsonRules = JsonRules {
    id: &["/id", "/listingId"],
    title: &["/title"],
    description: &["/description"],
    price: &["/price", "/rentPrice", "/pricing/price"],
    surface: &["/surface", "/livingArea"],
    rooms: &["/rooms", "/roomCount"],
    city: &["/city", "/cityLabel"],
    postal_code: &["/zipcode", "/zipCode", "/postalCode"],
    neighborhood: &["/district", "/districtLabel"],
    address: &["/address"],
    latitude: &["/latitude", "/coordinates/latitude"],
    longitude: &["/longitude", "/coordinates/longitude"],
    photos: &["/photos"],
    energy_rating: &["/energyPerformanceDiagnostic", "/energyClass"],
    furnished: &["/isFurnished", "/furnished"],
    published_at: &["/publicationDate"],
    url: &["/permalink", "/url"],
    detail_url: detail_url,
};

fn detail_url(id: &str) -> String {
    format!("{}/annonces/{}.htm", BASE_URL, id)
}

/// Look a slug up in a city table, falling back to its first segment
/// ("paris-11e" -> "paris")
fn lookup(table: &[(&str, &'static str)], slug: &str) -> Option<&'static str> {
    let first = slug.split('-').next().unwrap_or(slug);
    table
        .iter()
        .find(|(city, _)| *city == slug)
        .or_else(|| table.iter().find(|(city, _)| *city == first))
        .map(|(_, code)| *code)
}

/// SeLoger is fronted by Akamai. The iPhone app API is tried first; the
/// search page fallback needs the persistent profile to get through.
pub fn strategy(options: &StrategyOptions) -> Result<PlatformStrategy> {
    let page = SearchPageAttempt::new(
        "seloger-search-page",
        Platform::Seloger,
        search_url,
        card_rules()?,
        options.timing.clone(),
    )?;
    Ok(PlatformStrategy::new(
        Platform::Seloger,
        SessionMode::Persistent,
        vec![
            Attempt::Direct(Arc::new(MobileApi::new(API_URL))),
            Attempt::Browser(Arc::new(page)),
        ],
    ))
}

/// The listings endpoint used by the iOS app
pub struct MobileApi {
    endpoint: String,
}

impl MobileApi {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn query(profile: &SearchProfile, locality: &str) -> Vec<(&'static str, String)> {
        let realty_type = match profile.property_type.as_deref() {
            Some("house") => "2",
            _ => "1",
        };
        let mut query = vec![
            ("transactionType", if profile.is_rental() { "1" } else { "2" }.to_string()),
            ("realtyTypes", realty_type.to_string()),
            ("localityIds", locality.to_string()),
        ];
        let bounds = [
            ("minimumPrice", profile.min_budget),
            ("maximumPrice", profile.max_budget),
            ("minimumSurface", profile.min_surface),
            ("maximumSurface", profile.max_surface),
            ("minimumRooms", profile.min_rooms),
            ("maximumRooms", profile.max_rooms),
        ];
        for (key, value) in bounds {
            if let Some(value) = value {
                query.push((key, value.to_string()));
            }
        }
        // Unfurnished profiles search everything
        if profile.furnished == Some(true) {
            query.push(("furnished", "true".to_string()));
        }
        query.push(("sortBy", "publicationDate-desc".to_string()));
        query.push(("pageSize", "25".to_string()));
        query
    }
}

#[async_trait]
impl DirectAttempt for MobileApi {
    fn name(&self) -> &'static str {
        "seloger-mobile-api"
    }

    async fn run(&self, http: &reqwest::Client, profile: &SearchProfile) -> ExtractionOutcome {
        let Some(locality) = profile
            .city_slug()
            .and_then(|slug| lookup(LOCALITY_IDS, &slug))
        else {
            debug!(profile_id = profile.id, city = ?profile.city, "no SeLoger locality id for city");
            return ExtractionOutcome::Empty;
        };

        let request = http
            .get(&self.endpoint)
            .query(&Self::query(profile, locality))
            .header(USER_AGENT, APP_USER_AGENT)
            .header(ACCEPT, "application/json")
            .header(ACCEPT_LANGUAGE, "fr-FR");

        let body = match fetch_json(request).await {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        let records = records_at(&body, &["/items", "/results", "/listings"]);
        let listings = normalize_all(
            Platform::Seloger,
            records.iter().cloned().map(RawListingRecord::Json),
        );
        info!(profile_id = profile.id, records = records.len(), listings = listings.len(), "SeLoger API answered");
        ExtractionOutcome::from_listings(listings)
    }
}

/// "min/max" with `NaN` for an open end
fn range(min: Option<i64>, max: Option<i64>) -> Option<String> {
    if min.is_none() && max.is_none() {
        return None;
    }
    let end = |v: Option<i64>| v.map_or_else(|| "NaN".to_string(), |v| v.to_string());
    Some(format!("{}/{}", end(min), end(max)))
}

pub fn search_url(profile: &SearchProfile) -> Option<String> {
    let insee = lookup(INSEE_CODES, &profile.city_slug()?)?;

    let mut pairs = vec![
        ("projects", if profile.is_rental() { "1" } else { "2" }.to_string()),
        ("types", "1,2".to_string()),
        ("natures", "1,2,4".to_string()),
        ("places", format!("[{{\"inseeCodes\":[{}]}}]", insee)),
    ];
    if let Some(price) = range(profile.min_budget, profile.max_budget) {
        pairs.push(("price", price));
    }
    if let Some(surface) = range(profile.min_surface, profile.max_surface) {
        pairs.push(("surface", surface));
    }
    if let Some(rooms) = range(profile.min_rooms, profile.max_rooms) {
        pairs.push(("rooms", rooms));
    }
    pairs.push(("enterprise", "0".to_string()));
    pairs.push(("qsVersion", "1.0".to_string()));

    with_query(&format!("{}/list.htm", BASE_URL), &pairs)
}

pub fn card_rules() -> Result<CardRules> {
    Ok(CardRules {
        cards: SelectorChain::new(
            "seloger.cards",
            &[r#"[data-testid="sl.explore.card-container"]"#, r#"[data-test="sl.card-container"]"#],
        )?,
        link: SelectorChain::new(
            "seloger.link",
            &[r#"a[data-testid="sl.explore.coveringLink"]"#, r#"a[href*="/annonces/"]"#],
        )?,
        link_marker: "/annonces/",
        id_pattern: Regex::new(r"/(\d+)\.htm")?,
        base_url: BASE_URL,
        title: Some(SelectorChain::new(
            "seloger.title",
            &[r#"[data-test="sl.title"]"#, r#"[data-testid="sl.explore.card-title"]"#],
        )?),
        price: SelectorChain::new(
            "seloger.price",
            &[r#"[data-test="sl.price-label"]"#, r#"[data-testid="sl.price-label"]"#],
        )?,
        details: Some(SelectorChain::new(
            "seloger.tags",
            &[r#"[data-test="sl.tags"] li"#, r#"ul[data-testid="sl.explore.card-tags"] li"#],
        )?),
        location: Some(SelectorChain::new(
            "seloger.location",
            &[r#"[data-test="sl.address"]"#, r#"[data-testid="sl.explore.card-address"]"#],
        )?),
        description: Some(SelectorChain::new(
            "seloger.description",
            &[r#"[data-testid="sl.explore.card-description"]"#],
        )?),
        image: SelectorChain::new("seloger.image", &[r#"img[src*="seloger.com"]"#, "img"])?,
    })
}
