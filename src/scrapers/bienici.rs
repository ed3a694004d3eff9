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
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

pub const BASE_URL: &str = "https://www.bienici.com";
pub const API_URL: &str = "https://www.bien-ici.com/realEstateAds";

/// Zone ids from the autocomplete endpoint, keyed by city slug
const ZONE_IDS: &[(&str, &str)] = &[("paris", "-7444")];

pub static JSON_RULES: JsonRules = JsonRules {
    id: &["/id"],
    title: &["/title"],
    description: &["/description"],
    price: &["/price"],
    surface: &["/surfaceArea", "/area"],
    rooms: &["/roomsQuantity"],
    city: &["/city"],
    postal_code: &["/postalCode"],
    neighborhood: &["/district/name", "/district/libelle", "/district"],
    address: &["/address"],
    latitude: &["/blurInfo/position/lat"],
    longitude: &["/blurInfo/position/lng", "/blurInfo/position/lon"],
    photos: &["/photos"],
    energy_rating: &["/energyClassification"],
    furnished: &["/isFurnished"],
    published_at: &["/publicationDate"],
    url: &["/url"],
    detail_url: detail_url,
};

fn detail_url(id: &str) -> String {
    format!("{}/annonce/{}", BASE_URL, id)
}

fn zone_id(profile: &SearchProfile) -> Option<&'static str> {
    let slug = profile.city_slug()?;
    let first = slug.split('-').next().unwrap_or(&slug).to_string();
    ZONE_IDS
        .iter()
        .find(|(city, _)| *city == slug || *city == first)
        .map(|(_, id)| *id)
}

/// Bien'ici has an open JSON API with no aggressive bot wall; a throwaway
/// headless session covers the cities missing from the zone table.
pub fn strategy(options: &StrategyOptions) -> Result<PlatformStrategy> {
    let page = SearchPageAttempt::new(
        "bienici-search-page",
        Platform::Bienici,
        search_url,
        card_rules()?,
        options.timing.clone(),
    )?;
    Ok(PlatformStrategy::new(
        Platform::Bienici,
        SessionMode::Ephemeral,
        vec![
            Attempt::Direct(Arc::new(RealEstateAdsApi::new(API_URL))),
            Attempt::Browser(Arc::new(page)),
        ],
    ))
}

pub struct RealEstateAdsApi {
    endpoint: String,
}

impl RealEstateAdsApi {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn payload(profile: &SearchProfile, zone_id: &str) -> Value {
        let property_type = match profile.property_type.as_deref() {
            Some("house") => "house",
            _ => "flat",
        };

        let mut filters = Map::new();
        filters.insert(
            "filterType".into(),
            json!(if profile.is_rental() { "rent" } else { "buy" }),
        );
        let bounds = [
            ("minPrice", profile.min_budget),
            ("maxPrice", profile.max_budget),
            ("minArea", profile.min_surface),
            ("maxArea", profile.max_surface),
            ("minRooms", profile.min_rooms),
            ("maxRooms", profile.max_rooms),
        ];
        for (key, value) in bounds {
            if let Some(value) = value {
                filters.insert(key.into(), json!(value));
            }
        }
        if profile.furnished == Some(true) {
            filters.insert("isFurnished".into(), json!(true));
        }

        json!({
            "realEstateTypes": [property_type],
            "filters": filters,
            "zoneIdsByTypes": {"zoneIds": [zone_id]},
            "size": 24,
            "from": 0,
            "sortBy": "publicationDate",
            "sortOrder": "desc"
        })
    }
}

#[async_trait]
impl DirectAttempt for RealEstateAdsApi {
    fn name(&self) -> &'static str {
        "bienici-api"
    }

    async fn run(&self, http: &reqwest::Client, profile: &SearchProfile) -> ExtractionOutcome {
        let Some(zone_id) = zone_id(profile) else {
            debug!(profile_id = profile.id, city = ?profile.city, "no Bien'ici zone id for city");
            return ExtractionOutcome::Empty;
        };

        let request = http
            .post(&self.endpoint)
            .json(&Self::payload(profile, zone_id));
        let body = match fetch_json(request).await {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        let records = records_at(&body, &["/realEstateAds", "/items", "/results"]);
        let listings = normalize_all(
            Platform::Bienici,
            records.iter().cloned().map(RawListingRecord::Json),
        );
        info!(profile_id = profile.id, records = records.len(), listings = listings.len(), "Bien'ici API answered");
        ExtractionOutcome::from_listings(listings)
    }
}

pub fn search_url(profile: &SearchProfile) -> Option<String> {
    let slug = profile.city_slug()?;
    let kind = if profile.is_rental() { "location" } else { "achat" };

    let mut pairs = Vec::new();
    let bounds = [
        ("prix-min", profile.min_budget),
        ("prix-max", profile.max_budget),
        ("surface-min", profile.min_surface),
        ("surface-max", profile.max_surface),
        ("pieces-min", profile.min_rooms),
        ("pieces-max", profile.max_rooms),
    ];
    for (key, value) in bounds {
        if let Some(value) = value {
            pairs.push((key, value.to_string()));
        }
    }

    with_query(&format!("{}/recherche/{}/{}", BASE_URL, kind, slug), &pairs)
}

pub fn card_rules() -> Result<CardRules> {
    Ok(CardRules {
        cards: SelectorChain::new(
            "bienici.cards",
            &[r#"article[class*="Result"]"#, r#"[class*="ListItem"]"#, r#"a[href*="/annonce/"]"#],
        )?,
        link: SelectorChain::new("bienici.link", &[r#"a[href*="/annonce/"]"#])?,
        link_marker: "/annonce/",
        id_pattern: Regex::new(r"/annonce/(?:[\w-]+/)*?([\w-]+)(?:[?#]|$)")?,
        base_url: BASE_URL,
        title: Some(SelectorChain::new("bienici.title", &[r#"[class*="Title"]"#, "h2", "h3"])?),
        price: SelectorChain::new("bienici.price", &[r#"[class*="Price"]"#, r#"[class*="price"]"#])?,
        details: None,
        location: Some(SelectorChain::new(
            "bienici.location",
            &[r#"[class*="City"]"#, r#"[class*="city"]"#, r#"[class*="Location"]"#],
        )?),
        description: Some(SelectorChain::new("bienici.description", &[r#"[class*="Description"]"#])?),
        image: SelectorChain::new("bienici.image", &["img"])?,
    })
}
