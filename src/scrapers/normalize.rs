//! Raw platform records to canonical [`Listing`]s.

use crate::models::{Listing, Platform};
use crate::scrapers::extract::RawCard;
use crate::scrapers::{bienici, leboncoin, seloger};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

/// Platform-specific intermediate shape, discarded after normalization
#[derive(Debug, Clone)]
pub enum RawListingRecord {
    Card(RawCard),
    Json(Value),
}

/// Ordered JSON pointers per canonical field; the first pointer with a usable value wins
pub struct JsonRules {
    pub id: &'static [&'static str],
    pub title: &'static [&'static str],
    pub description: &'static [&'static str],
    pub price: &'static [&'static str],
    pub surface: &'static [&'static str],
    pub rooms: &'static [&'static str],
    pub city: &'static [&'static str],
    pub postal_code: &'static [&'static str],
    pub neighborhood: &'static [&'static str],
    pub address: &'static [&'static str],
    pub latitude: &'static [&'static str],
    pub longitude: &'static [&'static str],
    pub photos: &'static [&'static str],
    pub energy_rating: &'static [&'static str],
    pub furnished: &'static [&'static str],
    pub published_at: &'static [&'static str],
    pub url: &'static [&'static str],
    /// Canonical detail URL when the record carries none
    pub detail_url: fn(&str) -> String,
}

fn json_rules(platform: Platform) -> Option<&'static JsonRules> {
    match platform {
        Platform::Bienici => Some(&bienici::JSON_RULES),
        Platform::Seloger => Some(&seloger::JSON_RULES),
        Platform::Leboncoin => Some(&leboncoin::JSON_RULES),
        Platform::Pap => None,
    }
}

pub fn normalize(platform: Platform, record: RawListingRecord) -> Option<Listing> {
    match record {
        RawListingRecord::Card(card) => from_card(platform, card),
        RawListingRecord::Json(value) => json_rules(platform).and_then(|rules| from_json(platform, &value, rules)),
    }
}

/// Normalize a batch, dropping records that lack the required fields
pub fn normalize_all(platform: Platform, records: impl IntoIterator<Item = RawListingRecord>) -> Vec<Listing> {
    let mut dropped = 0usize;
    let listings: Vec<Listing> = records
        .into_iter()
        .filter_map(|record| {
            let listing = normalize(platform, record);
            if listing.is_none() {
                dropped += 1;
            }
            listing
        })
        .collect();
    if dropped > 0 {
        debug!(%platform, dropped, kept = listings.len(), "records without id or price dropped");
    }
    listings
}

fn from_card(platform: Platform, card: RawCard) -> Option<Listing> {
    if card.external_id.is_empty() || card.url.is_empty() {
        return None;
    }
    let price = parse_price(&card.price_text).filter(|p| *p > 0)?;

    let (city, postal_code) = card
        .location
        .as_deref()
        .map(split_location)
        .unwrap_or_default();
    let scanned = format!("{} {}", card.title.as_deref().unwrap_or_default(), card.details);
    let surface = parse_surface(&card.details).or_else(|| parse_surface(&scanned));
    let rooms = parse_rooms(&card.details).or_else(|| parse_rooms(&scanned));

    let title = card
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| compose_title(city.as_deref(), postal_code.as_deref(), rooms, surface));

    let mut listing = Listing::new(platform, card.external_id, title, price, card.url);
    listing.description = card.description;
    listing.surface = surface;
    listing.rooms = rooms;
    listing.city = city;
    listing.postal_code = postal_code;
    listing.furnished = detect_furnished(&scanned);
    listing.photos = card.image.into_iter().collect();
    Some(listing)
}

fn from_json(platform: Platform, value: &Value, rules: &JsonRules) -> Option<Listing> {
    let id = id_at(value, rules.id)?;
    let price = price_at(value, rules.price).filter(|p| *p > 0)?;

    let surface = number_at(value, rules.surface);
    let rooms = number_at(value, rules.rooms).map(|r| r.round() as i64);
    let city = text_at(value, rules.city);
    let postal_code = text_at(value, rules.postal_code);

    let title = text_at(value, rules.title)
        .unwrap_or_else(|| compose_title(city.as_deref(), postal_code.as_deref(), rooms, surface));
    let url = text_at(value, rules.url)
        .filter(|u| u.starts_with("http"))
        .unwrap_or_else(|| (rules.detail_url)(&id));

    let mut listing = Listing::new(platform, id, title, price, url);
    listing.description = text_at(value, rules.description);
    listing.surface = surface;
    listing.rooms = rooms;
    listing.city = city;
    listing.postal_code = postal_code;
    listing.neighborhood = text_at(value, rules.neighborhood);
    listing.address = text_at(value, rules.address);
    listing.latitude = number_at(value, rules.latitude);
    listing.longitude = number_at(value, rules.longitude);
    listing.photos = photos_at(value, rules.photos);
    listing.energy_rating = text_at(value, rules.energy_rating);
    listing.furnished = rules
        .furnished
        .iter()
        .find_map(|ptr| value.pointer(ptr).and_then(Value::as_bool));
    if let Some(published) = text_at(value, rules.published_at).and_then(|s| parse_timestamp(&s)) {
        listing.published_at = published;
    }
    Some(listing)
}

fn id_at(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|ptr| match value.pointer(ptr)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => n
            .as_u64()
            .map(|n| n.to_string())
            .or_else(|| n.as_i64().map(|n| n.to_string())),
        _ => None,
    })
}

fn text_at(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|ptr| match value.pointer(ptr)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn number_at(value: &Value, pointers: &[&str]) -> Option<f64> {
    pointers.iter().find_map(|ptr| match value.pointer(ptr)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_decimal(s),
        _ => None,
    })
}

fn price_at(value: &Value, pointers: &[&str]) -> Option<i64> {
    fn coerce(v: &Value) -> Option<i64> {
        match v {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => parse_price(s),
            Value::Array(items) => items.first().and_then(coerce),
            _ => None,
        }
    }
    pointers.iter().find_map(|ptr| value.pointer(ptr).and_then(coerce))
}

fn photos_at(value: &Value, pointers: &[&str]) -> Vec<String> {
    let Some(items) = pointers
        .iter()
        .find_map(|ptr| value.pointer(ptr).and_then(Value::as_array))
    else {
        return Vec::new();
    };
    let mut photos: Vec<String> = Vec::new();
    for item in items {
        let url = match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(_) => ["/url", "/url_photo", "/src"]
                .iter()
                .find_map(|ptr| item.pointer(ptr).and_then(Value::as_str)),
            _ => None,
        };
        if let Some(url) = url.filter(|u| u.starts_with("http")) {
            if !photos.iter().any(|p| p == url) {
                photos.push(url.to_string());
            }
        }
    }
    photos
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Digits-only coercion of a localized price: "1 200 €" -> 1200, "950,50 €" -> 950
pub fn parse_price(text: &str) -> Option<i64> {
    let integral = match text.find(',') {
        Some(pos) if text[pos + 1..].starts_with(|c: char| c.is_ascii_digit()) => &text[..pos],
        _ => text,
    };
    let digits: String = integral.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

fn parse_decimal(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    cleaned.replace(',', ".").parse().ok()
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| match Patterns::compile() {
            Ok(patterns) => Some(patterns),
            Err(e) => {
                tracing::error!("normalizer patterns failed to compile: {}", e);
                None
            }
        })
        .as_ref()
}

struct Patterns {
    surface: Regex,
    rooms: Regex,
    studio: Regex,
    t_rooms: Regex,
    city_postal: Regex,
    postal: Regex,
    unfurnished: Regex,
    furnished: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            surface: Regex::new(r"(\d+(?:[.,]\d+)?)\s*m(?:²|2)")?,
            rooms: Regex::new(r"(?i)(\d+)\s*(?:pièces?|pieces?|p\.|pces?\b)")?,
            studio: Regex::new(r"(?i)\bstudio\b")?,
            t_rooms: Regex::new(r"\b[TF](\d)\b")?,
            city_postal: Regex::new(r"([A-ZÀ-Ý][\p{L}'’-]*(?:[ -][A-ZÀ-Ý][\p{L}'’-]*)*)\s*\((\d{5})\)")?,
            postal: Regex::new(r"\b(\d{5})\b")?,
            unfurnished: Regex::new(r"(?i)\bnon[- ]meubl[ée]")?,
            furnished: Regex::new(r"(?i)\bmeubl[ée]")?,
        })
    }
}

/// `<N> m²` anywhere in free text
pub fn parse_surface(text: &str) -> Option<f64> {
    let caps = patterns()?.surface.captures(text)?;
    caps[1].replace(',', ".").parse().ok()
}

/// `<N> pièce(s)`, then "studio", then the T2/F3 shorthand
pub fn parse_rooms(text: &str) -> Option<i64> {
    let p = patterns()?;
    if let Some(caps) = p.rooms.captures(text) {
        return caps[1].parse().ok();
    }
    if p.studio.is_match(text) {
        return Some(1);
    }
    p.t_rooms.captures(text).and_then(|caps| caps[1].parse().ok())
}

/// "Saint-Étienne (42000)" or "Paris 75011" -> (city, postal code)
pub fn split_location(text: &str) -> (Option<String>, Option<String>) {
    let Some(p) = patterns() else {
        return (None, None);
    };
    if let Some(caps) = p.city_postal.captures(text) {
        return (Some(caps[1].trim().to_string()), Some(caps[2].to_string()));
    }

    let postal = p.postal.captures(text).map(|caps| caps[1].to_string());
    let city = match &postal {
        Some(code) => text.replacen(code.as_str(), "", 1),
        None => text.to_string(),
    };
    let city = city
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '-' | '(' | ')'))
        .to_string();
    ((!city.is_empty()).then_some(city), postal)
}

pub fn detect_furnished(text: &str) -> Option<bool> {
    let p = patterns()?;
    if p.unfurnished.is_match(text) {
        Some(false)
    } else if p.furnished.is_match(text) {
        Some(true)
    } else {
        None
    }
}

fn compose_title(city: Option<&str>, postal_code: Option<&str>, rooms: Option<i64>, surface: Option<f64>) -> String {
    let mut parts = vec![city.unwrap_or("Logement").to_string()];
    if let Some(code) = postal_code {
        parts.push(format!("({})", code));
    }
    if let Some(rooms) = rooms {
        parts.push(format!("{} pièce{}", rooms, if rooms > 1 { "s" } else { "" }));
    }
    if let Some(surface) = surface {
        if surface.fract() == 0.0 {
            parts.push(format!("{} m²", surface as i64));
        } else {
            parts.push(format!("{} m²", surface));
        }
    }
    parts.join(" ")
}
