use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source site of a listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Leboncoin,
    Seloger,
    Pap,
    Bienici,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Leboncoin,
        Platform::Seloger,
        Platform::Pap,
        Platform::Bienici,
    ];

    /// Key used by the catalog (`platforms` array, `platform` field)
    pub fn key(self) -> &'static str {
        match self {
            Platform::Leboncoin => "leboncoin",
            Platform::Seloger => "seloger",
            Platform::Pap => "pap",
            Platform::Bienici => "bienici",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| p.key() == key)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Rental,
    Sale,
}

/// Search criteria owned by the catalog; read-only for the duration of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchProfile {
    pub id: i64,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub arrondissement: Option<String>,
    #[serde(default)]
    pub min_budget: Option<i64>,
    #[serde(default)]
    pub max_budget: Option<i64>,
    #[serde(default)]
    pub min_surface: Option<i64>,
    #[serde(default)]
    pub max_surface: Option<i64>,
    #[serde(default)]
    pub min_rooms: Option<i64>,
    #[serde(default)]
    pub max_rooms: Option<i64>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub furnished: Option<bool>,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    /// Pending flag: process with priority, then acknowledge
    #[serde(default)]
    pub needs_scrape: bool,
    #[serde(default)]
    pub scraped_at: Option<DateTime<Utc>>,
}

impl SearchProfile {
    /// Anything the catalog does not call a rental is treated as a sale search.
    pub fn transaction(&self) -> TransactionType {
        match self.transaction_type.as_deref().map(str::trim) {
            None | Some("") | Some("rental") | Some("location") | Some("rent") => {
                TransactionType::Rental
            }
            Some(_) => TransactionType::Sale,
        }
    }

    pub fn is_rental(&self) -> bool {
        self.transaction() == TransactionType::Rental
    }

    /// City as it appears in site URLs: "Saint-Étienne" -> "saint-etienne"
    pub fn city_slug(&self) -> Option<String> {
        self.city
            .as_deref()
            .map(slugify)
            .filter(|slug| !slug.is_empty())
    }

    /// Platform keys that map to a known platform, in profile order, without repeats
    pub fn platform_list(&self) -> Vec<Platform> {
        let mut out = Vec::new();
        for key in &self.platforms {
            if let Some(platform) = Platform::from_key(key) {
                if !out.contains(&platform) {
                    out.push(platform);
                }
            }
        }
        out
    }
}

pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.trim().to_lowercase().chars() {
        let mapped = match c {
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'à' | 'â' | 'ä' => 'a',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            c if c.is_whitespace() || c == '\'' || c == '’' => '-',
            c => c,
        };
        if mapped == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(mapped);
    }
    slug.trim_end_matches('-').to_string()
}

/// Canonical listing, the shape the catalog import endpoint accepts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub platform: Platform,
    pub external_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rooms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub photos: Vec<String>,
    /// Energy rating (DPE letter)
    #[serde(rename = "dpe_rating", skip_serializing_if = "Option::is_none")]
    pub energy_rating: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub furnished: Option<bool>,
    pub published_at: DateTime<Utc>,
    pub url: String,
}

impl Listing {
    pub fn new(
        platform: Platform,
        external_id: impl Into<String>,
        title: impl Into<String>,
        price: i64,
        url: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            external_id: external_id.into(),
            title: title.into(),
            description: None,
            price,
            surface: None,
            rooms: None,
            city: None,
            postal_code: None,
            neighborhood: None,
            address: None,
            latitude: None,
            longitude: None,
            photos: Vec::new(),
            energy_rating: None,
            furnished: None,
            published_at: Utc::now(),
            url: url.into(),
        }
    }

    /// Uniqueness key shared with the catalog
    pub fn key(&self) -> (Platform, &str) {
        (self.platform, self.external_id.as_str())
    }
}
