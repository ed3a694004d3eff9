//! Client for the two catalog contracts the engine depends on: reading
//! search profiles and importing listings.

pub mod types;

pub use types::{ImportSummary, ItemError};

use crate::error::CatalogError;
use crate::models::{Listing, SearchProfile};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use types::ImportRequest;

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Where search criteria come from
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Profiles flagged `needs_scrape`
    async fn pending_profiles(&self) -> Result<Vec<SearchProfile>>;

    async fn active_profiles(&self) -> Result<Vec<SearchProfile>>;

    /// Clear the pending flag; idempotent on the catalog side
    async fn acknowledge(&self, profile_id: i64) -> Result<()>;
}

/// Where extracted listings go
#[async_trait]
pub trait ListingSink: Send + Sync {
    async fn import_batch(&self, listings: &[Listing]) -> Result<ImportSummary>;
}

pub struct CatalogClient {
    client: Client,
    base_url: String,
    token: String,
}

impl CatalogClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self> {
        url::Url::parse(base_url).map_err(|_| CatalogError::InvalidUrl(base_url.to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("listing-scout/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(CatalogError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}

#[async_trait]
impl ProfileSource for CatalogClient {
    async fn pending_profiles(&self) -> Result<Vec<SearchProfile>> {
        let profiles: Vec<SearchProfile> = self.get_json("/search_profiles/pending").await?;
        debug!(count = profiles.len(), "pending profiles fetched");
        Ok(profiles)
    }

    async fn active_profiles(&self) -> Result<Vec<SearchProfile>> {
        let profiles: Vec<SearchProfile> = self.get_json("/search_profiles").await?;
        debug!(count = profiles.len(), "active profiles fetched");
        Ok(profiles)
    }

    async fn acknowledge(&self, profile_id: i64) -> Result<()> {
        let resp = self
            .client
            .patch(self.url(&format!("/search_profiles/{}/scraped", profile_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl ListingSink for CatalogClient {
    async fn import_batch(&self, listings: &[Listing]) -> Result<ImportSummary> {
        let resp = self
            .client
            .post(self.url("/listings/import"))
            .bearer_auth(&self.token)
            .json(&ImportRequest { listings })
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}
