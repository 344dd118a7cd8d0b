use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EtsyCredentials;

const ACTIVE_LISTINGS_LIMIT: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_IMAGE_FETCHES_IN_FLIGHT: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EtsyMoney {
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub divisor: i64,
    #[serde(default)]
    pub currency_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EtsyImage {
    #[serde(default)]
    pub url_fullxfull: Option<String>,
    #[serde(default, rename = "url_570xN")]
    pub url_570x_n: Option<String>,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub full_width: Option<u32>,
    #[serde(default)]
    pub full_height: Option<u32>,
    #[serde(default)]
    pub rank: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EtsyListing {
    pub listing_id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<EtsyMoney>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub materials: Option<Vec<String>>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_timestamp: Option<i64>,
    #[serde(default)]
    pub updated_timestamp: Option<i64>,
    #[serde(default)]
    pub images: Option<Vec<EtsyImage>>,
    #[serde(default)]
    pub shop_section_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct EtsySection {
    shop_section_id: u64,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

/// Everything one live fetch produced, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawCatalog {
    pub listings: Vec<EtsyListing>,
    pub sections: HashMap<u64, String>,
}

impl RawCatalog {
    pub fn section_for(&self, listing: &EtsyListing) -> Option<&str> {
        listing
            .shop_section_id
            .and_then(|id| self.sections.get(&id))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct EtsyClient {
    client: reqwest::Client,
    base_url: String,
    credentials: EtsyCredentials,
}

impl EtsyClient {
    pub fn new(base_url: &str, credentials: EtsyCredentials) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build etsy http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            credentials,
        })
    }

    fn shop_url(&self, path: &str) -> String {
        format!(
            "{}/shops/{}/{path}",
            self.base_url, self.credentials.shop_id
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> anyhow::Result<T> {
        get_json(&self.client, &self.credentials.api_key, url).await
    }

    pub async fn active_listings(&self) -> anyhow::Result<Vec<EtsyListing>> {
        let url = self.shop_url(&format!(
            "listings/active?limit={ACTIVE_LISTINGS_LIMIT}&includes=images"
        ));
        let page: Page<serde_json::Value> = self.get_json(&url).await?;

        let mut listings = Vec::with_capacity(page.results.len());
        for raw in page.results {
            match serde_json::from_value::<EtsyListing>(raw) {
                Ok(listing) => listings.push(listing),
                Err(err) => tracing::warn!(%err, "skipping unparseable etsy listing"),
            }
        }
        Ok(listings)
    }

    pub async fn sections(&self) -> anyhow::Result<HashMap<u64, String>> {
        let page: Page<EtsySection> = self.get_json(&self.shop_url("sections")).await?;
        Ok(page
            .results
            .into_iter()
            .map(|s| (s.shop_section_id, s.title))
            .collect())
    }

    pub async fn listing_images(&self, listing_id: u64) -> anyhow::Result<Vec<EtsyImage>> {
        let url = format!("{}/listings/{listing_id}/images", self.base_url);
        let page: Page<EtsyImage> = self.get_json(&url).await?;
        Ok(page.results)
    }

    /// Active listings are required; sections and per-listing images are
    /// best-effort and degrade to empty results.
    pub async fn fetch_catalog(&self) -> anyhow::Result<RawCatalog> {
        let mut listings = self.active_listings().await.context("fetch active listings")?;

        let sections = match self.sections().await {
            Ok(sections) => sections,
            Err(err) => {
                tracing::warn!(err = %format!("{err:#}"), "fetch shop sections failed; continuing without");
                HashMap::new()
            }
        };

        self.fill_missing_images(&mut listings).await;

        Ok(RawCatalog { listings, sections })
    }

    async fn fill_missing_images(&self, listings: &mut [EtsyListing]) {
        let missing: Vec<(usize, u64)> = listings
            .iter()
            .enumerate()
            .filter(|(_, l)| l.images.as_ref().is_none_or(|images| images.is_empty()))
            .map(|(idx, l)| (idx, l.listing_id))
            .collect();
        if missing.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(MAX_IMAGE_FETCHES_IN_FLIGHT));
        let mut tasks = JoinSet::new();
        for (idx, listing_id) in missing {
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (idx, listing_id, this.listing_images(listing_id).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, _, Ok(images))) => listings[idx].images = Some(images),
                Ok((_, listing_id, Err(err))) => {
                    tracing::warn!(listing_id, err = %format!("{err:#}"), "fetch listing images failed");
                }
                Err(err) => tracing::warn!(%err, "listing image task failed"),
            }
        }
    }
}

async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    api_key: &str,
    url: &str,
) -> anyhow::Result<T> {
    let response = client
        .get(url)
        .header("x-api-key", api_key)
        .header(ACCEPT, "application/json")
        .header(USER_AGENT, "storefront/0.1")
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;

    let status = response.status();
    let raw = response.text().await.context("read etsy response body")?;
    if !status.is_success() {
        anyhow::bail!("etsy api error ({status}): {}", parse_error_message(&raw).unwrap_or(raw));
    }
    serde_json::from_str(&raw).with_context(|| format!("parse etsy response from {url}"))
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.as_str()?.to_owned();
    Some(message)
}
