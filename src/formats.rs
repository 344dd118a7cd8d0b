use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingImage {
    pub url: String,
    pub alt: String,
    pub width: u32,
    pub height: u32,
    pub rank: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedListing {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub currency: String,
    pub images: Vec<ListingImage>,
    pub tags: Vec<String>,
    pub materials: Vec<String>,
    pub category: String,
    pub created_at: String,
    pub updated_at: String,
    pub listing_url: String,
    pub quantity: u32,
    pub is_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Api,
    File,
}

impl SnapshotSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::File => "file",
        }
    }
}

/// On-disk fallback snapshot, as written by `storefront fetch-listings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingsData {
    pub listings: Vec<NormalizedListing>,
    pub fetched_at: DateTime<Utc>,
    pub source: SnapshotSource,
}
