use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::classify::Classifier;
use crate::config::SiteConfig;
use crate::etsy::{EtsyClient, RawCatalog};
use crate::formats::{ListingsData, NormalizedListing, SnapshotSource};
use crate::normalize::{dedupe_by_id, normalize_etsy_listing, normalize_snapshot_listing};

const BUNDLED_SNAPSHOT: &str = include_str!("../data/listings.json");

#[async_trait]
pub trait LiveSource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<RawCatalog>;
}

#[async_trait]
impl LiveSource for EtsyClient {
    async fn fetch(&self) -> anyhow::Result<RawCatalog> {
        self.fetch_catalog().await
    }
}

/// Static snapshot shipped with the deployment. Loading never fails.
#[derive(Debug, Clone)]
pub struct FallbackSource {
    path: PathBuf,
}

impl FallbackSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> ListingsData {
        match read_snapshot(&self.path) {
            Ok(data) => return data,
            Err(err) => tracing::warn!(
                path = %self.path.display(),
                err = %format!("{err:#}"),
                "fallback snapshot unreadable; using bundled snapshot"
            ),
        }

        match serde_json::from_str::<ListingsData>(BUNDLED_SNAPSHOT) {
            Ok(data) => data,
            Err(err) => {
                tracing::error!(%err, "bundled snapshot unparseable; serving empty catalog");
                ListingsData {
                    listings: Vec::new(),
                    fetched_at: DateTime::<Utc>::default(),
                    source: SnapshotSource::File,
                }
            }
        }
    }
}

pub fn read_snapshot(path: &Path) -> anyhow::Result<ListingsData> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read snapshot: {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse snapshot: {}", path.display()))
}

/// One normalized catalog plus where it came from.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub source: SnapshotSource,
    pub fetched_at: DateTime<Utc>,
    pub listings: Vec<NormalizedListing>,
}

/// Live source first, fallback snapshot on any failure or when no live
/// source is configured.
pub struct CatalogFetcher {
    live: Option<Arc<dyn LiveSource>>,
    fallback: FallbackSource,
    classifier: Classifier,
}

impl CatalogFetcher {
    pub fn new(
        live: Option<Arc<dyn LiveSource>>,
        fallback: FallbackSource,
        classifier: Classifier,
    ) -> Self {
        Self {
            live,
            fallback,
            classifier,
        }
    }

    /// Live marketplace source when credentials are set, fallback only otherwise.
    pub fn from_config(config: &SiteConfig) -> anyhow::Result<Self> {
        let live: Option<Arc<dyn LiveSource>> = match config.etsy.credentials() {
            Some(credentials) => Some(Arc::new(
                EtsyClient::new(&config.etsy.api_base_url, credentials)
                    .context("build etsy client")?,
            )),
            None => None,
        };
        Ok(Self::new(
            live,
            FallbackSource::new(&config.fallback_snapshot),
            Classifier::new(&config.categories),
        ))
    }

    pub fn has_live_source(&self) -> bool {
        self.live.is_some()
    }

    pub async fn fetch(&self) -> Fetched {
        match &self.live {
            Some(live) => match live.fetch().await {
                Ok(raw) => {
                    let listings = self.normalize_raw(&raw);
                    tracing::info!(count = listings.len(), "catalog fetched from marketplace api");
                    return Fetched {
                        source: SnapshotSource::Api,
                        fetched_at: Utc::now(),
                        listings,
                    };
                }
                Err(err) => tracing::warn!(
                    err = %format!("{err:#}"),
                    "marketplace fetch failed; falling back to snapshot"
                ),
            },
            None => tracing::debug!("marketplace credentials not configured; using snapshot"),
        }

        self.fetch_fallback()
    }

    pub fn fetch_fallback(&self) -> Fetched {
        let data = self.fallback.load();
        let listings = dedupe_by_id(
            data.listings
                .into_iter()
                .map(|l| normalize_snapshot_listing(l, &self.classifier))
                .collect(),
        );
        tracing::info!(
            count = listings.len(),
            path = %self.fallback.path().display(),
            "catalog loaded from fallback snapshot"
        );
        Fetched {
            source: SnapshotSource::File,
            fetched_at: data.fetched_at,
            listings,
        }
    }

    pub fn normalize_raw(&self, raw: &RawCatalog) -> Vec<NormalizedListing> {
        dedupe_by_id(
            raw.listings
                .iter()
                .map(|l| normalize_etsy_listing(l, raw.section_for(l), &self.classifier))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::etsy::EtsyListing;

    struct FailingSource;

    #[async_trait]
    impl LiveSource for FailingSource {
        async fn fetch(&self) -> anyhow::Result<RawCatalog> {
            anyhow::bail!("etsy api error (503 Service Unavailable)")
        }
    }

    struct StaticSource(RawCatalog);

    #[async_trait]
    impl LiveSource for StaticSource {
        async fn fetch(&self) -> anyhow::Result<RawCatalog> {
            Ok(self.0.clone())
        }
    }

    fn classifier() -> Classifier {
        Classifier::new(&SiteConfig::default().categories)
    }

    fn missing_path() -> PathBuf {
        PathBuf::from("/nonexistent/storefront/listings.json")
    }

    #[test]
    fn bundled_snapshot_parses_and_normalizes() -> anyhow::Result<()> {
        let data: ListingsData = serde_json::from_str(BUNDLED_SNAPSHOT)?;
        assert!(!data.listings.is_empty());

        let fetcher = CatalogFetcher::new(None, FallbackSource::new(missing_path()), classifier());
        let fetched = fetcher.fetch_fallback();
        assert_eq!(fetched.source, SnapshotSource::File);
        assert!(fetched.listings.iter().all(|l| !l.images.is_empty()));
        Ok(())
    }

    #[test]
    fn fallback_reads_configured_file_first() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("listings.json");
        let mut data: ListingsData = serde_json::from_str(BUNDLED_SNAPSHOT)?;
        data.listings.truncate(1);
        data.listings[0].title = "Only One".to_owned();
        std::fs::write(&path, serde_json::to_vec(&data)?)?;

        let loaded = FallbackSource::new(&path).load();
        assert_eq!(loaded.listings.len(), 1);
        assert_eq!(loaded.listings[0].title, "Only One");
        Ok(())
    }

    #[test]
    fn corrupt_snapshot_file_uses_bundled_copy() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("listings.json");
        std::fs::write(&path, "{ not json")?;

        let loaded = FallbackSource::new(&path).load();
        let bundled: ListingsData = serde_json::from_str(BUNDLED_SNAPSHOT)?;
        assert_eq!(loaded.listings.len(), bundled.listings.len());
        Ok(())
    }

    #[test]
    fn live_source_needs_both_credentials() -> anyhow::Result<()> {
        let mut config = SiteConfig::default();
        config.etsy.api_key = Some("key".to_owned());
        assert!(!CatalogFetcher::from_config(&config)?.has_live_source());

        config.etsy.shop_id = Some("12345".to_owned());
        assert!(CatalogFetcher::from_config(&config)?.has_live_source());
        Ok(())
    }

    #[tokio::test]
    async fn live_failure_falls_back() {
        let fetcher = CatalogFetcher::new(
            Some(Arc::new(FailingSource)),
            FallbackSource::new(missing_path()),
            classifier(),
        );
        let fetched = fetcher.fetch().await;
        assert_eq!(fetched.source, SnapshotSource::File);
        assert!(!fetched.listings.is_empty());
    }

    #[tokio::test]
    async fn live_success_is_normalized_with_sections() {
        let raw = RawCatalog {
            listings: vec![
                EtsyListing {
                    listing_id: 1,
                    title: Some("Name Sign".to_owned()),
                    shop_section_id: Some(7),
                    ..EtsyListing::default()
                },
                EtsyListing {
                    listing_id: 1,
                    title: Some("Duplicate".to_owned()),
                    ..EtsyListing::default()
                },
            ],
            sections: HashMap::from([(7, "Laser Engraved".to_owned())]),
        };
        let fetcher = CatalogFetcher::new(
            Some(Arc::new(StaticSource(raw))),
            FallbackSource::new(missing_path()),
            classifier(),
        );

        let fetched = fetcher.fetch().await;
        assert_eq!(fetched.source, SnapshotSource::Api);
        assert_eq!(fetched.listings.len(), 1);
        assert_eq!(fetched.listings[0].category, "laser-engraving");
        assert_eq!(fetched.listings[0].shop_section.as_deref(), Some("Laser Engraved"));
    }
}
