use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CachedCatalog, Snapshot, SnapshotCache};
use crate::curation::CurationStore;
use crate::formats::{NormalizedListing, SnapshotSource};
use crate::source::CatalogFetcher;

pub const DEFAULT_RELATED_LIMIT: usize = 4;
const SAME_CATEGORY_SCORE: usize = 3;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    pub source: SnapshotSource,
    pub fetched_at: DateTime<Utc>,
    pub count: usize,
}

/// Read side of the catalog: one cached snapshot shared by every query.
pub struct CatalogService {
    fetcher: CatalogFetcher,
    cache: SnapshotCache,
    curation: Arc<dyn CurationStore>,
}

impl CatalogService {
    pub fn new(
        fetcher: CatalogFetcher,
        revalidate: Duration,
        curation: Arc<dyn CurationStore>,
    ) -> Self {
        Self {
            fetcher,
            cache: SnapshotCache::new(revalidate),
            curation,
        }
    }

    async fn current(&self) -> CachedCatalog {
        let fetcher = &self.fetcher;
        self.cache
            .get_or_refresh(move || async move {
                let fetched = fetcher.fetch().await;
                CachedCatalog {
                    listings: Arc::from(fetched.listings),
                    source: fetched.source,
                    fetched_at: fetched.fetched_at,
                }
            })
            .await
    }

    pub async fn list_all(&self) -> Snapshot {
        self.current().await.listings
    }

    pub async fn snapshot_info(&self) -> SnapshotInfo {
        let current = self.current().await;
        SnapshotInfo {
            source: current.source,
            fetched_at: current.fetched_at,
            count: current.listings.len(),
        }
    }

    pub async fn get_by_slug(&self, slug: &str) -> Option<NormalizedListing> {
        self.list_all().await.iter().find(|l| l.slug == slug).cloned()
    }

    pub async fn get_by_category(&self, category: &str) -> Vec<NormalizedListing> {
        filter_category(&self.list_all().await, category)
    }

    /// Curated order when the category has any curation rows, otherwise the
    /// rule-based category filter.
    pub async fn get_curated_by_category(&self, category: &str) -> Vec<NormalizedListing> {
        let snapshot = self.list_all().await;
        let ids = match self.curation.listing_ids(category).await {
            Ok(ids) => ids,
            Err(err) => {
                tracing::warn!(
                    category,
                    err = %format!("{err:#}"),
                    "curation lookup failed; using category rules"
                );
                Vec::new()
            }
        };
        if ids.is_empty() {
            return filter_category(&snapshot, category);
        }
        curated_order(&snapshot, &ids)
    }

    pub async fn search(&self, query: &str) -> Vec<NormalizedListing> {
        search_listings(&self.list_all().await, query)
    }

    pub async fn related(&self, listing: &NormalizedListing, limit: usize) -> Vec<NormalizedListing> {
        related_listings(&self.list_all().await, listing, limit)
    }

    pub async fn all_tags(&self) -> Vec<String> {
        sorted_labels(self.list_all().await.iter().flat_map(|l| &l.tags))
    }

    pub async fn all_materials(&self) -> Vec<String> {
        sorted_labels(self.list_all().await.iter().flat_map(|l| &l.materials))
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
        tracing::info!("catalog cache invalidated");
    }
}

pub fn filter_category(listings: &[NormalizedListing], category: &str) -> Vec<NormalizedListing> {
    listings
        .iter()
        .filter(|l| l.category == category)
        .cloned()
        .collect()
}

/// Listings in `ids` order; ids absent from the snapshot are skipped.
pub fn curated_order(listings: &[NormalizedListing], ids: &[String]) -> Vec<NormalizedListing> {
    let by_id: HashMap<&str, &NormalizedListing> =
        listings.iter().map(|l| (l.id.as_str(), l)).collect();
    ids.iter()
        .filter_map(|id| by_id.get(id.as_str()).map(|l| (*l).clone()))
        .collect()
}

pub fn search_listings(listings: &[NormalizedListing], query: &str) -> Vec<NormalizedListing> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return listings.to_vec();
    }
    listings
        .iter()
        .filter(|l| {
            l.title.to_lowercase().contains(&needle)
                || l.description.to_lowercase().contains(&needle)
                || l.tags.iter().any(|t| t.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

fn related_score(target: &NormalizedListing, candidate: &NormalizedListing) -> usize {
    let shared = |mine: &[String], theirs: &[String]| {
        let theirs: HashSet<&str> = theirs.iter().map(String::as_str).collect();
        mine.iter()
            .map(String::as_str)
            .collect::<HashSet<_>>()
            .intersection(&theirs)
            .count()
    };

    let category = if candidate.category == target.category {
        SAME_CATEGORY_SCORE
    } else {
        0
    };
    category
        + shared(&target.tags, &candidate.tags)
        + shared(&target.materials, &candidate.materials)
}

pub fn related_listings(
    listings: &[NormalizedListing],
    target: &NormalizedListing,
    limit: usize,
) -> Vec<NormalizedListing> {
    let mut scored: Vec<(usize, &NormalizedListing)> = listings
        .iter()
        .filter(|l| l.id != target.id)
        .map(|l| (related_score(target, l), l))
        .collect();
    // Stable: equal scores keep snapshot order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, l)| l.clone())
        .collect()
}

fn sorted_labels<'a>(labels: impl Iterator<Item = &'a String>) -> Vec<String> {
    labels
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
