use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use anyhow::Context as _;
use async_trait::async_trait;
use sqlx::PgPool;

/// Category -> listing ids in display order.
pub type Curation = BTreeMap<String, Vec<String>>;

#[async_trait]
pub trait CurationStore: Send + Sync {
    async fn listing_ids(&self, category: &str) -> anyhow::Result<Vec<String>>;
    async fn all(&self) -> anyhow::Result<Curation>;
    /// Replaces the whole assignment for `category`; returns the stored count.
    async fn replace(&self, category: &str, listing_ids: &[String]) -> anyhow::Result<usize>;
}

fn unique_ids(listing_ids: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    listing_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .collect()
}

#[derive(Debug, Default)]
pub struct MemoryCurationStore {
    inner: Mutex<Curation>,
}

impl MemoryCurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Curation) -> R) -> R {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl CurationStore for MemoryCurationStore {
    async fn listing_ids(&self, category: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.with(|map| map.get(category).cloned().unwrap_or_default()))
    }

    async fn all(&self) -> anyhow::Result<Curation> {
        Ok(self.with(|map| map.clone()))
    }

    async fn replace(&self, category: &str, listing_ids: &[String]) -> anyhow::Result<usize> {
        let ids: Vec<String> = unique_ids(listing_ids)
            .into_iter()
            .map(str::to_owned)
            .collect();
        let count = ids.len();
        self.with(|map| {
            if ids.is_empty() {
                map.remove(category);
            } else {
                map.insert(category.to_owned(), ids);
            }
        });
        Ok(count)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CurationRow {
    category: String,
    listing_id: String,
}

#[derive(Debug, Clone)]
pub struct PgCurationStore {
    pool: PgPool,
}

impl PgCurationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS curated_listings (
                id SERIAL PRIMARY KEY,
                listing_id VARCHAR(50) NOT NULL,
                category VARCHAR(50) NOT NULL,
                sort_order INTEGER DEFAULT 0,
                created_at TIMESTAMP DEFAULT NOW(),
                UNIQUE (listing_id, category)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create curated_listings table")?;
        Ok(())
    }
}

#[async_trait]
impl CurationStore for PgCurationStore {
    async fn listing_ids(&self, category: &str) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT listing_id FROM curated_listings
            WHERE category = $1
            ORDER BY sort_order
            "#,
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("load curated listings for {category}"))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn all(&self) -> anyhow::Result<Curation> {
        let rows = sqlx::query_as::<_, CurationRow>(
            r#"
            SELECT category, listing_id FROM curated_listings
            ORDER BY category, sort_order
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("load curated listings")?;

        let mut curation = Curation::new();
        for row in rows {
            curation.entry(row.category).or_default().push(row.listing_id);
        }
        Ok(curation)
    }

    async fn replace(&self, category: &str, listing_ids: &[String]) -> anyhow::Result<usize> {
        let ids = unique_ids(listing_ids);
        let mut tx = self.pool.begin().await.context("begin curation update")?;

        sqlx::query("DELETE FROM curated_listings WHERE category = $1")
            .bind(category)
            .execute(&mut *tx)
            .await
            .context("clear curated listings")?;

        for (position, listing_id) in ids.iter().copied().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO curated_listings (listing_id, category, sort_order)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(listing_id)
            .bind(category)
            .bind(i32::try_from(position).context("curation position overflow")?)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("insert curated listing {listing_id}"))?;
        }

        tx.commit().await.context("commit curation update")?;
        Ok(ids.len())
    }
}
