use std::sync::Arc;

use anyhow::Context as _;
use sqlx::postgres::PgPoolOptions;

use crate::app::rate_limit::RateLimiter;
use crate::catalog::CatalogService;
use crate::config::SiteConfig;
use crate::curation::{CurationStore, MemoryCurationStore, PgCurationStore};
use crate::notify::{LogNotifier, Notifier, ResendNotifier};
use crate::orders::{MemoryOrderStore, OrderStore, PgOrderStore};
use crate::source::CatalogFetcher;
use crate::subscribers::{MemorySubscriberStore, PgSubscriberStore, SubscriberStore};

#[derive(Clone)]
pub struct Stores {
    pub curation: Arc<dyn CurationStore>,
    pub subscribers: Arc<dyn SubscriberStore>,
    pub orders: Arc<dyn OrderStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            curation: Arc::new(MemoryCurationStore::new()),
            subscribers: Arc::new(MemorySubscriberStore::new()),
            orders: Arc::new(MemoryOrderStore::new()),
        }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connect to database")?;

        let curation = PgCurationStore::new(pool.clone());
        curation.ensure_schema().await?;
        let subscribers = PgSubscriberStore::new(pool.clone());
        subscribers.ensure_schema().await?;
        let orders = PgOrderStore::new(pool);
        orders.ensure_schema().await?;

        Ok(Self {
            curation: Arc::new(curation),
            subscribers: Arc::new(subscribers),
            orders: Arc::new(orders),
        })
    }

    pub async fn from_config(config: &SiteConfig) -> anyhow::Result<Self> {
        match &config.database_url {
            Some(url) => {
                let stores = Self::connect(url).await?;
                tracing::info!("using postgres stores");
                Ok(stores)
            }
            None => {
                tracing::warn!("no database configured; curation and leads are kept in memory only");
                Ok(Self::in_memory())
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SiteConfig>,
    pub catalog: Arc<CatalogService>,
    pub stores: Stores,
    pub notifier: Arc<dyn Notifier>,
    pub subscribe_limiter: Arc<RateLimiter>,
    pub order_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        config: SiteConfig,
        fetcher: CatalogFetcher,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let catalog = CatalogService::new(fetcher, config.revalidate(), Arc::clone(&stores.curation));
        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            stores,
            notifier,
            subscribe_limiter: Arc::new(RateLimiter::default()),
            order_limiter: Arc::new(RateLimiter::default()),
        }
    }

    pub async fn from_config(config: SiteConfig) -> anyhow::Result<Self> {
        let fetcher = CatalogFetcher::from_config(&config)?;
        if !fetcher.has_live_source() {
            tracing::warn!("ETSY_API_KEY / ETSY_SHOP_ID not set; serving the fallback snapshot");
        }
        let stores = Stores::from_config(&config).await?;
        let notifier: Arc<dyn Notifier> = match &config.resend_api_key {
            Some(key) => Arc::new(ResendNotifier::new(key, &config.email_from)?),
            None => {
                tracing::info!("RESEND_API_KEY not set; emails are logged only");
                Arc::new(LogNotifier)
            }
        };
        Ok(Self::new(config, fetcher, stores, notifier))
    }
}
