use std::path::Path;

use anyhow::Context as _;
use chrono::Utc;
use tokio::fs;

use crate::cli::FetchListingsArgs;
use crate::config::SiteConfig;
use crate::etsy::EtsyClient;
use crate::formats::{ListingsData, SnapshotSource};
use crate::source::CatalogFetcher;

pub async fn run(config: &SiteConfig, args: FetchListingsArgs) -> anyhow::Result<()> {
    // The configured fallback snapshot is refreshed in place.
    let out = match args.out {
        Some(out) => {
            if out.exists() && !args.force {
                anyhow::bail!("snapshot already exists (use --force): {}", out.display());
            }
            out
        }
        None => config.fallback_snapshot.clone(),
    };

    let credentials = config
        .etsy
        .credentials()
        .context("ETSY_API_KEY and ETSY_SHOP_ID must be set to fetch listings")?;
    let client = EtsyClient::new(&config.etsy.api_base_url, credentials)?;
    let raw = client.fetch_catalog().await?;

    let fetcher = CatalogFetcher::from_config(config)?;
    let data = ListingsData {
        listings: fetcher.normalize_raw(&raw),
        fetched_at: Utc::now(),
        source: SnapshotSource::File,
    };
    write_json_atomic(&out, &data).await?;

    tracing::info!(
        count = data.listings.len(),
        out = %out.display(),
        "fallback snapshot written"
    );
    Ok(())
}

pub async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create parent dir: {}", parent.display()))?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
