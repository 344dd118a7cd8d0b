use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context as _;

use crate::catalog::{CatalogService, DEFAULT_RELATED_LIMIT};
use crate::classify::Classifier;
use crate::cli::{CategorizeArgs, ListingsArgs};
use crate::config::SiteConfig;
use crate::curation::MemoryCurationStore;
use crate::formats::NormalizedListing;
use crate::source::CatalogFetcher;

pub async fn listings(config: &SiteConfig, args: ListingsArgs) -> anyhow::Result<()> {
    let fetcher = CatalogFetcher::from_config(config)?;
    let catalog = CatalogService::new(
        fetcher,
        config.revalidate(),
        Arc::new(MemoryCurationStore::new()),
    );
    let info = catalog.snapshot_info().await;
    tracing::info!(
        source = info.source.as_str(),
        fetched_at = %info.fetched_at,
        count = info.count,
        "catalog loaded"
    );

    let mut stdout = std::io::stdout().lock();
    if let Some(slug) = args.slug.as_deref() {
        let listing = catalog
            .get_by_slug(slug)
            .await
            .with_context(|| format!("no listing with slug {slug:?}"))?;
        let related = catalog.related(&listing, DEFAULT_RELATED_LIMIT).await;
        if args.json {
            let value = serde_json::json!({ "listing": listing, "related": related });
            writeln!(stdout, "{}", serde_json::to_string_pretty(&value)?)?;
        } else {
            write_rows(&mut stdout, std::slice::from_ref(&listing))?;
            writeln!(stdout, "related:")?;
            write_rows(&mut stdout, &related)?;
        }
        return Ok(());
    }

    let mut listings = match args.query.as_deref() {
        Some(query) => catalog.search(query).await,
        None => catalog.list_all().await.to_vec(),
    };
    if let Some(category) = args.category.as_deref() {
        listings.retain(|l| l.category == category);
    }

    if args.json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&listings)?)?;
    } else {
        write_rows(&mut stdout, &listings)?;
    }
    Ok(())
}

fn write_rows(out: &mut impl std::io::Write, listings: &[NormalizedListing]) -> anyhow::Result<()> {
    for l in listings {
        writeln!(
            out,
            "{}\t{}\t{:.2} {}\t{}\t{}",
            l.id,
            l.category,
            l.price,
            l.currency,
            if l.is_available { "available" } else { "unavailable" },
            l.slug,
        )?;
    }
    Ok(())
}

pub fn categorize(config: &SiteConfig, args: CategorizeArgs) -> anyhow::Result<()> {
    let classifier = Classifier::new(&config.categories);
    let category = classifier.assign(&args.tags, &args.materials, args.section.as_deref());
    println!("{category}");
    Ok(())
}
