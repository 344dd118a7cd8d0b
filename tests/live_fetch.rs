mod etsy_stub;

use std::collections::HashMap;
use std::sync::Arc;

use etsy_stub::{API_KEY, EtsyStub, EtsyStubConfig, SHOP_ID, listing};
use storefront::classify::Classifier;
use storefront::config::{EtsyCredentials, SiteConfig};
use storefront::etsy::EtsyClient;
use storefront::formats::SnapshotSource;
use storefront::normalize::PLACEHOLDER_IMAGE_URL;
use storefront::source::{CatalogFetcher, FallbackSource, LiveSource};

fn fetcher_for(stub: &EtsyStub, api_key: &str) -> anyhow::Result<CatalogFetcher> {
    let client = EtsyClient::new(
        &stub.base_url,
        EtsyCredentials {
            api_key: api_key.to_owned(),
            shop_id: SHOP_ID.to_owned(),
        },
    )?;
    let live: Arc<dyn LiveSource> = Arc::new(client);
    Ok(CatalogFetcher::new(
        Some(live),
        FallbackSource::new("/nonexistent/storefront/listings.json"),
        Classifier::new(&SiteConfig::default().categories),
    ))
}

#[tokio::test]
async fn live_fetch_joins_sections_and_fills_missing_images() -> anyhow::Result<()> {
    let stub = EtsyStub::spawn(EtsyStubConfig {
        listings: serde_json::json!({
            "count": 3,
            "results": [
                listing(11, "Dragon", &["3d printed"], None, true),
                listing(12, "Walnut Sign", &["gift"], Some(9), false),
                listing(13, "Mystery Box", &["gift"], None, false),
            ],
        }),
        sections: serde_json::json!({
            "results": [{ "shop_section_id": 9, "title": "Laser Engraving" }],
        }),
        images: HashMap::from([(
            12,
            serde_json::json!({
                "results": [{ "url_fullxfull": "https://img.example/12-full.jpg", "rank": 1 }],
            }),
        )]),
        ..EtsyStubConfig::default()
    });

    let fetched = fetcher_for(&stub, API_KEY)?.fetch().await;
    assert_eq!(fetched.source, SnapshotSource::Api);
    assert_eq!(fetched.listings.len(), 3);

    let dragon = &fetched.listings[0];
    assert_eq!(dragon.slug, "dragon-11");
    assert_eq!(dragon.category, "3d-prints");
    assert!((dragon.price - 18.5).abs() < f64::EPSILON);
    assert_eq!(dragon.images[0].url, "https://img.example/11-a.jpg");

    let sign = &fetched.listings[1];
    assert_eq!(sign.shop_section.as_deref(), Some("Laser Engraving"));
    assert_eq!(sign.category, "laser-engraving");
    assert_eq!(sign.images[0].url, "https://img.example/12-full.jpg");

    let mystery = &fetched.listings[2];
    assert_eq!(mystery.category, "uncategorized");
    assert_eq!(mystery.images.len(), 1);
    assert_eq!(mystery.images[0].url, PLACEHOLDER_IMAGE_URL);

    let requests = stub.requests();
    assert!(requests.iter().any(|r| r.contains("limit=100") && r.contains("includes=images")));
    assert!(!requests.iter().any(|r| r.contains("/listings/11/images")));
    assert!(requests.iter().any(|r| r.contains("/listings/12/images")));
    Ok(())
}

#[tokio::test]
async fn failed_sections_call_does_not_abort_fetch() -> anyhow::Result<()> {
    let stub = EtsyStub::spawn(EtsyStubConfig {
        listings: serde_json::json!({
            "results": [listing(21, "Coaster", &["laser engraved"], Some(3), true)],
        }),
        sections_status: 500,
        sections: serde_json::json!({ "error": "boom" }),
        ..EtsyStubConfig::default()
    });

    let fetched = fetcher_for(&stub, API_KEY)?.fetch().await;
    assert_eq!(fetched.source, SnapshotSource::Api);
    assert_eq!(fetched.listings[0].shop_section, None);
    assert_eq!(fetched.listings[0].category, "laser-engraving");
    Ok(())
}

#[tokio::test]
async fn non_success_listings_response_uses_fallback() -> anyhow::Result<()> {
    let stub = EtsyStub::spawn(EtsyStubConfig {
        listings_status: 503,
        listings: serde_json::json!({ "error": "maintenance" }),
        ..EtsyStubConfig::default()
    });

    let fetched = fetcher_for(&stub, API_KEY)?.fetch().await;
    assert_eq!(fetched.source, SnapshotSource::File);
    assert!(!fetched.listings.is_empty());
    Ok(())
}

#[tokio::test]
async fn rejected_api_key_surfaces_upstream_message() -> anyhow::Result<()> {
    let stub = EtsyStub::spawn(EtsyStubConfig::default());
    let client = EtsyClient::new(
        &stub.base_url,
        EtsyCredentials {
            api_key: "wrong".to_owned(),
            shop_id: SHOP_ID.to_owned(),
        },
    )?;

    let err = client
        .fetch_catalog()
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected error"))?;
    assert!(format!("{err:#}").contains("Invalid API key"));

    let fetched = fetcher_for(&stub, "wrong")?.fetch().await;
    assert_eq!(fetched.source, SnapshotSource::File);
    Ok(())
}
