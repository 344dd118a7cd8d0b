use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat};

use crate::classify::Classifier;
use crate::etsy::{EtsyImage, EtsyListing};
use crate::formats::{ListingImage, NormalizedListing};
use crate::text::listing_slug;

pub const PLACEHOLDER_IMAGE_URL: &str = "/images/placeholder-product.svg";
const PLACEHOLDER_IMAGE_SIZE: u32 = 800;
const DEFAULT_IMAGE_SIZE: u32 = 570;
const DEFAULT_CURRENCY: &str = "USD";
const ACTIVE_STATE: &str = "active";

pub fn is_available(state: &str, quantity: u32) -> bool {
    state == ACTIVE_STATE && quantity > 0
}

pub fn normalize_etsy_listing(
    raw: &EtsyListing,
    section: Option<&str>,
    classifier: &Classifier,
) -> NormalizedListing {
    let id = raw.listing_id.to_string();
    let title = raw.title.clone().unwrap_or_default();
    let tags = dedupe_labels(raw.tags.clone().unwrap_or_default());
    let materials = dedupe_labels(raw.materials.clone().unwrap_or_default());
    let quantity = clamp_quantity(raw.quantity.unwrap_or(0));
    let state = raw.state.clone().unwrap_or_default();

    let (price, currency) = match &raw.price {
        Some(money) => {
            let divisor = if money.divisor > 0 { money.divisor } else { 1 };
            let currency = money
                .currency_code
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_owned());
            (money.amount as f64 / divisor as f64, currency)
        }
        None => (0.0, DEFAULT_CURRENCY.to_owned()),
    };

    let images = raw
        .images
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|img| convert_image(img, &title))
        .collect();

    NormalizedListing {
        slug: listing_slug(&title, &id),
        category: classifier.assign(&tags, &materials, section).to_owned(),
        images: ordered_images(images, &title),
        description: raw.description.clone().unwrap_or_default(),
        price,
        currency,
        created_at: iso_timestamp(raw.created_timestamp),
        updated_at: iso_timestamp(raw.updated_timestamp),
        listing_url: raw.url.clone().unwrap_or_default(),
        quantity,
        is_available: is_available(&state, quantity),
        shop_section: section.map(str::to_owned),
        state: Some(state).filter(|s| !s.is_empty()),
        id,
        title,
        tags,
        materials,
    }
}

/// Re-derives every computed field of a snapshot record so that both fetch
/// paths produce the same shape.
pub fn normalize_snapshot_listing(
    mut listing: NormalizedListing,
    classifier: &Classifier,
) -> NormalizedListing {
    listing.tags = dedupe_labels(std::mem::take(&mut listing.tags));
    listing.materials = dedupe_labels(std::mem::take(&mut listing.materials));
    listing.slug = listing_slug(&listing.title, &listing.id);
    listing.category = classifier
        .assign(
            &listing.tags,
            &listing.materials,
            listing.shop_section.as_deref(),
        )
        .to_owned();
    listing.is_available = match listing.state.as_deref() {
        Some(state) => is_available(state, listing.quantity),
        None => listing.is_available && listing.quantity > 0,
    };
    if listing.currency.trim().is_empty() {
        listing.currency = DEFAULT_CURRENCY.to_owned();
    }
    listing.images = ordered_images(std::mem::take(&mut listing.images), &listing.title);
    listing
}

/// Keeps the first listing for each id, preserving source order.
pub fn dedupe_by_id(listings: Vec<NormalizedListing>) -> Vec<NormalizedListing> {
    let mut seen = HashSet::new();
    listings
        .into_iter()
        .filter(|l| {
            let fresh = seen.insert(l.id.clone());
            if !fresh {
                tracing::debug!(id = %l.id, "dropping duplicate listing id");
            }
            fresh
        })
        .collect()
}

fn convert_image(img: &EtsyImage, title: &str) -> ListingImage {
    let url = [&img.url_570x_n, &img.url_fullxfull]
        .into_iter()
        .flatten()
        .find(|u| !u.is_empty())
        .cloned()
        .unwrap_or_default();
    ListingImage {
        url,
        alt: img
            .alt_text
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| title.to_owned()),
        width: img.full_width.filter(|w| *w > 0).unwrap_or(DEFAULT_IMAGE_SIZE),
        height: img
            .full_height
            .filter(|h| *h > 0)
            .unwrap_or(DEFAULT_IMAGE_SIZE),
        rank: img.rank.unwrap_or(0),
    }
}

fn ordered_images(mut images: Vec<ListingImage>, title: &str) -> Vec<ListingImage> {
    images.retain(|img| !img.url.is_empty());
    if images.is_empty() {
        return vec![ListingImage {
            url: PLACEHOLDER_IMAGE_URL.to_owned(),
            alt: title.to_owned(),
            width: PLACEHOLDER_IMAGE_SIZE,
            height: PLACEHOLDER_IMAGE_SIZE,
            rank: 0,
        }];
    }
    // Stable: equal ranks keep source order.
    images.sort_by_key(|img| img.rank);
    images
}

fn dedupe_labels(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

fn clamp_quantity(quantity: i64) -> u32 {
    quantity.clamp(0, i64::from(u32::MAX)) as u32
}

fn iso_timestamp(secs: Option<i64>) -> String {
    DateTime::from_timestamp(secs.unwrap_or(0), 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
