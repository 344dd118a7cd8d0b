use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use crate::app::error::{ApiError, ApiResult};
use crate::app::state::AppState;
use crate::catalog::DEFAULT_RELATED_LIMIT;
use crate::formats::NormalizedListing;

#[derive(Debug, Default, Deserialize)]
pub struct ListingsQuery {
    pub category: Option<String>,
    #[serde(default)]
    pub curated: bool,
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListingsResponse {
    pub listings: Vec<NormalizedListing>,
}

pub async fn listings(
    State(state): State<AppState>,
    Query(query): Query<ListingsQuery>,
) -> Json<ListingsResponse> {
    let catalog = &state.catalog;
    let category = query.category.as_deref().filter(|c| !c.is_empty());

    let listings = match (query.q.as_deref(), category) {
        (Some(q), category) if !q.trim().is_empty() => {
            let mut hits = catalog.search(q).await;
            if let Some(category) = category {
                hits.retain(|l| l.category == category);
            }
            hits
        }
        (_, Some(category)) if query.curated => catalog.get_curated_by_category(category).await,
        (_, Some(category)) => catalog.get_by_category(category).await,
        (_, None) => catalog.list_all().await.to_vec(),
    };
    Json(ListingsResponse { listings })
}

#[derive(Debug, Serialize)]
pub struct ListingDetail {
    pub listing: NormalizedListing,
    pub related: Vec<NormalizedListing>,
}

pub async fn listing_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<ListingDetail>> {
    let listing = state
        .catalog
        .get_by_slug(&slug)
        .await
        .ok_or_else(|| ApiError::not_found("Listing not found."))?;
    let related = state.catalog.related(&listing, DEFAULT_RELATED_LIMIT).await;
    Ok(Json(ListingDetail { listing, related }))
}

pub async fn tags(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "tags": state.catalog.all_tags().await }))
}

pub async fn materials(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "materials": state.catalog.all_materials().await }))
}

#[derive(Debug, Serialize)]
pub struct CategorySummary {
    pub slug: String,
    pub label: String,
    pub description: String,
    pub href: String,
    pub count: usize,
}

pub async fn categories(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.catalog.list_all().await;
    let categories: Vec<CategorySummary> = state
        .config
        .categories
        .iter()
        .map(|rule| CategorySummary {
            slug: rule.slug.clone(),
            label: rule.label.clone(),
            description: rule.description.clone(),
            href: rule.href.clone(),
            count: snapshot.iter().filter(|l| l.category == rule.slug).count(),
        })
        .collect();
    Json(serde_json::json!({ "categories": categories }))
}
