use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;

use crate::app::error::{ApiError, ApiResult, message};
use crate::app::state::AppState;
use crate::orders::OrderStatus;
use crate::subscribers::{export_filename, subscribers_csv};

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn query_token(request: &Request) -> Option<String> {
    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
}

/// Rejects every admin request when no admin token is configured.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return ApiError::unauthorized().into_response();
    };
    let presented = query_token(&request)
        .or_else(|| bearer_token(request.headers()).map(str::to_owned));
    if presented.as_deref() != Some(expected) {
        tracing::warn!(path = %request.uri().path(), "admin request with missing or invalid token");
        return ApiError::unauthorized().into_response();
    }
    next.run(request).await
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|_| ApiError::bad_request("Invalid request."))
}

pub async fn refresh_cache(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.catalog.invalidate();
    Json(serde_json::json!({
        "message": "Listings cache cleared. Next request will fetch fresh data.",
        "timestamp": Utc::now(),
    }))
}

pub async fn listings(State(state): State<AppState>) -> Json<serde_json::Value> {
    let listings = state.catalog.list_all().await;
    let info = state.catalog.snapshot_info().await;
    Json(serde_json::json!({
        "listings": &*listings,
        "source": info.source,
        "fetchedAt": info.fetched_at,
        "count": info.count,
    }))
}

pub async fn curated_listings(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let curated = state
        .stores
        .curation
        .all()
        .await
        .map_err(|err| ApiError::internal(err, "Failed to fetch curated listings."))?;
    Ok(Json(serde_json::json!({ "curated": curated })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurationUpdate {
    #[serde(default)]
    pub category: String,
    pub listing_ids: Option<Vec<String>>,
}

pub async fn save_curated_listings(
    State(state): State<AppState>,
    body: Result<Json<CurationUpdate>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let update = json_body(body)?;
    let category = update.category.trim();
    if category.is_empty() {
        return Err(ApiError::bad_request("Category is required."));
    }
    let Some(listing_ids) = update.listing_ids else {
        return Err(ApiError::bad_request("listingIds must be an array."));
    };

    let saved = state
        .stores
        .curation
        .replace(category, &listing_ids)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to save curated listings."))?;
    tracing::info!(category, saved, "curation updated");
    Ok(message(format!("Saved {saved} listings for {category}.")))
}

#[derive(Debug, Default, Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}

impl IdQuery {
    fn parse(&self) -> Option<i32> {
        self.id.as_deref()?.trim().parse().ok()
    }
}

pub async fn subscribers(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let subscribers = state
        .stores
        .subscribers
        .list()
        .await
        .map_err(|err| ApiError::internal(err, "Failed to fetch subscribers."))?;
    Ok(Json(serde_json::json!({ "subscribers": subscribers })))
}

pub async fn delete_subscriber(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = query
        .parse()
        .ok_or_else(|| ApiError::bad_request("Subscriber ID required."))?;
    let removed = state
        .stores
        .subscribers
        .delete(id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to remove subscriber."))?;
    if !removed {
        return Err(ApiError::not_found("Subscriber not found."));
    }
    Ok(message("Subscriber removed."))
}

pub async fn export_subscribers(State(state): State<AppState>) -> ApiResult<Response> {
    let subscribers = state
        .stores
        .subscribers
        .list()
        .await
        .map_err(|err| ApiError::internal(err, "Export failed."))?;

    let disposition = format!("attachment; filename=\"{}\"", export_filename(Utc::now()));
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|err| ApiError::internal(err.into(), "Export failed."))?;
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/csv")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        subscribers_csv(&subscribers),
    )
        .into_response())
}

pub async fn custom_orders(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let orders = &state.stores.orders;
    if query.id.is_some() {
        let id = query
            .parse()
            .ok_or_else(|| ApiError::bad_request("Order ID required."))?;
        let order = orders
            .get(id)
            .await
            .map_err(|err| ApiError::internal(err, "Failed to fetch orders."))?
            .ok_or_else(|| ApiError::not_found("Order not found."))?;
        return Ok(Json(serde_json::json!({ "order": order })));
    }

    let orders = orders
        .list()
        .await
        .map_err(|err| ApiError::internal(err, "Failed to fetch orders."))?;
    Ok(Json(serde_json::json!({ "orders": orders })))
}

/// Order ids arrive as numbers or numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OrderId {
    Number(i64),
    Text(String),
}

impl OrderId {
    fn parse(&self) -> Option<i32> {
        match self {
            OrderId::Number(n) => i32::try_from(*n).ok(),
            OrderId::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub id: Option<OrderId>,
    pub status: Option<String>,
}

pub async fn update_custom_order(
    State(state): State<AppState>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let update = json_body(body)?;
    let (Some(id), Some(status)) = (update.id.as_ref().and_then(OrderId::parse), update.status)
    else {
        return Err(ApiError::bad_request("Order ID and status required."));
    };
    let status: OrderStatus = status
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid status."))?;

    let updated = state
        .stores
        .orders
        .set_status(id, status)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to update order."))?;
    if !updated {
        return Err(ApiError::not_found("Order not found."));
    }
    tracing::info!(id, status = %status, "custom order status updated");
    Ok(message("Status updated."))
}

pub async fn delete_custom_order(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = query
        .parse()
        .ok_or_else(|| ApiError::bad_request("Order ID required."))?;
    let removed = state
        .stores
        .orders
        .delete(id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to remove order."))?;
    if !removed {
        return Err(ApiError::not_found("Order not found."));
    }
    Ok(message("Order removed."))
}
