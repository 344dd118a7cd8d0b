use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use serde::Deserialize;

use crate::app::error::{ApiError, ApiResult, message};
use crate::app::rate_limit::{RateLimiter, client_key};
use crate::app::state::AppState;
use crate::notify::{admin_order_link, contact_email, custom_order_email};
use crate::orders::{AttachmentUpload, NewCustomOrder, ValidationError, validate_attachments};
use crate::subscribers::{DEFAULT_SOURCE, normalize_email};

/// Base64 attachments inflate by a third; leave room for three full files.
pub const CUSTOM_ORDER_BODY_LIMIT: usize = 24 * 1024 * 1024;

fn rate_limit(limiter: &RateLimiter, headers: &HeaderMap) -> ApiResult<()> {
    let key = client_key(headers);
    if limiter.allow(&key) {
        Ok(())
    } else {
        tracing::warn!(client = %key, "rate limit exceeded");
        Err(ApiError::too_many_requests())
    }
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!(%rejection, "rejecting malformed form body");
        ApiError::bad_request("Invalid request.")
    })
}

fn required(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub source: Option<String>,
}

pub async fn subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SubscribeRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    rate_limit(&state.subscribe_limiter, &headers)?;
    let request = json_body(body)?;

    let email = normalize_email(&request.email)
        .ok_or_else(|| ApiError::bad_request("Valid email required."))?;
    let source = request
        .source
        .as_deref()
        .and_then(required)
        .unwrap_or(DEFAULT_SOURCE);

    let added = state
        .stores
        .subscribers
        .subscribe(&email, source)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to subscribe."))?;
    tracing::info!(source, added, "newsletter signup");
    Ok(message("You're on the list! 🎉"))
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
}

pub async fn contact(
    State(state): State<AppState>,
    body: Result<Json<ContactRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let request = json_body(body)?;
    let (Some(name), Some(email), Some(subject), Some(text)) = (
        required(&request.name),
        required(&request.email),
        required(&request.subject),
        required(&request.message),
    ) else {
        return Err(ApiError::bad_request("All fields required."));
    };

    let email = contact_email(&state.config.contact_email, name, email, subject, text);
    state
        .notifier
        .send(&email)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to send."))?;
    Ok(message("Message sent!"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomOrderRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub project_type: String,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Honeypot: real visitors never fill it in.
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub files: Vec<AttachmentUpload>,
}

impl CustomOrderRequest {
    pub fn is_bot(&self) -> bool {
        self.website.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    pub fn validate(self) -> Result<NewCustomOrder, ValidationError> {
        let (Some(name), Some(email), Some(project_type), Some(description)) = (
            required(&self.name),
            required(&self.email),
            required(&self.project_type),
            required(&self.description),
        ) else {
            return Err(ValidationError("Required fields missing.".to_owned()));
        };
        if !email.contains('@') {
            return Err(ValidationError("Valid email required.".to_owned()));
        }
        let optional = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        Ok(NewCustomOrder {
            name: name.to_owned(),
            email: email.to_owned(),
            project_type: project_type.to_owned(),
            description: description.to_owned(),
            files: validate_attachments(&self.files)?,
            budget: optional(self.budget),
            timeline: optional(self.timeline),
        })
    }
}

pub async fn custom_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CustomOrderRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    rate_limit(&state.order_limiter, &headers)?;
    let request = json_body(body)?;

    if request.is_bot() {
        tracing::info!("custom order honeypot triggered; discarding");
        return Ok(message("Request submitted!"));
    }
    let order = request
        .validate()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let id = state
        .stores
        .orders
        .create(order.clone())
        .await
        .map_err(|err| ApiError::internal(err, "Failed to send."))?;
    tracing::info!(id, files = order.files.len(), "custom order stored");

    let notified = match admin_order_link(&state.config.url, Some(id)) {
        Ok(link) => {
            let email = custom_order_email(&state.config.order_notify_email, &link, &order);
            state.notifier.send(&email).await
        }
        Err(err) => Err(err),
    };
    if let Err(err) = notified {
        tracing::warn!(id, err = %format!("{err:#}"), "custom order notification failed");
    }

    Ok(message("Request submitted!"))
}
