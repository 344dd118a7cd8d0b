use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use anyhow::Context as _;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::types::Json;

pub const MAX_ATTACHMENTS: usize = 3;
pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;
pub const ALLOWED_ATTACHMENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    #[default]
    New,
    Reviewed,
    Quoted,
    InProgress,
    Completed,
    Declined,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::New,
        OrderStatus::Reviewed,
        OrderStatus::Quoted,
        OrderStatus::InProgress,
        OrderStatus::Completed,
        OrderStatus::Declined,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Reviewed => "reviewed",
            OrderStatus::Quoted => "quoted",
            OrderStatus::InProgress => "in-progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Declined => "declined",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .with_context(|| format!("unknown order status: {s}"))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected submission; the message is safe to show to the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentUpload {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub mime_type: String,
    /// Base64, optionally as a `data:` URL.
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub data: String,
}

fn strip_data_url(data: &str) -> &str {
    match data.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => data,
    }
}

/// Empty uploads are skipped; the rest must be allowed, small and decodable.
pub fn validate_attachments(
    uploads: &[AttachmentUpload],
) -> Result<Vec<Attachment>, ValidationError> {
    let mut files = Vec::new();
    for upload in uploads {
        let payload = strip_data_url(upload.data.trim());
        if payload.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(payload)
            .map_err(|_| ValidationError(format!("File \"{}\" could not be read.", upload.name)))?;
        if bytes.is_empty() {
            continue;
        }
        if bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(ValidationError(format!(
                "File \"{}\" exceeds 5MB limit.",
                upload.name
            )));
        }
        if !ALLOWED_ATTACHMENT_TYPES.contains(&upload.mime_type.as_str()) {
            return Err(ValidationError(format!(
                "File type \"{}\" is not allowed.",
                upload.mime_type
            )));
        }
        files.push(Attachment {
            name: upload.name.clone(),
            mime_type: upload.mime_type.clone(),
            size: bytes.len() as u64,
            data: BASE64.encode(&bytes),
        });
    }
    if files.len() > MAX_ATTACHMENTS {
        return Err(ValidationError(format!(
            "At most {MAX_ATTACHMENTS} files can be attached."
        )));
    }
    Ok(files)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomOrder {
    pub name: String,
    pub email: String,
    pub project_type: String,
    pub budget: Option<String>,
    pub timeline: Option<String>,
    pub description: String,
    pub files: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomOrder {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub project_type: String,
    pub budget: Option<String>,
    pub timeline: Option<String>,
    pub description: String,
    pub files: Vec<Attachment>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Listing view of an order: attachment payloads are left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomOrderSummary {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub project_type: String,
    pub budget: Option<String>,
    pub timeline: Option<String>,
    pub description: String,
    pub file_count: i32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&CustomOrder> for CustomOrderSummary {
    fn from(order: &CustomOrder) -> Self {
        Self {
            id: order.id,
            name: order.name.clone(),
            email: order.email.clone(),
            project_type: order.project_type.clone(),
            budget: order.budget.clone(),
            timeline: order.timeline.clone(),
            description: order.description.clone(),
            file_count: i32::try_from(order.files.len()).unwrap_or(i32::MAX),
            status: order.status,
            created_at: order.created_at,
        }
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: NewCustomOrder) -> anyhow::Result<i32>;
    /// Newest first.
    async fn list(&self) -> anyhow::Result<Vec<CustomOrderSummary>>;
    async fn get(&self, id: i32) -> anyhow::Result<Option<CustomOrder>>;
    async fn set_status(&self, id: i32, status: OrderStatus) -> anyhow::Result<bool>;
    async fn delete(&self, id: i32) -> anyhow::Result<bool>;
}

#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    inner: Mutex<Vec<CustomOrder>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Vec<CustomOrder>) -> R) -> R {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, order: NewCustomOrder) -> anyhow::Result<i32> {
        Ok(self.with(|rows| {
            let id = rows.iter().map(|o| o.id).max().unwrap_or(0) + 1;
            rows.push(CustomOrder {
                id,
                name: order.name,
                email: order.email,
                project_type: order.project_type,
                budget: order.budget,
                timeline: order.timeline,
                description: order.description,
                files: order.files,
                status: OrderStatus::New,
                created_at: Utc::now(),
            });
            id
        }))
    }

    async fn list(&self) -> anyhow::Result<Vec<CustomOrderSummary>> {
        Ok(self.with(|rows| {
            let mut out: Vec<CustomOrderSummary> = rows.iter().map(Into::into).collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            out
        }))
    }

    async fn get(&self, id: i32) -> anyhow::Result<Option<CustomOrder>> {
        Ok(self.with(|rows| rows.iter().find(|o| o.id == id).cloned()))
    }

    async fn set_status(&self, id: i32, status: OrderStatus) -> anyhow::Result<bool> {
        Ok(self.with(|rows| match rows.iter_mut().find(|o| o.id == id) {
            Some(order) => {
                order.status = status;
                true
            }
            None => false,
        }))
    }

    async fn delete(&self, id: i32) -> anyhow::Result<bool> {
        Ok(self.with(|rows| {
            let before = rows.len();
            rows.retain(|o| o.id != id);
            rows.len() != before
        }))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    name: String,
    email: String,
    project_type: String,
    budget: Option<String>,
    timeline: Option<String>,
    description: String,
    files: Json<Vec<Attachment>>,
    status: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderSummaryRow {
    id: i32,
    name: String,
    email: String,
    project_type: String,
    budget: Option<String>,
    timeline: Option<String>,
    description: String,
    file_count: i32,
    status: String,
    created_at: DateTime<Utc>,
}

fn parse_status(id: i32, raw: &str) -> OrderStatus {
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(id, status = raw, "unknown stored order status; treating as new");
        OrderStatus::New
    })
}

impl From<OrderRow> for CustomOrder {
    fn from(row: OrderRow) -> Self {
        Self {
            status: parse_status(row.id, &row.status),
            id: row.id,
            name: row.name,
            email: row.email,
            project_type: row.project_type,
            budget: row.budget,
            timeline: row.timeline,
            description: row.description,
            files: row.files.0,
            created_at: row.created_at,
        }
    }
}

impl From<OrderSummaryRow> for CustomOrderSummary {
    fn from(row: OrderSummaryRow) -> Self {
        Self {
            status: parse_status(row.id, &row.status),
            id: row.id,
            name: row.name,
            email: row.email,
            project_type: row.project_type,
            budget: row.budget,
            timeline: row.timeline,
            description: row.description,
            file_count: row.file_count,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS custom_orders (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                email VARCHAR(255) NOT NULL,
                project_type VARCHAR(100) NOT NULL,
                budget VARCHAR(50),
                timeline VARCHAR(255),
                description TEXT NOT NULL,
                files JSONB NOT NULL DEFAULT '[]',
                status VARCHAR(50) NOT NULL DEFAULT 'new',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create custom_orders table")?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: NewCustomOrder) -> anyhow::Result<i32> {
        let (id,) = sqlx::query_as::<_, (i32,)>(
            r#"
            INSERT INTO custom_orders (name, email, project_type, budget, timeline, description, files)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&order.name)
        .bind(&order.email)
        .bind(&order.project_type)
        .bind(&order.budget)
        .bind(&order.timeline)
        .bind(&order.description)
        .bind(Json(&order.files))
        .fetch_one(&self.pool)
        .await
        .context("insert custom order")?;
        Ok(id)
    }

    async fn list(&self) -> anyhow::Result<Vec<CustomOrderSummary>> {
        let rows = sqlx::query_as::<_, OrderSummaryRow>(
            r#"
            SELECT id, name, email, project_type, budget, timeline, description,
                COALESCE(jsonb_array_length(files), 0) AS file_count,
                COALESCE(status, 'new') AS status,
                COALESCE(created_at::timestamptz, NOW()) AS created_at
            FROM custom_orders
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("list custom orders")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get(&self, id: i32) -> anyhow::Result<Option<CustomOrder>> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, name, email, project_type, budget, timeline, description,
                COALESCE(files, '[]'::jsonb) AS files,
                COALESCE(status, 'new') AS status,
                COALESCE(created_at::timestamptz, NOW()) AS created_at
            FROM custom_orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("load custom order {id}"))?;
        Ok(row.map(Into::into))
    }

    async fn set_status(&self, id: i32, status: OrderStatus) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE custom_orders SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("update custom order {id}"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i32) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM custom_orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete custom order {id}"))?;
        Ok(result.rows_affected() > 0)
    }
}
