use std::sync::Mutex;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

pub const DEFAULT_SOURCE: &str = "unknown";
const CSV_HEADER: &str = "email,source,consent,created_at";

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Subscriber {
    pub id: i32,
    pub email: String,
    pub source: Option<String>,
    pub consent: bool,
    pub created_at: DateTime<Utc>,
}

/// Lowercased and trimmed; `None` unless it looks like an address.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    email.contains('@').then_some(email)
}

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Returns `false` when the address was already on the list.
    async fn subscribe(&self, email: &str, source: &str) -> anyhow::Result<bool>;
    /// Newest first.
    async fn list(&self) -> anyhow::Result<Vec<Subscriber>>;
    async fn delete(&self, id: i32) -> anyhow::Result<bool>;
}

#[derive(Debug, Default)]
pub struct MemorySubscriberStore {
    inner: Mutex<Vec<Subscriber>>,
}

impl MemorySubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Vec<Subscriber>) -> R) -> R {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscriberStore {
    async fn subscribe(&self, email: &str, source: &str) -> anyhow::Result<bool> {
        Ok(self.with(|rows| {
            if rows.iter().any(|s| s.email == email) {
                return false;
            }
            let id = rows.iter().map(|s| s.id).max().unwrap_or(0) + 1;
            rows.push(Subscriber {
                id,
                email: email.to_owned(),
                source: Some(source.to_owned()),
                consent: true,
                created_at: Utc::now(),
            });
            true
        }))
    }

    async fn list(&self) -> anyhow::Result<Vec<Subscriber>> {
        Ok(self.with(|rows| {
            let mut out = rows.clone();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            out
        }))
    }

    async fn delete(&self, id: i32) -> anyhow::Result<bool> {
        Ok(self.with(|rows| {
            let before = rows.len();
            rows.retain(|s| s.id != id);
            rows.len() != before
        }))
    }
}

#[derive(Debug, Clone)]
pub struct PgSubscriberStore {
    pool: PgPool,
}

impl PgSubscriberStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                id SERIAL PRIMARY KEY,
                email VARCHAR(255) UNIQUE NOT NULL,
                source VARCHAR(50),
                consent BOOLEAN NOT NULL DEFAULT true,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create subscribers table")?;
        Ok(())
    }
}

#[async_trait]
impl SubscriberStore for PgSubscriberStore {
    async fn subscribe(&self, email: &str, source: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscribers (email, source)
            VALUES ($1, $2)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(email)
        .bind(source)
        .execute(&self.pool)
        .await
        .context("insert subscriber")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> anyhow::Result<Vec<Subscriber>> {
        sqlx::query_as::<_, Subscriber>(
            r#"
            SELECT id, email, source, COALESCE(consent, true) AS consent,
                COALESCE(created_at::timestamptz, NOW()) AS created_at
            FROM subscribers
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("list subscribers")
    }

    async fn delete(&self, id: i32) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM subscribers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete subscriber {id}"))?;
        Ok(result.rows_affected() > 0)
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

pub fn subscribers_csv(subscribers: &[Subscriber]) -> String {
    let mut lines = vec![CSV_HEADER.to_owned()];
    lines.extend(subscribers.iter().map(|s| {
        [
            csv_field(&s.email),
            csv_field(s.source.as_deref().unwrap_or_default()),
            s.consent.to_string(),
            s.created_at.to_rfc3339(),
        ]
        .join(",")
    }));
    lines.join("\n")
}

pub fn export_filename(today: DateTime<Utc>) -> String {
    format!("subscribers-{}.csv", today.format("%Y-%m-%d"))
}
