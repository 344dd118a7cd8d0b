use anyhow::Context as _;
use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::orders::NewCustomOrder;
use crate::text::{escape_html, html_multiline};

pub const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
    #[serde(rename = "reply_to", skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

/// Used when no email API key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            reply_to = email.reply_to.as_deref().unwrap_or("n/a"),
            "[EMAIL PLACEHOLDER] email delivery not configured"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ResendNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl ResendNotifier {
    pub fn new(api_key: &str, from: &str) -> anyhow::Result<Self> {
        Self::with_endpoint(RESEND_ENDPOINT, api_key, from)
    }

    pub fn with_endpoint(endpoint: &str, api_key: &str, from: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("build email http client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_owned(),
            api_key: api_key.to_owned(),
            from: from.to_owned(),
        })
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "from": self.from,
            "to": [email.to],
            "subject": email.subject,
            "html": email.html,
            "reply_to": email.reply_to,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = parse_error_message(&raw).unwrap_or(raw);
            anyhow::bail!("email API error ({status}): {message}");
        }
        tracing::info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("message")?.as_str()?.to_owned();
    Some(message)
}

pub fn contact_email(to: &str, name: &str, email: &str, subject: &str, message: &str) -> Email {
    Email {
        to: to.to_owned(),
        subject: format!("[Contact] {subject}"),
        html: format!(
            "<p><strong>From:</strong> {} ({})</p><p><strong>Subject:</strong> {}</p><hr/><p>{}</p>",
            escape_html(name),
            escape_html(email),
            escape_html(subject),
            html_multiline(message),
        ),
        reply_to: Some(email.to_owned()),
    }
}

pub fn admin_order_link(site_url: &str, order_id: Option<i32>) -> anyhow::Result<String> {
    let mut link =
        Url::parse(site_url).with_context(|| format!("parse site url: {site_url}"))?;
    link.path_segments_mut()
        .map_err(|()| anyhow::anyhow!("site url cannot carry a path: {site_url}"))?
        .pop_if_empty()
        .push("admin");
    {
        let mut query = link.query_pairs_mut();
        query.append_pair("tab", "orders");
        if let Some(id) = order_id {
            query.append_pair("order", &id.to_string());
        }
    }
    Ok(link.into())
}

fn optional(value: Option<&str>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .map(escape_html)
        .unwrap_or_else(|| "Not specified".to_owned())
}

pub fn custom_order_email(to: &str, admin_link: &str, order: &NewCustomOrder) -> Email {
    let attachments = if order.files.is_empty() {
        String::new()
    } else {
        let names: Vec<String> = order
            .files
            .iter()
            .map(|f| format!("{} ({:.1} KB)", escape_html(&f.name), f.size as f64 / 1024.0))
            .collect();
        format!("<p><strong>Attachments:</strong> {}</p>", names.join(", "))
    };
    let link = escape_html(admin_link);

    let html = format!(
        "<h2>New Custom Order Request</h2>\
         <p><strong>Name:</strong> {name}</p>\
         <p><strong>Email:</strong> {email}</p>\
         <p><strong>Type:</strong> {project_type}</p>\
         <p><strong>Budget:</strong> {budget}</p>\
         <p><strong>Timeline:</strong> {timeline}</p>\
         {attachments}\
         <hr/>\
         <p><strong>Description:</strong></p>\
         <p>{description}</p>\
         <hr/>\
         <p><a href=\"{link}\">View in Admin Dashboard</a></p>\
         <p>Or copy this link: {link}</p>",
        name = escape_html(&order.name),
        email = escape_html(&order.email),
        project_type = escape_html(&order.project_type),
        budget = optional(order.budget.as_deref()),
        timeline = optional(order.timeline.as_deref()),
        description = html_multiline(&order.description),
    );

    Email {
        to: to.to_owned(),
        subject: format!("[Custom Order] {} from {}", order.project_type, order.name),
        html,
        reply_to: Some(order.email.clone()),
    }
}
