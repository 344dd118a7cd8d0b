use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt as _;
use serde_json::Value;
use tower::ServiceExt as _;

use storefront::app::{AppState, Stores, router};
use storefront::config::SiteConfig;
use storefront::notify::{Email, Notifier};
use storefront::source::CatalogFetcher;

const TOKEN: &str = "admin-secret";
const DRAGON_SLUG: &str = "articulated-crystal-dragon-3d-printed-fidget-toy-1584302211";
const COASTERS_ID: &str = "1584302297";
const SIGN_ID: &str = "1584302418";

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Email>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<Email> {
        self.sent.lock().expect("lock sent mail").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        self.sent.lock().expect("lock sent mail").push(email.clone());
        Ok(())
    }
}

struct Fixture {
    app: Router,
    notifier: Arc<RecordingNotifier>,
}

fn fixture(admin_token: Option<&str>) -> anyhow::Result<Fixture> {
    fixture_with(SiteConfig {
        url: "https://shop.example.com".to_owned(),
        fallback_snapshot: "/nonexistent/storefront/listings.json".into(),
        admin_token: admin_token.map(str::to_owned),
        ..SiteConfig::default()
    })
}

fn fixture_with(config: SiteConfig) -> anyhow::Result<Fixture> {
    let fetcher = CatalogFetcher::from_config(&config)?;
    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::new(config, fetcher, Stores::in_memory(), notifier.clone());
    Ok(Fixture {
        app: router(state),
        notifier,
    })
}

async fn send(app: &Router, request: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    Ok((status, value))
}

fn get(uri: &str) -> anyhow::Result<Request<Body>> {
    Ok(Request::builder().uri(uri).body(Body::empty())?)
}

fn json_request(method: &str, uri: &str, body: &Value) -> anyhow::Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .body(Body::from(body.to_string()))?)
}

fn with_bearer(mut request: Request<Body>) -> anyhow::Result<Request<Body>> {
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, format!("Bearer {TOKEN}").parse()?);
    Ok(request)
}

fn ids(listings: &Value) -> Vec<String> {
    listings
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|l| l["id"].as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn public_catalog_endpoints() -> anyhow::Result<()> {
    let Fixture { app, .. } = fixture(None)?;

    let (status, body) = send(&app, get("/healthz")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok\n".to_owned()));

    let (status, body) = send(&app, get("/api/listings")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["listings"].as_array().map(Vec::len), Some(6));

    let (_, body) = send(&app, get("/api/listings?category=laser-engraving")?).await?;
    assert_eq!(ids(&body["listings"]), [COASTERS_ID, SIGN_ID]);

    let (_, body) = send(&app, get("/api/listings?q=planter&category=laser-engraving")?).await?;
    assert!(ids(&body["listings"]).is_empty());

    let (_, body) = send(&app, get("/api/listings?q=dragon")?).await?;
    assert_eq!(ids(&body["listings"]), ["1584302211"]);

    let (status, body) = send(&app, get(&format!("/api/listings/{DRAGON_SLUG}"))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["listing"]["slug"], DRAGON_SLUG);
    assert_eq!(body["listing"]["isAvailable"], true);
    let related = ids(&body["related"]);
    assert_eq!(related.len(), 4);
    assert!(!related.contains(&"1584302211".to_owned()));

    let (status, body) = send(&app, get("/api/listings/no-such-listing-1")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Listing not found.");

    let (_, body) = send(&app, get("/api/categories")?).await?;
    assert_eq!(body["categories"][0]["slug"], "3d-prints");
    assert_eq!(body["categories"][0]["count"], 3);
    assert_eq!(body["categories"][1]["count"], 2);

    let (_, body) = send(&app, get("/api/materials")?).await?;
    let materials: Vec<&str> = body["materials"]
        .as_array()
        .map(|m| m.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let mut sorted = materials.clone();
    sorted.sort_unstable();
    assert_eq!(materials, sorted);
    assert!(materials.contains(&"walnut"));
    Ok(())
}

#[tokio::test]
async fn admin_routes_require_configured_token() -> anyhow::Result<()> {
    let Fixture { app, .. } = fixture(Some(TOKEN))?;

    let (status, body) = send(&app, get("/api/admin/listings")?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = send(&app, get("/api/admin/listings?token=wrong")?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, get(&format!("/api/admin/listings?token={TOKEN}"))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "file");
    assert_eq!(body["count"], 6);

    let (status, _) = send(&app, with_bearer(get("/api/admin/subscribers")?)?).await?;
    assert_eq!(status, StatusCode::OK);

    let refresh = Request::builder()
        .method("POST")
        .uri(format!("/api/refresh-cache?token={TOKEN}"))
        .body(Body::empty())?;
    let (status, body) = send(&app, refresh).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["timestamp"].is_string());

    let Fixture { app: locked, .. } = fixture(None)?;
    let (status, _) = send(&locked, with_bearer(get("/api/admin/subscribers")?)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn curation_overrides_category_order() -> anyhow::Result<()> {
    let Fixture { app, .. } = fixture(Some(TOKEN))?;

    let (_, body) = send(&app, get("/api/listings?category=laser-engraving&curated=true")?).await?;
    assert_eq!(ids(&body["listings"]), [COASTERS_ID, SIGN_ID]);

    let update = serde_json::json!({
        "category": "laser-engraving",
        "listingIds": [SIGN_ID, "999", COASTERS_ID],
    });
    let (status, body) = send(
        &app,
        with_bearer(json_request("POST", "/api/admin/curated-listings", &update)?)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Saved 3 listings for laser-engraving.");

    let (_, body) = send(&app, get("/api/listings?category=laser-engraving&curated=true")?).await?;
    assert_eq!(ids(&body["listings"]), [SIGN_ID, COASTERS_ID]);

    let (_, body) = send(&app, get("/api/listings?category=laser-engraving")?).await?;
    assert_eq!(ids(&body["listings"]), [COASTERS_ID, SIGN_ID]);

    let (_, body) = send(&app, with_bearer(get("/api/admin/curated-listings")?)?).await?;
    assert_eq!(
        body["curated"]["laser-engraving"],
        serde_json::json!([SIGN_ID, "999", COASTERS_ID])
    );

    let missing = serde_json::json!({ "category": "laser-engraving" });
    let (status, body) = send(
        &app,
        with_bearer(json_request("POST", "/api/admin/curated-listings", &missing)?)?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "listingIds must be an array.");
    Ok(())
}

#[tokio::test]
async fn subscribe_is_rate_limited_per_client() -> anyhow::Result<()> {
    let Fixture { app, .. } = fixture(Some(TOKEN))?;

    let (status, body) = send(
        &app,
        json_request("POST", "/api/subscribe", &serde_json::json!({ "email": "nope" }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Valid email required.");

    for _ in 0..4 {
        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/api/subscribe",
                &serde_json::json!({ "email": " Fan@Example.com ", "source": "footer" }),
            )?,
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &app,
        json_request("POST", "/api/subscribe", &serde_json::json!({ "email": "x@example.com" }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Too many requests.");

    let (_, body) = send(&app, with_bearer(get("/api/admin/subscribers")?)?).await?;
    let subscribers = body["subscribers"].as_array().cloned().unwrap_or_default();
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0]["email"], "fan@example.com");
    assert_eq!(subscribers[0]["source"], "footer");

    let response = app
        .clone()
        .oneshot(with_bearer(get("/api/admin/export-subscribers")?)?)
        .await?;
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str()?.to_owned();
    assert!(disposition.starts_with("attachment; filename=\"subscribers-"));
    let csv = response.into_body().collect().await?.to_bytes();
    let csv = String::from_utf8(csv.to_vec())?;
    assert!(csv.starts_with("email,source,consent,created_at\nfan@example.com,footer,true,"));

    let id = subscribers[0]["id"].as_i64().unwrap_or_default();
    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/admin/subscribers?id={id}"))
        .body(Body::empty())?;
    let (status, _) = send(&app, with_bearer(delete)?).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn custom_order_is_stored_and_announced() -> anyhow::Result<()> {
    let Fixture { app, notifier } = fixture(Some(TOKEN))?;

    let bot = serde_json::json!({
        "name": "Bot",
        "email": "bot@example.com",
        "projectType": "spam",
        "description": "buy now",
        "website": "http://spam.example",
    });
    let (status, body) = send(&app, json_request("POST", "/api/custom-order", &bot)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Request submitted!");
    assert!(notifier.sent().is_empty());

    let order = serde_json::json!({
        "name": "Ada",
        "email": "ada@example.com",
        "projectType": "Laser Engraving",
        "timeline": "2 weeks",
        "description": "Engraved <b>board</b>\nwith initials",
        "files": [{ "name": "sketch.txt", "type": "text/plain", "data": "aGVsbG8=" }],
    });
    let (status, _) = send(&app, json_request("POST", "/api/custom-order", &order)?).await?;
    assert_eq!(status, StatusCode::OK);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "[Custom Order] Laser Engraving from Ada");
    assert_eq!(sent[0].reply_to.as_deref(), Some("ada@example.com"));
    assert!(sent[0].html.contains("https://shop.example.com/admin?tab=orders&amp;order=1"));
    assert!(sent[0].html.contains("Engraved &lt;b&gt;board&lt;/b&gt;<br/>with initials"));

    let (_, body) = send(&app, with_bearer(get("/api/admin/custom-orders")?)?).await?;
    assert_eq!(body["orders"][0]["file_count"], 1);
    assert_eq!(body["orders"][0]["status"], "new");
    assert!(body["orders"][0].get("files").is_none());

    let patch = serde_json::json!({ "id": "1", "status": "in-progress" });
    let (status, _) = send(
        &app,
        with_bearer(json_request("PATCH", "/api/admin/custom-orders", &patch)?)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let bad = serde_json::json!({ "id": 1, "status": "shipped" });
    let (status, body) = send(
        &app,
        with_bearer(json_request("PATCH", "/api/admin/custom-orders", &bad)?)?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid status.");

    let (_, body) = send(&app, with_bearer(get("/api/admin/custom-orders?id=1")?)?).await?;
    assert_eq!(body["order"]["status"], "in-progress");
    assert_eq!(body["order"]["files"][0]["size"], 5);

    let (status, _) = send(&app, with_bearer(get("/api/admin/custom-orders?id=9")?)?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let invalid = serde_json::json!({ "name": "Ada", "email": "ada@example.com" });
    let (status, body) = send(&app, json_request("POST", "/api/custom-order", &invalid)?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Required fields missing.");
    Ok(())
}

#[tokio::test]
async fn contact_form_sends_to_contact_address() -> anyhow::Result<()> {
    let Fixture { app, notifier } = fixture(None)?;

    let incomplete = serde_json::json!({ "name": "Eve", "email": "eve@example.com" });
    let (status, body) = send(&app, json_request("POST", "/api/contact", &incomplete)?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "All fields required.");

    let message = serde_json::json!({
        "name": "Eve",
        "email": "eve@example.com",
        "subject": "Wholesale",
        "message": "Do you sell in bulk?",
    });
    let (status, body) = send(&app, json_request("POST", "/api/contact", &message)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Message sent!");

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, SiteConfig::default().contact_email);
    assert_eq!(sent[0].subject, "[Contact] Wholesale");
    Ok(())
}

fn order_body(name: &str) -> Value {
    serde_json::json!({
        "name": name,
        "email": "maker@example.com",
        "projectType": "3D Print",
        "description": "A replacement knob",
    })
}

#[tokio::test]
async fn subscribe_and_custom_order_have_separate_budgets() -> anyhow::Result<()> {
    let Fixture { app, .. } = fixture(None)?;

    let mut statuses = Vec::new();
    for i in 0..3 {
        let body = serde_json::json!({ "email": format!("fan{i}@example.com") });
        let (status, _) = send(&app, json_request("POST", "/api/subscribe", &body)?).await?;
        statuses.push(status);
    }
    for i in 0..3 {
        let body = order_body(&format!("Maker {i}"));
        let (status, _) = send(&app, json_request("POST", "/api/custom-order", &body)?).await?;
        statuses.push(status);
    }
    assert_eq!(statuses, [StatusCode::OK; 6]);

    for i in 3..5 {
        let body = order_body(&format!("Maker {i}"));
        let (status, _) = send(&app, json_request("POST", "/api/custom-order", &body)?).await?;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = send(&app, json_request("POST", "/api/custom-order", &order_body("Late"))?).await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    Ok(())
}

#[tokio::test]
async fn stored_order_succeeds_even_when_admin_link_cannot_be_built() -> anyhow::Result<()> {
    let Fixture { app, notifier } = fixture_with(SiteConfig {
        url: "kindasaltystudio.com".to_owned(),
        fallback_snapshot: "/nonexistent/storefront/listings.json".into(),
        admin_token: Some(TOKEN.to_owned()),
        ..SiteConfig::default()
    })?;

    let (status, body) = send(&app, json_request("POST", "/api/custom-order", &order_body("Ada"))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Request submitted!");
    assert!(notifier.sent().is_empty());

    let (_, body) = send(&app, with_bearer(get("/api/admin/custom-orders")?)?).await?;
    assert_eq!(body["orders"].as_array().map(Vec::len), Some(1));
    Ok(())
}
