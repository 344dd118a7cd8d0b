use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;

pub const SHOP_ID: &str = "4242";
pub const API_KEY: &str = "stub-key";

#[derive(Debug, Clone)]
pub struct EtsyStubConfig {
    pub listings_status: u16,
    pub listings: Value,
    pub sections_status: u16,
    pub sections: Value,
    /// Per-listing image results; missing ids answer 404.
    pub images: HashMap<u64, Value>,
}

impl Default for EtsyStubConfig {
    fn default() -> Self {
        Self {
            listings_status: 200,
            listings: serde_json::json!({ "count": 0, "results": [] }),
            sections_status: 200,
            sections: serde_json::json!({ "count": 0, "results": [] }),
            images: HashMap::new(),
        }
    }
}

pub struct EtsyStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

fn json_response(status: u16, body: &Value) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("build header");
    tiny_http::Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(header)
}

impl EtsyStub {
    pub fn spawn(config: EtsyStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start etsy stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v3/application");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let listings_path = format!("/v3/application/shops/{SHOP_ID}/listings/active");
            let sections_path = format!("/v3/application/shops/{SHOP_ID}/sections");

            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                seen.lock().expect("lock request log").push(url.clone());

                let authorized = request
                    .headers()
                    .iter()
                    .any(|h| h.field.equiv("x-api-key") && h.value.as_str() == API_KEY);
                if !authorized {
                    let _ = request.respond(json_response(
                        403,
                        &serde_json::json!({ "error": "Invalid API key" }),
                    ));
                    continue;
                }

                let path = url.split('?').next().unwrap_or(&url).to_owned();
                let response = if path == listings_path {
                    json_response(config.listings_status, &config.listings)
                } else if path == sections_path {
                    json_response(config.sections_status, &config.sections)
                } else if let Some(id) = path
                    .strip_prefix("/v3/application/listings/")
                    .and_then(|rest| rest.strip_suffix("/images"))
                    .and_then(|id| id.parse::<u64>().ok())
                {
                    match config.images.get(&id) {
                        Some(images) => json_response(200, images),
                        None => json_response(404, &serde_json::json!({ "error": "not found" })),
                    }
                } else {
                    json_response(404, &serde_json::json!({ "error": "unknown path" }))
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("lock request log").clone()
    }
}

impl Drop for EtsyStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[allow(dead_code)]
pub fn listing(id: u64, title: &str, tags: &[&str], section_id: Option<u64>, images: bool) -> Value {
    let mut value = serde_json::json!({
        "listing_id": id,
        "title": title,
        "description": format!("{title} description"),
        "price": { "amount": 1850, "divisor": 100, "currency_code": "USD" },
        "tags": tags,
        "materials": [],
        "state": "active",
        "quantity": 2,
        "url": format!("https://www.etsy.com/listing/{id}"),
        "created_timestamp": 1_700_000_000,
        "updated_timestamp": 1_700_000_000,
        "shop_section_id": section_id,
    });
    if images {
        value["images"] = serde_json::json!([
            { "url_570xN": format!("https://img.example/{id}-b.jpg"), "rank": 2 },
            { "url_570xN": format!("https://img.example/{id}-a.jpg"), "rank": 1 },
        ]);
    }
    value
}
