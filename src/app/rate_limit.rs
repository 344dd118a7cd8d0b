use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use axum::http::HeaderMap;
use tokio::time::Instant;

pub const WINDOW: Duration = Duration::from_secs(60);
pub const MAX_REQUESTS: u32 = 5;
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window request counter per client key. Entries are never evicted.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(WINDOW, MAX_REQUESTS)
    }
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Counts this request; `false` once the key is over its budget.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match slots.get_mut(key) {
            Some(slot) if now <= slot.reset_at => {
                slot.count = slot.count.saturating_add(1);
                slot.count <= self.max_requests
            }
            _ => {
                slots.insert(
                    key.to_owned(),
                    Slot {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                true
            }
        }
    }
}

/// First `X-Forwarded-For` entry, or a shared key when absent.
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_owned()
}
