//! Passive capture of the browser's outbound network traffic.
//!
//! Every `Network.requestWillBeSent` event on the session's page is folded
//! into a growing list of [`CapturedRequest`]s. The list is append-only
//! between explicit clears and is owned by exactly one session; it dies with
//! the session's teardown.

use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
use chromiumoxide::Page;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::core::types::CapturedRequest;

/// Shared, clearable capture list. Cloning shares the underlying list.
#[derive(Debug, Clone, Default)]
pub struct CaptureStore {
    inner: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl CaptureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, request: CapturedRequest) {
        if let Ok(mut list) = self.inner.lock() {
            list.push(request);
        }
    }

    /// Point-in-time copy of everything captured since session start or the
    /// last clear.
    pub fn snapshot(&self) -> Vec<CapturedRequest> {
        self.inner
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Reset the list without touching the underlying session.
    pub fn clear(&self) {
        if let Ok(mut list) = self.inner.lock() {
            list.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|list| list.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Subscribe to the page's request events and drain them into `store`.
/// The returned task runs until aborted at session teardown.
pub async fn spawn_listener(
    page: &Page,
    store: CaptureStore,
) -> anyhow::Result<JoinHandle<()>> {
    let mut events = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| anyhow::anyhow!("network event subscription failed: {e}"))?;

    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            store.push(capture_from_event(&event));
        }
    }))
}

/// Flatten one CDP request event into the session-local capture type.
pub fn capture_from_event(event: &EventRequestWillBeSent) -> CapturedRequest {
    let request = &event.request;
    CapturedRequest {
        url: request.url.clone(),
        method: request.method.clone(),
        headers: header_map(&request.headers),
        body: request
            .post_data_entries
            .as_ref()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.bytes.clone())
                    .flat_map(|bytes| String::from(bytes).into_bytes())
                    .collect()
            })
            .unwrap_or_default(),
        timestamp: chrono::Utc::now(),
    }
}

/// CDP reports headers as a loose JSON object; normalize to string pairs.
fn header_map<T: serde::Serialize>(headers: &T) -> HashMap<String, String> {
    let Ok(serde_json::Value::Object(map)) = serde_json::to_value(headers) else {
        return HashMap::new();
    };
    map.into_iter()
        .map(|(name, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (name, value)
        })
        .collect()
}
