//! One-shot HTTP fallback channel
//!
//! Requests that carry a method or a body cannot be expressed as a socket
//! frame. They are sent as a single HTTP exchange instead, and the raw
//! response text is handed back to the event loop for the same decoding as
//! socket replies.

use reqwest::{Client, Method};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::error::Result;
use crate::service::Event;
use crate::types::Ticket;

/// A request routed to the fallback channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackRequest {
    pub key: String,
    pub method: String,
    pub body: Option<String>,
}

/// How a fallback exchange ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// 2xx status; the response text
    Success(String),
    /// Any other status, or the exchange failed
    Failed(String),
}

/// Issues fallback exchanges without blocking the event loop
pub trait FallbackClient: Send {
    /// Start an exchange. Its outcome must be reported for `ticket`.
    fn dispatch(&mut self, ticket: Ticket, request: FallbackRequest);
}

/// reqwest-backed fallback channel
pub struct HttpFallback {
    client: Client,
    base_url: String,
    events: mpsc::UnboundedSender<Event>,
}

impl HttpFallback {
    pub fn new(config: &TransportConfig, events: mpsc::UnboundedSender<Event>) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: config.fallback_base_url.clone(),
            events,
        })
    }
}

impl FallbackClient for HttpFallback {
    fn dispatch(&mut self, ticket: Ticket, request: FallbackRequest) {
        let client = self.client.clone();
        let url = join_url(&self.base_url, &request.key);
        let events = self.events.clone();

        tokio::spawn(async move {
            let outcome = exchange(&client, &url, &request).await;
            if let FallbackOutcome::Failed(ref reason) = outcome {
                warn!(ticket, url = %url, reason = %reason, "Fallback request failed");
            }
            let _ = events.send(Event::Fallback { ticket, outcome });
        });
    }
}

async fn exchange(client: &Client, url: &str, request: &FallbackRequest) -> FallbackOutcome {
    let method = match Method::from_bytes(request.method.to_ascii_uppercase().as_bytes()) {
        Ok(method) => method,
        Err(_) => return FallbackOutcome::Failed(format!("Invalid method: {}", request.method)),
    };

    debug!(method = %method, url = %url, "Sending fallback request");

    let mut builder = client.request(method, url);
    if let Some(ref body) = request.body {
        builder = builder.body(body.clone());
    }

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => return FallbackOutcome::Failed(format!("HTTP request failed: {}", e)),
    };

    let status = response.status();
    if !status.is_success() {
        return FallbackOutcome::Failed(format!("HTTP request failed with status {}", status));
    }

    match response.text().await {
        Ok(text) => FallbackOutcome::Success(text),
        Err(e) => FallbackOutcome::Failed(format!("Failed to read response body: {}", e)),
    }
}

/// Resolve a resource key against the base URL. Absolute keys pass through.
fn join_url(base: &str, key: &str) -> String {
    if key.starts_with("http://") || key.starts_with("https://") {
        return key.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:8000", "/api/x"),
            "http://localhost:8000/api/x"
        );
        assert_eq!(
            join_url("http://localhost:8000/", "api/x"),
            "http://localhost:8000/api/x"
        );
        assert_eq!(
            join_url("http://localhost:8000", "https://other.example/y"),
            "https://other.example/y"
        );
    }

    #[tokio::test]
    async fn test_invalid_method_fails_without_network() {
        let client = Client::new();
        let request = FallbackRequest {
            key: "/x".into(),
            method: "BAD METHOD".into(),
            body: None,
        };
        let outcome = exchange(&client, "http://127.0.0.1:1/x", &request).await;
        assert!(matches!(outcome, FallbackOutcome::Failed(ref m) if m.contains("Invalid method")));
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_failure() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let config = TransportConfig {
            fallback_base_url: "http://127.0.0.1:1".to_string(),
            ..TransportConfig::default()
        };
        let mut fallback = HttpFallback::new(&config, events_tx).unwrap();

        fallback.dispatch(
            3,
            FallbackRequest {
                key: "/x".into(),
                method: "POST".into(),
                body: Some("{}".into()),
            },
        );

        match events_rx.recv().await {
            Some(Event::Fallback { ticket, outcome }) => {
                assert_eq!(ticket, 3);
                assert!(matches!(outcome, FallbackOutcome::Failed(_)));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
