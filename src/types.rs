//! Shared types for courier

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A parsed response. Coalesced callers share the same allocation.
pub type Response = Arc<Value>;

/// Result callback. Invoked exactly once per request.
pub type Callback = Box<dyn FnOnce(Response) + Send + 'static>;

/// Listener for frames that are not request replies.
pub type OutOfBandListener = Box<dyn Fn(&str) + Send + 'static>;

/// Identifies one facade-level network request (the coalescing leader).
pub type Ticket = u64;

/// How a response for a resource key may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// Never cached and never coalesced
    #[default]
    Uncached,
    /// Cached for the lifetime of the transport
    Session,
    /// Cached until the transient tier is invalidated
    Transient,
}

impl CacheTier {
    /// Whether responses on this tier are cached (and therefore coalesced)
    pub fn is_cacheable(self) -> bool {
        !matches!(self, Self::Uncached)
    }
}

impl std::str::FromStr for CacheTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uncached" | "none" => Ok(Self::Uncached),
            "session" | "cached" => Ok(Self::Session),
            "transient" => Ok(Self::Transient),
            other => Err(format!("unknown cache tier: {other}")),
        }
    }
}

/// One logical request.
///
/// Requests without a method and without a body are plain resource fetches
/// and travel over the persistent socket; anything else uses the fallback
/// channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub key: String,
    pub tier: CacheTier,
    pub method: Option<String>,
    pub body: Option<String>,
}

impl RequestSpec {
    /// A plain resource fetch on the given tier
    pub fn new(key: impl Into<String>, tier: CacheTier) -> Self {
        Self {
            key: key.into(),
            tier,
            method: None,
            body: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Whether this request must use the fallback channel
    pub fn needs_fallback(&self) -> bool {
        self.method.is_some() || self.body.is_some()
    }
}

/// Build the error-shaped value delivered in place of a failed response
pub fn error_value(message: impl Into<String>) -> Value {
    serde_json::json!({ "error": message.into() })
}
