//! Request facade
//!
//! `Transport` is the whole client state in one explicit context object:
//! caches, coalescing entries, activity counter, the socket channel and the
//! fallback channel. It is driven from a single task (see `service`), so
//! every method runs to completion before the next event is looked at.
//!
//! # Request path
//!
//! ```text
//! request(spec, callback)
//!   │
//!   ├─ cached? ───────────────► callback(cached)
//!   ├─ same key outstanding? ─► queue callback behind it
//!   └─ leader ─► activity.begin
//!                 ├─ no method/body ─► ChannelManager (socket)
//!                 └─ otherwise ──────► FallbackClient (HTTP)
//!
//! reply text ─► parse JSON (or error value) ─► cache ─► leader, waiters ─► activity.end
//! ```

use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::activity::{ActivityTracker, BusyIndicator};
use crate::cache::{CacheTiers, Coalescer};
use crate::channel::{ChannelManager, ChannelState, Connector, Inbound, SocketEvent};
use crate::fallback::{FallbackClient, FallbackOutcome, FallbackRequest};
use crate::service::Event;
use crate::types::{
    error_value, CacheTier, Callback, OutOfBandListener, RequestSpec, Response, Ticket,
};

/// Default method for fallback requests that only carry a body
const DEFAULT_METHOD: &str = "GET";

/// Snapshot of transport counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub channel_state: ChannelState,
    pub total_requests: u64,
    pub outstanding: usize,
    pub socket_pending: usize,
    pub socket_waiting: usize,
    pub frames_sent: u64,
    pub session_entries: usize,
    pub transient_entries: usize,
}

/// A network request awaiting its reply
struct Inflight {
    key: String,
    tier: CacheTier,
    /// Callback of an uncached request; cacheable requests keep their
    /// callbacks in the coalescer
    solo: Option<Callback>,
}

/// The transport context
pub struct Transport {
    cache: CacheTiers,
    coalescer: Coalescer,
    activity: ActivityTracker,
    channel: ChannelManager,
    fallback: Box<dyn FallbackClient>,
    inflight: HashMap<Ticket, Inflight>,
    next_ticket: Ticket,
    listeners: Vec<OutOfBandListener>,
}

impl Transport {
    pub fn new(
        connector: Box<dyn Connector>,
        fallback: Box<dyn FallbackClient>,
        indicator: Box<dyn BusyIndicator>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            cache: CacheTiers::new(),
            coalescer: Coalescer::new(),
            activity: ActivityTracker::new(indicator),
            channel: ChannelManager::new(connector, max_in_flight),
            fallback,
            inflight: HashMap::new(),
            next_ticket: 0,
            listeners: Vec::new(),
        }
    }

    /// Issue a request. The result arrives through `callback`, possibly
    /// before this returns when it is served from cache.
    pub fn request(&mut self, spec: RequestSpec, callback: Callback) {
        let solo = if spec.tier.is_cacheable() {
            if let Some(cached) = self.cache.lookup(&spec.key, spec.tier) {
                debug!(key = %spec.key, tier = ?spec.tier, "Cache hit");
                deliver(callback, cached);
                return;
            }
            if !self.coalescer.begin(&spec.key, callback) {
                debug!(key = %spec.key, "Joined outstanding request");
                return;
            }
            None
        } else {
            Some(callback)
        };

        self.activity.begin();
        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let needs_fallback = spec.needs_fallback();
        let RequestSpec {
            key,
            tier,
            method,
            body,
        } = spec;

        self.inflight.insert(
            ticket,
            Inflight {
                key: key.clone(),
                tier,
                solo,
            },
        );

        if needs_fallback {
            let method = method.unwrap_or_else(|| DEFAULT_METHOD.to_string());
            debug!(ticket, key = %key, method = %method, "Dispatching over fallback channel");
            self.fallback
                .dispatch(ticket, FallbackRequest { key, method, body });
        } else {
            debug!(ticket, key = %key, "Dispatching over socket");
            self.channel.send(key, ticket);
        }
    }

    /// Apply a socket event or a fallback completion
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Socket { generation, event } => match event {
                SocketEvent::Open => self.channel.on_open(generation),
                SocketEvent::Message(text) => match self.channel.on_message(generation, text) {
                    Ok(Inbound::Reply { ticket, body }) => self.complete(ticket, parse_response(&body)),
                    Ok(Inbound::OutOfBand(text)) => self.broadcast(&text),
                    Ok(Inbound::Stale) => {}
                    Err(e) => warn!(generation, error = %e, "Dropping reply"),
                },
                SocketEvent::Closed => self.channel.on_close(generation),
            },
            Event::Fallback { ticket, outcome } => {
                let value = match outcome {
                    FallbackOutcome::Success(text) => parse_response(&text),
                    FallbackOutcome::Failed(reason) => error_value(reason),
                };
                self.complete(ticket, value);
            }
        }
    }

    /// Drop every transient cache entry
    pub fn invalidate_transient_cache(&mut self) {
        self.cache.invalidate_transient();
    }

    /// Register a listener for frames that are not request replies
    pub fn on_out_of_band(&mut self, listener: OutOfBandListener) {
        self.listeners.push(listener);
    }

    /// Network requests started since creation
    pub fn total_request_count(&self) -> u64 {
        self.activity.total()
    }

    /// Network requests currently outstanding
    pub fn outstanding(&self) -> usize {
        self.activity.outstanding()
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            channel_state: self.channel.state(),
            total_requests: self.activity.total(),
            outstanding: self.activity.outstanding(),
            socket_pending: self.channel.pending_count(),
            socket_waiting: self.channel.waiting_count(),
            frames_sent: self.channel.total_sent(),
            session_entries: self.cache.len(CacheTier::Session),
            transient_entries: self.cache.len(CacheTier::Transient),
        }
    }

    fn complete(&mut self, ticket: Ticket, value: Value) {
        let Some(inflight) = self.inflight.remove(&ticket) else {
            warn!(ticket, "Completion for unknown ticket");
            return;
        };

        let value: Response = Arc::new(value);
        let callbacks = match inflight.solo {
            Some(callback) => vec![callback],
            None => {
                self.cache
                    .store(&inflight.key, inflight.tier, Arc::clone(&value));
                self.coalescer.finish(&inflight.key)
            }
        };

        debug!(ticket, key = %inflight.key, callbacks = callbacks.len(), "Request complete");
        for callback in callbacks {
            deliver(callback, Arc::clone(&value));
        }

        self.activity.end();
    }

    fn broadcast(&self, text: &str) {
        debug!(listeners = self.listeners.len(), "Out-of-band message");
        for listener in &self.listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(text))) {
                warn!(reason = %panic_reason(panic.as_ref()), "Out-of-band listener panicked");
            }
        }
    }
}

/// Decode reply text; malformed JSON becomes an error value
fn parse_response(text: &str) -> Value {
    serde_json::from_str(text)
        .unwrap_or_else(|_| error_value(format!("Failed to parse JSON response: {text}")))
}

/// Invoke a callback, containing any panic
fn deliver(callback: Callback, value: Response) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(move || callback(value))) {
        warn!(reason = %panic_reason(panic.as_ref()), "Response callback panicked");
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown".to_string()
    }
}
