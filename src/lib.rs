//! Courier - multiplexing request transport
//!
//! Courier carries keyed requests to a server over one persistent WebSocket,
//! with a one-shot HTTP fallback for requests that need a method or body.
//!
//! ## Components
//!
//! - **Cache**: session and transient response tiers, plus coalescing of
//!   concurrent requests for the same key
//! - **Channel**: lazy socket lifecycle, `id;message` framing, an in-flight
//!   throttle with FIFO backlog, and replay of unanswered requests after a
//!   disconnect
//! - **Fallback**: reqwest-backed one-shot exchanges
//! - **Activity**: outstanding/total request counters driving a busy indicator
//! - **Service**: the event loop owning all of the above, and the cloneable
//!   `TransportHandle` callers use
//!
//! ```no_run
//! use courier::{CacheTier, RequestSpec, TransportBuilder, TransportConfig};
//!
//! # async fn demo() -> courier::Result<()> {
//! let handle = TransportBuilder::new(TransportConfig::default()).spawn()?;
//! let value = handle.fetch(RequestSpec::new("foo", CacheTier::Session)).await?;
//! println!("{value}");
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod cache;
pub mod channel;
pub mod config;
pub mod error;
pub mod fallback;
pub mod service;
pub mod transport;
pub mod types;

pub use config::{Args, TransportConfig};
pub use error::{Result, TransportError};
pub use service::{Event, TransportBuilder, TransportHandle};
pub use transport::{Transport, TransportStats};
pub use types::{CacheTier, RequestSpec, Response};
