//! Caching layers consulted before any network request
//!
//! - `tiers`: session and transient response stores
//! - `coalesce`: sharing of one outstanding request between callers

pub mod coalesce;
pub mod tiers;

pub use coalesce::Coalescer;
pub use tiers::CacheTiers;
