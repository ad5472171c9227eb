//! Response cache tiers
//!
//! - **Session**: entries live as long as the transport, never evicted
//! - **Transient**: entries live until the whole tier is invalidated
//! - **Uncached**: pass-through; lookups miss, stores are dropped
//!
//! Error-shaped responses are stored like any other value. Callers must
//! tolerate a cached `{"error": ...}` object.

use std::collections::HashMap;
use tracing::debug;

use crate::types::{CacheTier, Response};

/// Key → response stores for the cacheable tiers
#[derive(Debug, Default)]
pub struct CacheTiers {
    session: HashMap<String, Response>,
    transient: HashMap<String, Response>,
}

impl CacheTiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached response
    pub fn lookup(&self, key: &str, tier: CacheTier) -> Option<Response> {
        match tier {
            CacheTier::Uncached => None,
            CacheTier::Session => self.session.get(key).cloned(),
            CacheTier::Transient => self.transient.get(key).cloned(),
        }
    }

    /// Store a response, replacing any previous one for the key
    pub fn store(&mut self, key: &str, tier: CacheTier, value: Response) {
        match tier {
            CacheTier::Uncached => {}
            CacheTier::Session => {
                self.session.insert(key.to_string(), value);
            }
            CacheTier::Transient => {
                self.transient.insert(key.to_string(), value);
            }
        }
    }

    /// Drop every transient entry
    pub fn invalidate_transient(&mut self) {
        debug!(entries = self.transient.len(), "Invalidating transient cache");
        self.transient.clear();
    }

    /// Number of entries held in a tier
    pub fn len(&self, tier: CacheTier) -> usize {
        match tier {
            CacheTier::Uncached => 0,
            CacheTier::Session => self.session.len(),
            CacheTier::Transient => self.transient.len(),
        }
    }
}
