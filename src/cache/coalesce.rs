//! In-flight request coalescing
//!
//! The first caller for a key becomes the leader and issues the network
//! request. Callers arriving while that request is outstanding are queued
//! behind it and share its response.

use std::collections::HashMap;

use crate::types::Callback;

/// Pending cache entries: key → callbacks waiting on the outstanding request
#[derive(Default)]
pub struct Coalescer {
    pending: HashMap<String, Vec<Callback>>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `key`.
    ///
    /// Returns `true` when the caller is the leader and must issue the
    /// request, `false` when it joined an outstanding one.
    pub fn begin(&mut self, key: &str, callback: Callback) -> bool {
        match self.pending.get_mut(key) {
            Some(waiters) => {
                waiters.push(callback);
                false
            }
            None => {
                self.pending.insert(key.to_string(), vec![callback]);
                true
            }
        }
    }

    /// Close the entry for `key`, returning its callbacks leader first
    pub fn finish(&mut self, key: &str) -> Vec<Callback> {
        self.pending.remove(key).unwrap_or_default()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    /// Number of callbacks waiting on `key`, leader included
    pub fn waiters(&self, key: &str) -> usize {
        self.pending.get(key).map(Vec::len).unwrap_or(0)
    }
}

impl std::fmt::Debug for Coalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.pending.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Response;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &str) -> Callback {
        let log = Arc::clone(log);
        let name = name.to_string();
        Box::new(move |value: Response| {
            log.lock().unwrap().push(format!("{name}:{value}"))
        })
    }

    #[test]
    fn test_first_caller_leads() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut coalescer = Coalescer::new();

        assert!(coalescer.begin("foo", recorder(&log, "leader")));
        assert!(!coalescer.begin("foo", recorder(&log, "w1")));
        assert!(!coalescer.begin("foo", recorder(&log, "w2")));
        assert!(coalescer.begin("bar", recorder(&log, "other")));
        assert_eq!(coalescer.waiters("foo"), 3);
    }

    #[test]
    fn test_finish_returns_callbacks_in_arrival_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut coalescer = Coalescer::new();
        coalescer.begin("foo", recorder(&log, "leader"));
        coalescer.begin("foo", recorder(&log, "w1"));
        coalescer.begin("foo", recorder(&log, "w2"));

        let value = Arc::new(json!(7));
        for callback in coalescer.finish("foo") {
            callback(Arc::clone(&value));
        }

        assert_eq!(*log.lock().unwrap(), vec!["leader:7", "w1:7", "w2:7"]);
        assert!(!coalescer.is_pending("foo"));

        // A new caller after completion leads again
        assert!(coalescer.begin("foo", recorder(&log, "again")));
    }

    #[test]
    fn test_finish_unknown_key_is_empty() {
        let mut coalescer = Coalescer::new();
        assert!(coalescer.finish("missing").is_empty());
    }
}
