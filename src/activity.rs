//! Outstanding-work tracking for the busy/idle indicator

use tracing::{debug, warn};

/// External busy/idle indicator (e.g. a loading spinner)
pub trait BusyIndicator: Send {
    /// Called when the first request starts
    fn show(&mut self);
    /// Called when the last outstanding request finishes
    fn hide(&mut self);
}

/// Indicator that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndicator;

impl BusyIndicator for NoopIndicator {
    fn show(&mut self) {}
    fn hide(&mut self) {}
}

/// Indicator that logs transitions
#[derive(Debug, Default, Clone, Copy)]
pub struct LogIndicator;

impl BusyIndicator for LogIndicator {
    fn show(&mut self) {
        debug!("Transport busy");
    }

    fn hide(&mut self) {
        debug!("Transport idle");
    }
}

/// Counts outstanding network requests.
///
/// `begin()`/`end()` bracket every request that leaves the process, on
/// either channel. Cache hits and coalesced waiters are not counted.
pub struct ActivityTracker {
    outstanding: usize,
    total: u64,
    indicator: Box<dyn BusyIndicator>,
}

impl ActivityTracker {
    pub fn new(indicator: Box<dyn BusyIndicator>) -> Self {
        Self {
            outstanding: 0,
            total: 0,
            indicator,
        }
    }

    /// A network request started
    pub fn begin(&mut self) {
        self.total += 1;
        self.outstanding += 1;
        if self.outstanding == 1 {
            self.indicator.show();
        }
    }

    /// A network request finished
    pub fn end(&mut self) {
        if self.outstanding == 0 {
            warn!("Activity end without matching begin");
            return;
        }
        self.outstanding -= 1;
        if self.outstanding == 0 {
            self.indicator.hide();
        }
    }

    /// Requests currently outstanding
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Requests started since the tracker was created
    pub fn total(&self) -> u64 {
        self.total
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new(Box::new(NoopIndicator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording(Arc<Mutex<Vec<&'static str>>>);

    impl BusyIndicator for Recording {
        fn show(&mut self) {
            self.0.lock().unwrap().push("show");
        }
        fn hide(&mut self) {
            self.0.lock().unwrap().push("hide");
        }
    }

    #[test]
    fn test_show_and_hide_on_edges_only() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tracker = ActivityTracker::new(Box::new(Recording(Arc::clone(&log))));

        tracker.begin();
        tracker.begin();
        tracker.end();
        assert_eq!(*log.lock().unwrap(), vec!["show"]);

        tracker.end();
        assert_eq!(*log.lock().unwrap(), vec!["show", "hide"]);
        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(tracker.total(), 2);
    }

    #[test]
    fn test_end_never_goes_negative() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tracker = ActivityTracker::new(Box::new(Recording(Arc::clone(&log))));

        tracker.end();
        assert_eq!(tracker.outstanding(), 0);
        assert!(log.lock().unwrap().is_empty());

        tracker.begin();
        assert_eq!(*log.lock().unwrap(), vec!["show"]);
    }
}
