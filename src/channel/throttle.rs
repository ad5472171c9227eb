//! Socket request throttling
//!
//! Bounds the number of requests multiplexed onto one socket. Sends that
//! find no capacity wait in a FIFO backlog and are re-submitted one at a
//! time as replies free capacity.

use std::collections::VecDeque;

use crate::types::Ticket;

/// A send deferred until capacity (or an open socket) is available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedSend {
    pub message: String,
    pub ticket: Ticket,
}

/// Capacity counter with a FIFO backlog
#[derive(Debug)]
pub struct Throttler {
    capacity: usize,
    remaining: usize,
    queue: VecDeque<QueuedSend>,
}

impl Throttler {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            remaining: capacity,
            queue: VecDeque::new(),
        }
    }

    /// Take one unit of capacity if any is left
    pub fn try_acquire(&mut self) -> bool {
        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Defer a send until capacity frees up
    pub fn enqueue(&mut self, send: QueuedSend) {
        self.queue.push_back(send);
    }

    /// Return one unit and hand back the oldest deferred send, if any.
    ///
    /// The caller re-submits the returned send right away; it acquires the
    /// unit just released.
    pub fn release(&mut self) -> Option<QueuedSend> {
        self.restore(1);
        self.queue.pop_front()
    }

    /// Return `n` units without touching the backlog
    pub fn restore(&mut self, n: usize) {
        self.remaining = (self.remaining + n).min(self.capacity);
    }

    /// Take the whole backlog, oldest first
    pub fn drain(&mut self) -> Vec<QueuedSend> {
        self.queue.drain(..).collect()
    }

    pub fn available(&self) -> usize {
        self.remaining
    }

    /// Units currently held by transmitted requests
    pub fn in_use(&self) -> usize {
        self.capacity - self.remaining
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(n: u64) -> QueuedSend {
        QueuedSend {
            message: format!("m{n}"),
            ticket: n,
        }
    }

    #[test]
    fn test_acquire_until_exhausted() {
        let mut throttler = Throttler::new(2);
        assert!(throttler.try_acquire());
        assert!(throttler.try_acquire());
        assert!(!throttler.try_acquire());
        assert_eq!(throttler.in_use(), 2);
    }

    #[test]
    fn test_release_is_fifo() {
        let mut throttler = Throttler::new(1);
        assert!(throttler.try_acquire());
        throttler.enqueue(send(1));
        throttler.enqueue(send(2));

        let next = throttler.release().expect("queued send");
        assert_eq!(next, send(1));
        // Re-submission takes the unit just released
        assert!(throttler.try_acquire());

        assert_eq!(throttler.release(), Some(send(2)));
        assert!(throttler.try_acquire());

        assert_eq!(throttler.release(), None);
        assert_eq!(throttler.available(), 1);
    }

    #[test]
    fn test_restore_never_exceeds_capacity() {
        let mut throttler = Throttler::new(3);
        throttler.try_acquire();
        throttler.restore(10);
        assert_eq!(throttler.available(), 3);
        assert_eq!(throttler.in_use(), 0);
    }

    #[test]
    fn test_drain_empties_backlog() {
        let mut throttler = Throttler::new(1);
        throttler.enqueue(send(1));
        throttler.enqueue(send(2));
        assert_eq!(throttler.drain(), vec![send(1), send(2)]);
        assert_eq!(throttler.queued(), 0);
    }
}
