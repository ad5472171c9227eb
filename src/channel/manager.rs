//! Persistent Channel Manager
//!
//! Single responsibility: Own the one physical socket and everything in
//! flight on it.
//!
//! # Lifecycle
//!
//! ```text
//! Absent ──send──► Connecting ──open──► Open
//!   ▲                  │                 │
//!   └──────close───────┴─────close───────┘
//!        (pending requests replayed through send)
//! ```
//!
//! - A socket is created lazily by the first send after `Absent`.
//! - Sends made while `Connecting` wait for the open event.
//! - Sends made while `Open` take a throttle unit, get a fresh request id,
//!   and are transmitted as `id;message`. Without a unit they join the
//!   throttle backlog.
//! - A close discards the socket. Every request that was transmitted and not
//!   yet answered is re-sent with its original message and ticket, followed
//!   by the sends that were still waiting. Replay may execute a request twice
//!   on the server.
//!
//! Events carry the generation of the socket that produced them. Events from
//! any generation other than the current socket's are ignored.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::frame::{self, Frame, STATUS_OK};
use super::socket::{Connector, Socket};
use super::throttle::{QueuedSend, Throttler};
use crate::error::{Result, TransportError};
use crate::types::Ticket;

/// Observable channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Absent,
    Connecting,
    Open,
}

/// What an incoming frame turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Reply to a pending request. `body` is the raw text to parse.
    Reply { ticket: Ticket, body: String },
    /// Frame not shaped like a reply
    OutOfBand(String),
    /// Event from a discarded socket
    Stale,
}

/// A request transmitted on the current socket and not yet answered
#[derive(Debug, Clone)]
struct PendingRequest {
    message: String,
    ticket: Ticket,
}

enum State {
    Absent,
    Connecting {
        socket: Box<dyn Socket>,
        generation: u64,
        awaiting_open: Vec<QueuedSend>,
    },
    Open {
        socket: Box<dyn Socket>,
        generation: u64,
    },
}

/// Owner of the persistent socket, its pending requests and its backlog
pub struct ChannelManager {
    connector: Box<dyn Connector>,
    state: State,
    /// Generation of the most recently created socket
    generation: u64,
    /// Next request id to assign
    next_id: u64,
    pending: BTreeMap<u64, PendingRequest>,
    throttler: Throttler,
    total_sent: u64,
}

impl ChannelManager {
    pub fn new(connector: Box<dyn Connector>, max_in_flight: usize) -> Self {
        Self {
            connector,
            state: State::Absent,
            generation: 0,
            next_id: 0,
            pending: BTreeMap::new(),
            throttler: Throttler::new(max_in_flight),
            total_sent: 0,
        }
    }

    /// Submit a message for transmission on behalf of `ticket`
    pub fn send(&mut self, message: String, ticket: Ticket) {
        let send = QueuedSend { message, ticket };

        if matches!(self.state, State::Absent) {
            self.open_socket();
        }

        if let State::Connecting { awaiting_open, .. } = &mut self.state {
            debug!(ticket, "Socket connecting, deferring send");
            awaiting_open.push(send);
            return;
        }

        if self.throttler.try_acquire() {
            self.transmit(send);
        } else {
            debug!(
                ticket,
                queued = self.throttler.queued() + 1,
                "In-flight limit reached, queueing send"
            );
            self.throttler.enqueue(send);
        }
    }

    /// The socket of `generation` is ready
    pub fn on_open(&mut self, generation: u64) {
        if self.current_generation() != Some(generation) {
            debug!(generation, "Ignoring open from stale socket");
            return;
        }

        let (socket, awaiting_open) = match std::mem::replace(&mut self.state, State::Absent) {
            State::Connecting {
                socket,
                awaiting_open,
                ..
            } => (socket, awaiting_open),
            other => {
                // Duplicate open
                self.state = other;
                return;
            }
        };

        info!(generation, deferred = awaiting_open.len(), "Socket open");
        self.state = State::Open { socket, generation };

        for send in awaiting_open {
            self.send(send.message, send.ticket);
        }
    }

    /// A text frame arrived on the socket of `generation`.
    ///
    /// Returns `UnknownReplyId` for a reply naming no pending request; the
    /// frame is dropped and nothing else is affected.
    pub fn on_message(&mut self, generation: u64, text: String) -> Result<Inbound> {
        if self.current_generation() != Some(generation) {
            debug!(generation, "Ignoring frame from stale socket");
            return Ok(Inbound::Stale);
        }

        let reply = match frame::decode(&text) {
            Frame::Reply { id, status, body } => {
                Some((id.to_string(), status.to_string(), body.to_string()))
            }
            Frame::OutOfBand(_) => None,
        };
        let Some((id, status, body)) = reply else {
            return Ok(Inbound::OutOfBand(text));
        };

        let pending = frame::parse_id(&id)
            .and_then(|id| self.pending.remove(&id))
            .ok_or(TransportError::UnknownReplyId(id.clone()))?;

        let body = if status == STATUS_OK {
            body
        } else {
            warn!(id = %id, status = %status, "Server reported failure");
            frame::failure_body(&text)
        };

        if let Some(next) = self.throttler.release() {
            self.send(next.message, next.ticket);
        }

        Ok(Inbound::Reply {
            ticket: pending.ticket,
            body,
        })
    }

    /// The socket of `generation` closed, errored, or never connected
    pub fn on_close(&mut self, generation: u64) {
        if self.current_generation() != Some(generation) {
            debug!(generation, "Ignoring close from stale socket");
            return;
        }

        let awaiting_open = match std::mem::replace(&mut self.state, State::Absent) {
            State::Connecting { awaiting_open, .. } => awaiting_open,
            _ => Vec::new(),
        };

        let replay = std::mem::take(&mut self.pending);
        self.throttler.restore(replay.len());
        let backlog = self.throttler.drain();

        if replay.is_empty() && awaiting_open.is_empty() && backlog.is_empty() {
            info!(generation, "Socket closed while idle");
            return;
        }

        warn!(
            generation,
            in_flight = replay.len(),
            waiting = awaiting_open.len() + backlog.len(),
            "Socket closed, replaying in-flight requests"
        );

        for (_, request) in replay {
            self.send(request.message, request.ticket);
        }
        for send in awaiting_open.into_iter().chain(backlog) {
            self.send(send.message, send.ticket);
        }
    }

    pub fn state(&self) -> ChannelState {
        match self.state {
            State::Absent => ChannelState::Absent,
            State::Connecting { .. } => ChannelState::Connecting,
            State::Open { .. } => ChannelState::Open,
        }
    }

    /// Requests transmitted and not yet answered
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Sends waiting for the socket to open or for capacity
    pub fn waiting_count(&self) -> usize {
        let awaiting = match &self.state {
            State::Connecting { awaiting_open, .. } => awaiting_open.len(),
            _ => 0,
        };
        awaiting + self.throttler.queued()
    }

    /// Throttle units currently held
    pub fn in_flight(&self) -> usize {
        self.throttler.in_use()
    }

    /// Frames transmitted since creation, replays included
    pub fn total_sent(&self) -> u64 {
        self.total_sent
    }

    fn current_generation(&self) -> Option<u64> {
        match self.state {
            State::Absent => None,
            State::Connecting { generation, .. } | State::Open { generation, .. } => {
                Some(generation)
            }
        }
    }

    fn open_socket(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        debug!(generation, "Creating socket");
        let socket = self.connector.connect(generation);
        self.state = State::Connecting {
            socket,
            generation,
            awaiting_open: Vec::new(),
        };
    }

    /// Register and transmit; the caller holds a throttle unit
    fn transmit(&mut self, send: QueuedSend) {
        let id = self.next_id;
        self.next_id += 1;

        let frame = frame::encode_request(id, &send.message);
        self.pending.insert(
            id,
            PendingRequest {
                message: send.message,
                ticket: send.ticket,
            },
        );
        self.total_sent += 1;

        if let State::Open { socket, generation } = &mut self.state {
            debug!(id, generation = *generation, "Sending request");
            if let Err(e) = socket.send(frame) {
                // The socket task is gone; its close event replays this request
                warn!(id, error = %e, "Failed to hand frame to socket");
            }
        }
    }
}
