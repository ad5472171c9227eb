//! Transport event loop
//!
//! One task owns the `Transport` context. Caller commands, socket events and
//! fallback completions all reach it as messages, and it applies them one at
//! a time, so no state is shared across tasks and nothing needs a lock.
//!
//! ```text
//! TransportHandle ──Command──┐
//!                             ├──► event loop ──► Transport
//! socket tasks ─────Event────┤
//! fallback tasks ───Event────┘
//! ```
//!
//! The loop does not start processing until the ready gate fires (or its
//! sender is dropped). Commands sent before that are buffered.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::activity::{BusyIndicator, NoopIndicator};
use crate::channel::{Connector, SocketEvent, WsConnector};
use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::fallback::{FallbackClient, FallbackOutcome, HttpFallback};
use crate::transport::{Transport, TransportStats};
use crate::types::{Callback, OutOfBandListener, RequestSpec, Response};

/// Something that happened outside the loop
#[derive(Debug)]
pub enum Event {
    /// Lifecycle or frame from the socket of `generation`
    Socket {
        generation: u64,
        event: SocketEvent,
    },
    /// A fallback exchange finished
    Fallback {
        ticket: u64,
        outcome: FallbackOutcome,
    },
}

impl Event {
    pub fn socket(generation: u64, event: SocketEvent) -> Self {
        Self::Socket { generation, event }
    }
}

/// Caller requests to the loop
enum Command {
    Request(RequestSpec, Callback),
    InvalidateTransient,
    OnOutOfBand(OutOfBandListener),
    TotalRequests(oneshot::Sender<u64>),
    Stats(oneshot::Sender<TransportStats>),
    Shutdown,
}

/// Configures and starts a transport
pub struct TransportBuilder {
    config: TransportConfig,
    indicator: Box<dyn BusyIndicator>,
    ready: Option<oneshot::Receiver<()>>,
    connector: Option<Box<dyn Connector>>,
    fallback: Option<Box<dyn FallbackClient>>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl TransportBuilder {
    pub fn new(config: TransportConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            indicator: Box::new(NoopIndicator),
            ready: None,
            connector: None,
            fallback: None,
            events_tx,
            events_rx,
        }
    }

    /// Busy/idle indicator to drive
    pub fn indicator(mut self, indicator: impl BusyIndicator + 'static) -> Self {
        self.indicator = Box::new(indicator);
        self
    }

    /// Hold all processing until `ready` fires
    pub fn ready_gate(mut self, ready: oneshot::Receiver<()>) -> Self {
        self.ready = Some(ready);
        self
    }

    /// Replace the WebSocket connector. It must report through `event_sender()`.
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    /// Replace the HTTP fallback. It must report through `event_sender()`.
    pub fn fallback(mut self, fallback: impl FallbackClient + 'static) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Sender custom connectors and fallbacks report events on
    pub fn event_sender(&self) -> mpsc::UnboundedSender<Event> {
        self.events_tx.clone()
    }

    /// Validate the configuration and start the loop on the current runtime
    pub fn spawn(self) -> Result<TransportHandle> {
        self.config.validate()?;

        let connector = match self.connector {
            Some(connector) => connector,
            None => Box::new(WsConnector::new(&self.config, self.events_tx.clone())),
        };
        let fallback = match self.fallback {
            Some(fallback) => fallback,
            None => Box::new(HttpFallback::new(&self.config, self.events_tx.clone())?),
        };

        let transport = Transport::new(
            connector,
            fallback,
            self.indicator,
            self.config.max_in_flight,
        );

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        info!(
            endpoint = %self.config.endpoint,
            max_in_flight = self.config.max_in_flight,
            "Starting transport"
        );
        tokio::spawn(run(transport, commands_rx, self.events_rx, self.ready));

        Ok(TransportHandle {
            commands: commands_tx,
        })
    }
}

/// Cloneable entry point to a running transport
#[derive(Clone)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl TransportHandle {
    /// Start a request; the result is delivered to `callback`.
    ///
    /// Returns before the result is known. There is no way to cancel.
    pub fn request<F>(&self, spec: RequestSpec, callback: F) -> Result<()>
    where
        F: FnOnce(Response) + Send + 'static,
    {
        self.command(Command::Request(spec, Box::new(callback)))
    }

    /// Issue a request and wait for its result
    pub async fn fetch(&self, spec: RequestSpec) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        self.request(spec, move |value| {
            let _ = tx.send(value);
        })?;
        rx.await.map_err(|_| TransportError::Closed)
    }

    /// Drop every transient cache entry
    pub fn invalidate_transient_cache(&self) -> Result<()> {
        self.command(Command::InvalidateTransient)
    }

    /// Register a listener for out-of-band frames
    pub fn on_out_of_band<F>(&self, listener: F) -> Result<()>
    where
        F: Fn(&str) + Send + 'static,
    {
        self.command(Command::OnOutOfBand(Box::new(listener)))
    }

    /// Network requests started so far
    pub async fn total_request_count(&self) -> Result<u64> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::TotalRequests(tx))?;
        rx.await.map_err(|_| TransportError::Closed)
    }

    pub async fn stats(&self) -> Result<TransportStats> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Stats(tx))?;
        rx.await.map_err(|_| TransportError::Closed)
    }

    /// Stop the loop. Outstanding callbacks are dropped without being called.
    pub fn shutdown(&self) -> Result<()> {
        self.command(Command::Shutdown)
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| TransportError::Closed)
    }
}

async fn run(
    mut transport: Transport,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: mpsc::UnboundedReceiver<Event>,
    ready: Option<oneshot::Receiver<()>>,
) {
    if let Some(ready) = ready {
        debug!("Waiting for ready signal");
        let _ = ready.await;
    }
    debug!("Transport loop running");

    loop {
        tokio::select! {
            biased;

            event = events.recv() => match event {
                Some(event) => transport.handle_event(event),
                None => break,
            },
            command = commands.recv() => match command {
                Some(Command::Request(spec, callback)) => transport.request(spec, callback),
                Some(Command::InvalidateTransient) => transport.invalidate_transient_cache(),
                Some(Command::OnOutOfBand(listener)) => transport.on_out_of_band(listener),
                Some(Command::TotalRequests(reply)) => {
                    let _ = reply.send(transport.total_request_count());
                }
                Some(Command::Stats(reply)) => {
                    let _ = reply.send(transport.stats());
                }
                Some(Command::Shutdown) | None => break,
            },
        }
    }

    info!(
        outstanding = transport.outstanding(),
        "Transport loop stopped"
    );
}
