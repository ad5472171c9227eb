//! Persistent Socket Channel
//!
//! | Module     | Responsibility                                     |
//! |------------|----------------------------------------------------|
//! | `frame`    | `id;message` / `id;status;body` wire framing        |
//! | `throttle` | Cap on in-flight requests, FIFO backlog             |
//! | `socket`   | Socket seam and the tokio-tungstenite connector     |
//! | `manager`  | Socket lifecycle, pending requests, replay on close |

pub mod frame;
pub mod manager;
pub mod socket;
pub mod throttle;

pub use manager::{ChannelManager, ChannelState, Inbound};
pub use socket::{Connector, Socket, SocketEvent, WsConnector};
pub use throttle::{QueuedSend, Throttler};
