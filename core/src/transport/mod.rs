//! The transport multiplexing primitive the scheduler drives.
//!
//! # Design
//! A `Transport` knows how to turn a `PreparedRequest` into a native handle,
//! run many handles at once, and report completions. The scheduler only
//! talks to this trait, so its bookkeeping can be exercised against a
//! scripted transport without sockets. Handles are identified by the
//! scheduler's `TransferId`, which the transport stores alongside its own
//! handle; nothing is keyed by object identity.
//!
//! Releasing a handle is dropping it. Closing the multiplexer is dropping
//! the transport.

pub mod curl;
#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::http::PreparedRequest;

pub use self::curl::{Collector, CurlTransport};

/// Scheduler-assigned identity of one transfer. Monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransferId(pub u64);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transport metadata collected when a transfer leaves the multiplexer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferInfo {
    pub effective_url: Option<String>,
    pub response_code: u32,
    pub total_time: Duration,
    pub content_type: Option<String>,
    pub redirect_count: u32,
    pub header_size: u64,
    pub primary_ip: Option<String>,
}

/// The accumulated content of a finished transfer plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub content: Bytes,
    pub info: TransferInfo,
}

/// Something the multiplexer reported while draining its message queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The transfer finished, successfully or not.
    Done {
        id: TransferId,
        result: Result<(), TransportError>,
    },
    /// Any other message. Never expected from a correct transport.
    Unexpected {
        id: Option<TransferId>,
        detail: String,
    },
}

/// A non-blocking multiplexer of HTTP transfers.
pub trait Transport {
    type Handle: 'static;

    /// Build a native handle for the request. Performs no I/O.
    fn prepare(&mut self, request: &PreparedRequest) -> Result<Self::Handle, TransportError>;

    /// Start tracking `handle` under `id`. On error the handle is released.
    fn register(&mut self, id: TransferId, handle: Self::Handle) -> Result<(), TransportError>;

    /// Block until some transfer is ready or `timeout` elapses.
    fn wait(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Do whatever work is immediately possible. Returns `true` when the
    /// transport asks to be driven again right away.
    fn drive(&mut self) -> Result<bool, TransportError>;

    fn next_event(&mut self) -> Option<Event>;

    /// Stop tracking `id`, release its handle and hand back what it read.
    fn deregister(&mut self, id: TransferId) -> Result<Transfer, TransportError>;
}
