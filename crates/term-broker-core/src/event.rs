//! Mailbox events and terminal geometry.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One element of a subscriber mailbox.
///
/// A mailbox carries a sequence of `Data` chunks terminated by a single
/// `Closed` sentinel. Nothing follows the sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// A chunk of process output, in production order.
    Data(Bytes),
    /// End of stream: the process exited or the session was destroyed.
    Closed,
}

impl OutputEvent {
    /// Whether this event is the end-of-stream sentinel.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Write end of a subscriber mailbox, held by the session.
///
/// Unbounded so the reader thread can publish without touching the async
/// runtime; backpressure is bounded by the process output rate.
pub type OutputSender = mpsc::UnboundedSender<OutputEvent>;

/// Read end of a subscriber mailbox, drained by a delivery bridge.
pub type OutputReceiver = mpsc::UnboundedReceiver<OutputEvent>;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSize {
    /// Number of rows.
    pub rows: u16,
    /// Number of columns.
    pub cols: u16,
}

impl Default for TermSize {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 120,
        }
    }
}
