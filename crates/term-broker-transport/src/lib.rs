//! Viewer-facing transport for terminal sessions.
//!
//! Provides:
//! - Wire protocol (raw frames + a reserved resize control prefix)
//! - WebSocket delivery bridge (feature: websocket)

pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use protocol::{CLOSE_NOT_FOUND, CLOSE_UNAUTHENTICATED, InboundFrame, parse_frame};
