//! Wire protocol between viewers and the broker.
//!
//! Outbound traffic is raw output chunks; the transport's own message
//! boundaries are the only framing. Inbound frames are raw input bytes,
//! except for frames starting with the reserved control prefix.

use term_broker_core::TermSize;

/// Reserved first byte marking a control frame.
pub const CONTROL_PREFIX: u8 = 0x01;

/// Control tag for resize requests: `\x01RESIZE:cols,rows`.
const RESIZE_TAG: &[u8] = b"RESIZE:";

/// Close code for a missing or rejected credential.
pub const CLOSE_UNAUTHENTICATED: u16 = 4001;

/// Close code for an unknown session id.
pub const CLOSE_NOT_FOUND: u16 = 4004;

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame<'a> {
    /// Raw input, forwarded verbatim to the process.
    Input(&'a [u8]),
    /// A resize request for the attached terminal.
    Resize(TermSize),
    /// A control-prefixed frame that does not parse; dropped, never
    /// forwarded. The connection and the session continue unaffected.
    Malformed,
}

/// Classify an inbound frame.
///
/// Any frame starting with [`CONTROL_PREFIX`] is a control frame: either a
/// well-formed resize request or `Malformed`. Everything else is input.
#[must_use]
pub fn parse_frame(data: &[u8]) -> InboundFrame<'_> {
    if data.first() != Some(&CONTROL_PREFIX) {
        return InboundFrame::Input(data);
    }

    let Some(payload) = data[1..].strip_prefix(RESIZE_TAG) else {
        return InboundFrame::Malformed;
    };
    let Ok(text) = std::str::from_utf8(payload) else {
        return InboundFrame::Malformed;
    };
    let Some((cols, rows)) = text.split_once(',') else {
        return InboundFrame::Malformed;
    };
    match (cols.trim().parse::<u16>(), rows.trim().parse::<u16>()) {
        (Ok(cols), Ok(rows)) if cols > 0 && rows > 0 => {
            InboundFrame::Resize(TermSize { rows, cols })
        }
        _ => InboundFrame::Malformed,
    }
}
