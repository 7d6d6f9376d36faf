//! Session lifecycle for terminal-attached processes.
//!
//! A `Session` owns one process handle, a bounded replay buffer and a set of
//! subscriber mailboxes, fed by a dedicated reader thread. The
//! `SessionRegistry` is the process-wide table of sessions, keyed by id with
//! a secondary lookup by owner key.

pub mod buffer;
pub mod registry;
pub mod session;

pub use buffer::ReplayBuffer;
pub use registry::SessionRegistry;
pub use session::{Session, SessionInfo, Subscription};
