//! Core abstractions for the terminal session broker.
//!
//! This crate provides the fundamental building blocks:
//! - `OutputEvent` - Mailbox element: output chunk or end-of-stream sentinel
//! - `TermSize` - Terminal geometry
//! - `ProcessHandle` / `ProcessSpawner` - Seam over terminal-attached processes
//! - Collaborator traits for credential verification and directory resolution

pub mod event;
pub mod traits;

pub use event::{OutputEvent, OutputReceiver, OutputSender, TermSize};
pub use traits::{
    AuthError, CredentialVerifier, DirectoryResolver, Identity, ProcessError, ProcessHandle,
    ProcessSpawner, SessionId,
};
