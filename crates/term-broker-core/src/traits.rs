//! Traits for process handles and external collaborators.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::event::TermSize;

/// Session identifier.
pub type SessionId = Uuid;

/// Process handle error.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The command could not be found or executed. Fatal at creation time;
    /// nothing is registered when spawn fails.
    #[error("failed to launch {command}: {reason}")]
    LaunchFailure { command: String, reason: String },
    /// The process exited or its output stream became unreadable.
    /// Terminal for the owning session; never retried.
    #[error("process stream closed")]
    StreamClosed,
    /// I/O failure on a live handle (e.g. a write after the resource is gone).
    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Uniform wrapper around a spawned terminal-attached child process.
///
/// The handle exclusively owns the underlying OS resource. How the terminal
/// attachment is obtained is an implementation detail behind this trait;
/// tests substitute scripted in-memory handles.
pub trait ProcessHandle: Send + Sync {
    /// Block until at least one chunk of output is available.
    ///
    /// Never returns an empty chunk.
    ///
    /// # Errors
    /// Returns `StreamClosed` once the process has exited or the stream is
    /// unreadable. Once closed, every subsequent read fails the same way.
    fn read(&self) -> Result<Bytes, ProcessError>;

    /// Write input bytes to the process. Best-effort.
    ///
    /// # Errors
    /// Returns `Io` if the underlying resource is gone.
    fn write(&self, data: &[u8]) -> Result<(), ProcessError>;

    /// Resize the attached terminal. Best-effort; callers swallow failures.
    ///
    /// # Errors
    /// Returns `Io` if the resize ioctl fails.
    fn resize(&self, size: TermSize) -> Result<(), ProcessError>;

    /// Forcefully terminate the process.
    ///
    /// Immediate, no graceful-shutdown negotiation: shutdown paths must not
    /// hang on an uncooperative child.
    ///
    /// # Errors
    /// Returns `Io` if the kill could not be delivered.
    fn terminate(&self) -> Result<(), ProcessError>;

    /// Non-blocking liveness probe.
    fn is_alive(&self) -> bool;
}

/// Factory for process handles, injected into the session registry.
pub trait ProcessSpawner: Send + Sync {
    /// Spawn a terminal-attached process in `dir` with the given dimensions.
    ///
    /// # Errors
    /// Returns `LaunchFailure` when the command cannot be found or executed;
    /// no partial handle is produced on failure.
    fn spawn(&self, dir: &Path, size: TermSize) -> Result<Box<dyn ProcessHandle>, ProcessError>;
}

/// Authenticated caller identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Username the credential resolves to.
    pub username: String,
}

/// Credential verification error.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    Expired,
}

/// Verifies bearer credentials presented by remote viewers.
///
/// Implemented by the outer layer (token issuance is out of scope here).
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Verify a bearer token, returning the caller's identity.
    ///
    /// # Errors
    /// Returns `AuthError` when the token is invalid or expired.
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Resolves an owner key (e.g. a project id) to a working directory.
///
/// Consumed at session-creation time only, by the outer layer.
#[async_trait]
pub trait DirectoryResolver: Send + Sync {
    /// Resolve the working directory for `owner`, if known.
    async fn resolve(&self, owner: &str) -> Option<PathBuf>;
}
