//! Cross-platform PTY process handles.
//!
//! Provides:
//! - `PtyProcess` - portable-pty backed `ProcessHandle` implementation
//! - `PtySpawner` - `ProcessSpawner` for a configured command
//! - Executable resolution against the process PATH

pub mod process;
pub mod resolve;
pub mod spawner;

pub use process::PtyProcess;
pub use resolve::resolve_executable;
pub use spawner::PtySpawner;
