//! `ProcessSpawner` for a configured command.

use std::path::Path;

use term_broker_core::{ProcessError, ProcessHandle, ProcessSpawner, TermSize};

use crate::{process::PtyProcess, resolve::resolve_executable};

/// Spawns PTY processes running a fixed command.
///
/// The command is resolved against PATH at every spawn, so an installation
/// that appears after startup is picked up without a restart.
#[derive(Debug, Clone)]
pub struct PtySpawner {
    program: String,
    args: Vec<String>,
}

impl PtySpawner {
    /// Create a spawner for `program` with no arguments.
    #[must_use]
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add arguments passed to every spawned process.
    #[must_use]
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl ProcessSpawner for PtySpawner {
    fn spawn(&self, dir: &Path, size: TermSize) -> Result<Box<dyn ProcessHandle>, ProcessError> {
        let program =
            resolve_executable(&self.program).ok_or_else(|| ProcessError::LaunchFailure {
                command: self.program.clone(),
                reason: "executable not found in PATH".to_string(),
            })?;
        let process = PtyProcess::spawn(&program, &self.args, dir, size)?;
        Ok(Box::new(process))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_command_fails_without_spawning() {
        let spawner = PtySpawner::new("no-such-binary-really");
        let result = spawner.spawn(Path::new("/"), TermSize::default());
        assert!(matches!(
            result,
            Err(ProcessError::LaunchFailure { command, .. }) if command == "no-such-binary-really"
        ));
    }
}
