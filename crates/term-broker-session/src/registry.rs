//! Process-wide session table.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use term_broker_core::{ProcessError, ProcessSpawner, SessionId, TermSize};
use tokio::sync::Mutex;

use crate::session::{Session, SessionInfo};

/// Registry of sessions keyed by id, with a secondary lookup by owner key.
///
/// One explicit instance is created at startup and torn down through
/// [`SessionRegistry::shutdown_all`] at process exit, so no spawned child
/// outlives the broker.
pub struct SessionRegistry {
    spawner: Arc<dyn ProcessSpawner>,
    dimensions: TermSize,
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create a registry spawning processes through `spawner` at the
    /// default terminal dimensions.
    #[must_use]
    pub fn new(spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            spawner,
            dimensions: TermSize::default(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Return the Alive session for `owner`, or spawn and register a new one.
    ///
    /// The lookup-or-create sequence holds the table lock, so concurrent
    /// callers for the same owner key observe exactly one decision and at
    /// most one process is spawned.
    ///
    /// # Errors
    /// Propagates `LaunchFailure` from the spawner; nothing is registered on
    /// failure.
    pub async fn create_or_reuse(
        &self,
        owner: &str,
        directory: PathBuf,
    ) -> Result<SessionId, ProcessError> {
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions
            .values()
            .find(|s| s.owner() == owner && s.is_alive())
        {
            tracing::debug!(owner, session = %existing.id(), "reusing live session");
            return Ok(existing.id());
        }

        let spawner = Arc::clone(&self.spawner);
        let dimensions = self.dimensions;
        let spawn_dir = directory.clone();
        let process = tokio::task::spawn_blocking(move || spawner.spawn(&spawn_dir, dimensions))
            .await
            .map_err(|err| ProcessError::LaunchFailure {
                command: String::new(),
                reason: format!("spawn task failed: {err}"),
            })??;

        let session = Session::start(owner, directory, process);
        let id = session.id();
        tracing::info!(owner, session = %id, "session created");
        sessions.insert(id, session);
        Ok(id)
    }

    /// Look up a session by id. Terminated sessions remain addressable
    /// until destroyed, so late viewers can still replay history.
    pub async fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(&id).cloned()
    }

    /// Look up the Alive session for an owner key, if any.
    pub async fn get_by_owner(&self, owner: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .await
            .values()
            .find(|s| s.owner() == owner && s.is_alive())
            .cloned()
    }

    /// Snapshot of every registered session.
    pub async fn list(&self) -> Vec<SessionInfo> {
        self.sessions
            .lock()
            .await
            .values()
            .map(|s| s.info())
            .collect()
    }

    /// Destroy a session: remove it from the table, deliver the sentinel to
    /// its subscribers and kill its process. A no-op for unknown ids, so
    /// repeated calls are safe.
    pub async fn destroy(&self, id: SessionId) {
        let session = self.sessions.lock().await.remove(&id);
        if let Some(session) = session {
            tracing::info!(session = %id, "session destroyed");
            session.shutdown().await;
        }
    }

    /// Destroy every remaining session. Called once at process teardown.
    pub async fn shutdown_all(&self) {
        let sessions: Vec<_> = self.sessions.lock().await.drain().collect();
        for (id, session) in sessions {
            tracing::info!(session = %id, "session destroyed at shutdown");
            session.shutdown().await;
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use bytes::Bytes;
    use term_broker_core::{OutputEvent, ProcessHandle};

    use super::*;

    /// Blocks on read forever, as an interactive process with no output.
    struct IdleProcess;

    impl ProcessHandle for IdleProcess {
        fn read(&self) -> Result<Bytes, ProcessError> {
            loop {
                std::thread::park();
            }
        }
        fn write(&self, _data: &[u8]) -> Result<(), ProcessError> {
            Ok(())
        }
        fn resize(&self, _size: TermSize) -> Result<(), ProcessError> {
            Ok(())
        }
        fn terminate(&self) -> Result<(), ProcessError> {
            Ok(())
        }
        fn is_alive(&self) -> bool {
            true
        }
    }

    /// Exits before producing any output.
    struct ClosedProcess;

    impl ProcessHandle for ClosedProcess {
        fn read(&self) -> Result<Bytes, ProcessError> {
            Err(ProcessError::StreamClosed)
        }
        fn write(&self, _data: &[u8]) -> Result<(), ProcessError> {
            Ok(())
        }
        fn resize(&self, _size: TermSize) -> Result<(), ProcessError> {
            Ok(())
        }
        fn terminate(&self) -> Result<(), ProcessError> {
            Ok(())
        }
        fn is_alive(&self) -> bool {
            false
        }
    }

    struct FakeSpawner {
        exits_immediately: bool,
        spawned: AtomicUsize,
    }

    impl FakeSpawner {
        fn idle() -> Self {
            Self {
                exits_immediately: false,
                spawned: AtomicUsize::new(0),
            }
        }

        fn short_lived() -> Self {
            Self {
                exits_immediately: true,
                spawned: AtomicUsize::new(0),
            }
        }
    }

    impl ProcessSpawner for FakeSpawner {
        fn spawn(
            &self,
            _dir: &Path,
            _size: TermSize,
        ) -> Result<Box<dyn ProcessHandle>, ProcessError> {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            if self.exits_immediately {
                Ok(Box::new(ClosedProcess))
            } else {
                Ok(Box::new(IdleProcess))
            }
        }
    }

    struct FailingSpawner;

    impl ProcessSpawner for FailingSpawner {
        fn spawn(
            &self,
            _dir: &Path,
            _size: TermSize,
        ) -> Result<Box<dyn ProcessHandle>, ProcessError> {
            Err(ProcessError::LaunchFailure {
                command: "agent".to_string(),
                reason: "executable not found in PATH".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn concurrent_create_for_one_owner_spawns_once() {
        let spawner = Arc::new(FakeSpawner::idle());
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&spawner) as Arc<dyn ProcessSpawner>
        ));

        let a = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.create_or_reuse("proj_1", PathBuf::from("/tmp")).await }
        });
        let b = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.create_or_reuse("proj_1", PathBuf::from("/tmp")).await }
        });

        let first = a.await.unwrap().unwrap();
        let second = b.await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(spawner.spawned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_owners_get_distinct_sessions() {
        let spawner = Arc::new(FakeSpawner::idle());
        let registry = SessionRegistry::new(Arc::clone(&spawner) as Arc<dyn ProcessSpawner>);

        let a = registry
            .create_or_reuse("proj_1", PathBuf::from("/tmp"))
            .await
            .unwrap();
        let b = registry
            .create_or_reuse("proj_2", PathBuf::from("/tmp"))
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(spawner.spawned.load(Ordering::SeqCst), 2);
        assert_eq!(registry.get_by_owner("proj_1").await.unwrap().id(), a);
    }

    #[tokio::test]
    async fn dead_session_is_replaced_on_next_create() {
        let spawner = Arc::new(FakeSpawner::short_lived());
        let registry = SessionRegistry::new(Arc::clone(&spawner) as Arc<dyn ProcessSpawner>);

        let first = registry
            .create_or_reuse("proj_1", PathBuf::from("/tmp"))
            .await
            .unwrap();

        // Wait for the reader loop to observe the immediate exit.
        let session = registry.get(first).await.unwrap();
        let mut sub = session.subscribe();
        assert_eq!(sub.events.recv().await, Some(OutputEvent::Closed));

        let second = registry
            .create_or_reuse("proj_1", PathBuf::from("/tmp"))
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(spawner.spawned.load(Ordering::SeqCst), 2);

        // The dead session stays addressable by id until destroyed.
        assert!(registry.get(first).await.is_some());
        assert!(registry.get_by_owner("proj_1").await.unwrap().id() == second);
    }

    #[tokio::test]
    async fn launch_failure_registers_nothing() {
        let registry = SessionRegistry::new(Arc::new(FailingSpawner));
        let result = registry
            .create_or_reuse("proj_1", PathBuf::from("/tmp"))
            .await;
        assert!(matches!(result, Err(ProcessError::LaunchFailure { .. })));
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_unknown_ids_are_ignored() {
        let registry = SessionRegistry::new(Arc::new(FakeSpawner::idle()));
        let id = registry
            .create_or_reuse("proj_1", PathBuf::from("/tmp"))
            .await
            .unwrap();

        let session = registry.get(id).await.unwrap();
        let mut sub = session.subscribe();

        registry.destroy(id).await;
        registry.destroy(id).await;
        registry.destroy(SessionId::new_v4()).await;

        assert_eq!(sub.events.recv().await, Some(OutputEvent::Closed));
        assert!(sub.events.try_recv().is_err());
        assert!(registry.get(id).await.is_none());
    }

    #[tokio::test]
    async fn shutdown_all_destroys_every_session() {
        let registry = SessionRegistry::new(Arc::new(FakeSpawner::idle()));
        let a = registry
            .create_or_reuse("proj_1", PathBuf::from("/tmp"))
            .await
            .unwrap();
        let b = registry
            .create_or_reuse("proj_2", PathBuf::from("/tmp"))
            .await
            .unwrap();

        let sa = registry.get(a).await.unwrap();
        let sb = registry.get(b).await.unwrap();

        registry.shutdown_all().await;

        assert!(registry.list().await.is_empty());
        assert!(!sa.is_alive());
        assert!(!sb.is_alive());
    }
}
