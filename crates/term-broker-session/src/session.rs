//! A live terminal session: one process, one replay buffer, many viewers.

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use serde::Serialize;
use term_broker_core::{OutputEvent, OutputReceiver, ProcessHandle, SessionId, TermSize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::buffer::ReplayBuffer;

/// A subscriber's view of a session, handed out by [`Session::subscribe`].
///
/// `history` is the replay buffer exactly as of the moment the mailbox was
/// registered: the live feed in `events` contains everything produced after
/// it, with no gap and no overlap.
pub struct Subscription {
    /// Mailbox id, used to unsubscribe.
    pub id: u64,
    /// Buffered output predating this subscription.
    pub history: Bytes,
    /// Live feed, ending with [`OutputEvent::Closed`].
    pub events: OutputReceiver,
}

/// Snapshot of a session's identity and state, for the outer routing layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub owner: String,
    pub directory: PathBuf,
    pub alive: bool,
}

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<OutputEvent>,
}

/// State shared between the reader thread and cooperative tasks.
///
/// Held only across append/evict/publish and subscribe/unsubscribe, never
/// across a blocking read or a network send.
struct Inner {
    buffer: ReplayBuffer,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: u64,
    closed: bool,
}

/// A session owning one terminal-attached process.
///
/// Created via [`Session::start`], which also launches the dedicated reader
/// thread. State moves one way: Alive until the process stream ends or the
/// session is shut down, then Terminated forever.
pub struct Session {
    id: SessionId,
    owner: String,
    directory: PathBuf,
    process: Arc<dyn ProcessHandle>,
    alive: AtomicBool,
    inner: Mutex<Inner>,
}

impl Session {
    /// Wrap a freshly spawned process and start its reader loop.
    pub fn start<S: Into<String>>(
        owner: S,
        directory: PathBuf,
        process: Box<dyn ProcessHandle>,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            directory,
            process: Arc::from(process),
            alive: AtomicBool::new(true),
            inner: Mutex::new(Inner {
                buffer: ReplayBuffer::new(),
                subscribers: Vec::new(),
                next_subscriber_id: 0,
                closed: false,
            }),
        });

        let reader = Arc::clone(&session);
        std::thread::Builder::new()
            .name(format!("session-reader-{}", session.id))
            .spawn(move || reader.reader_loop())
            .expect("failed to spawn session reader thread");

        session
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Owner key this session was created for.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Working directory the process was spawned in.
    #[must_use]
    pub fn directory(&self) -> &std::path::Path {
        &self.directory
    }

    /// Whether the session is still Alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Identity and state snapshot.
    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            owner: self.owner.clone(),
            directory: self.directory.clone(),
            alive: self.is_alive(),
        }
    }

    /// Register a subscriber mailbox and snapshot the replay buffer, as one
    /// atomic step.
    ///
    /// On a Terminated session the mailbox arrives pre-loaded with the
    /// sentinel, so a late viewer replays history and ends immediately.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();
        let history = inner.buffer.snapshot();
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        if inner.closed {
            let _ = tx.send(OutputEvent::Closed);
        } else {
            inner.subscribers.push(Subscriber { id, tx });
        }
        Subscription {
            id,
            history,
            events: rx,
        }
    }

    /// Remove a subscriber mailbox. Idempotent.
    pub fn unsubscribe(&self, subscriber_id: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.subscribers.retain(|sub| sub.id != subscriber_id);
    }

    /// Current replay buffer contents.
    #[must_use]
    pub fn snapshot(&self) -> Bytes {
        self.inner.lock().unwrap().buffer.snapshot()
    }

    /// Forward viewer input to the process.
    ///
    /// A no-op once Terminated, so viewer keystrokes racing process death
    /// are harmless.
    pub async fn write(&self, data: Bytes) {
        if !self.is_alive() {
            return;
        }
        let process = Arc::clone(&self.process);
        match tokio::task::spawn_blocking(move || process.write(&data)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(session = %self.id, %err, "write to process failed");
            }
            Err(err) => {
                tracing::debug!(session = %self.id, %err, "write task failed");
            }
        }
    }

    /// Resize the attached terminal. Best-effort; a no-op once Terminated.
    pub fn resize(&self, size: TermSize) {
        if !self.is_alive() {
            return;
        }
        if let Err(err) = self.process.resize(size) {
            tracing::debug!(session = %self.id, %err, "resize failed");
        }
    }

    /// Terminate the session: flip to Terminated, deliver the sentinel to
    /// every subscriber, and kill the process. Idempotent.
    pub async fn shutdown(&self) {
        self.close();
        let process = Arc::clone(&self.process);
        match tokio::task::spawn_blocking(move || process.terminate()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(session = %self.id, %err, "terminate failed");
            }
            Err(err) => {
                tracing::debug!(session = %self.id, %err, "terminate task failed");
            }
        }
    }

    /// Dedicated reader thread body: the session's single producer.
    fn reader_loop(&self) {
        loop {
            match self.process.read() {
                Ok(chunk) => self.publish(chunk),
                Err(err) => {
                    tracing::debug!(session = %self.id, %err, "process stream ended");
                    self.close();
                    break;
                }
            }
        }
    }

    /// Append a chunk to the replay buffer and fan it out, atomically.
    fn publish(&self, chunk: Bytes) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            // A shutdown raced the blocking read; nothing follows the sentinel.
            return;
        }
        inner.buffer.push(chunk.clone());
        inner
            .subscribers
            .retain(|sub| sub.tx.send(OutputEvent::Data(chunk.clone())).is_ok());
    }

    /// Flip to Terminated and deliver the sentinel exactly once.
    fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }
        inner.closed = true;
        self.alive.store(false, Ordering::SeqCst);
        for sub in inner.subscribers.drain(..) {
            let _ = sub.tx.send(OutputEvent::Closed);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("directory", &self.directory)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}
