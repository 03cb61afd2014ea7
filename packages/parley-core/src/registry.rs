//! Process-wide session registry.
//!
//! Maps session ids to their in-memory [`SessionState`]. Entries survive
//! socket disconnects: `create` is idempotent under reconnect, preserving the
//! cumulative PCM and any running sub-tasks, so only the socket handle is
//! swapped. Entries are removed only by explicit stop or by a terminal
//! failure in finalization.
//!
//! Concurrency: the map itself admits concurrent cross-session access; all
//! per-session mutation is serialized by the entry's async mutex.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::audio::PcmBuffer;
use crate::events::SessionEvent;
use crate::transcribe::StreamingTranscriber;

/// Outbound handle to the currently attached socket.
pub type SocketSender = UnboundedSender<SessionEvent>;

/// Mutable in-memory state of one live session. Never persisted.
///
/// Exclusively owned by the orchestrator through the entry mutex; readers
/// take snapshots and never hold references across suspension points.
pub struct SessionState {
    /// Outbound handle of the attached socket, if any.
    pub socket: Option<SocketSender>,
    /// Cumulative PCM in exact receive order.
    pub pcm: PcmBuffer,
    pub frames_received: u64,
    /// Monotonic instant of the last accepted audio frame.
    pub last_audio_at: Instant,
    /// Lazily initialized on the first validated frame.
    pub streaming: Option<StreamingTranscriber>,
    /// Last rolling suggestion run; `None` until the first one.
    pub suggestion_last_run: Option<Instant>,
    pub initial_suggestions_done: bool,
    /// Collapses concurrent suggestion triggers into one in-flight run.
    pub suggestion_in_flight: bool,
    /// Cancels the per-session watchdog task.
    pub watchdog: Option<CancellationToken>,
    /// Last recording-status emission.
    pub last_status_emit: Option<Instant>,
    /// Set by the first stop; all later audio and stops are ignored.
    pub stopped: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            socket: None,
            pcm: PcmBuffer::new(),
            frames_received: 0,
            last_audio_at: Instant::now(),
            streaming: None,
            suggestion_last_run: None,
            initial_suggestions_done: false,
            suggestion_in_flight: false,
            watchdog: None,
            last_status_emit: None,
            stopped: false,
        }
    }
}

/// One registry entry: the session id plus its serialized state.
pub struct SessionEntry {
    id: String,
    state: Mutex<SessionState>,
}

impl SessionEntry {
    /// Returns the session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Acquires the per-session mutation lock.
    ///
    /// Never hold this across provider or repository I/O: read state, drop
    /// the guard, perform I/O, reacquire to commit.
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }
}

/// Process-wide mapping `session id -> SessionState`.
pub struct SessionRegistry {
    entries: DashMap<String, Arc<SessionEntry>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Gets or creates the entry for a session. Idempotent: an existing
    /// entry (its PCM, sub-tasks, counters) is returned untouched.
    pub fn create(&self, session_id: &str) -> Arc<SessionEntry> {
        self.entries
            .entry(session_id.to_string())
            .or_insert_with(|| {
                log::info!("[Registry] Creating session state: {}", session_id);
                Arc::new(SessionEntry {
                    id: session_id.to_string(),
                    state: Mutex::new(SessionState::new()),
                })
            })
            .clone()
    }

    /// Looks up an entry.
    pub fn get(&self, session_id: &str) -> Option<Arc<SessionEntry>> {
        self.entries.get(session_id).map(|r| Arc::clone(r.value()))
    }

    /// Swaps the socket handle of an existing entry, preserving everything
    /// else. Returns `false` if the session has no entry.
    pub async fn replace_socket(&self, session_id: &str, socket: SocketSender) -> bool {
        match self.get(session_id) {
            Some(entry) => {
                entry.lock().await.socket = Some(socket);
                true
            }
            None => false,
        }
    }

    /// Removes an entry, returning it for teardown.
    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionEntry>> {
        let removed = self.entries.remove(session_id).map(|(_, v)| v);
        if removed.is_some() {
            log::info!(
                "[Registry] Removed session state: {} (remaining: {})",
                session_id,
                self.entries.len()
            );
        }
        removed
    }

    /// Number of live session entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
