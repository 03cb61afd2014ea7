//! Event emitter abstraction for decoupling the orchestrator from transport.
//!
//! The orchestrator reports every outbound session event through this trait
//! in addition to the attached socket, so observers (logging, tests, audit)
//! see the event stream without holding a socket.

use super::SessionEvent;

/// Trait for observing session events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Called for every event the orchestrator produces for a session,
    /// whether or not a socket is currently attached.
    fn emit(&self, session_id: &str, event: &SessionEvent);
}

/// No-op emitter for tests that don't inspect the event stream.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _session_id: &str, _event: &SessionEvent) {
        // No-op: events reach clients via the registry's socket handle
    }
}

/// Logging emitter for the headless server.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit(&self, session_id: &str, event: &SessionEvent) {
        tracing::debug!(session_id, ?event, "session_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test emitter that counts events.
    struct CountingEventEmitter {
        count: AtomicUsize,
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit(&self, _session_id: &str, _event: &SessionEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter {
            count: AtomicUsize::new(0),
        });

        emitter.emit(
            "s1",
            &SessionEvent::Pong {
                timestamp: 0,
            },
        );
        emitter.emit(
            "s1",
            &SessionEvent::SessionStatus {
                status: "active".into(),
                message: "joined".into(),
            },
        );

        assert_eq!(emitter.count.load(Ordering::SeqCst), 2);
    }
}
