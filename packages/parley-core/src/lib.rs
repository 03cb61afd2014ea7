//! Parley Core - shared library for the Parley meeting assistant.
//!
//! This crate provides the backend for live pitch-meeting assistance: it
//! ingests a continuous audio stream over a WebSocket attach channel,
//! produces near-real-time partial transcripts, generates knowledge-base
//! grounded "next question" suggestions, auto-terminates idle sessions, and
//! finalizes each session into a diarized transcript plus a structured
//! summary.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`session`]: The per-session orchestrator state machine
//! - [`registry`]: Process-wide session state with reconnect semantics
//! - [`transcribe`]: Streaming windows and the chunked full-audio pass
//! - [`suggest`]: Rolling question suggestions with similarity dedup
//! - [`audio`]: Frame normalization, PCM accumulation, WAV container
//! - [`providers`]: Transcription/generation provider traits and clients
//! - [`repos`]: Repository traits over the document store
//! - [`events`]: Attach-channel messages and the emitter abstraction
//! - [`api`]: Axum HTTP/WebSocket layer
//! - [`error`]: Centralized error types
//!
//! Provider and persistence concerns are trait-abstracted so the core state
//! machine can be exercised entirely in-process.

#![warn(clippy::all)]

pub mod api;
pub mod audio;
pub mod bootstrap;
pub mod error;
pub mod events;
pub mod kb;
pub mod model;
pub mod protocol_constants;
pub mod providers;
pub mod registry;
pub mod repos;
pub mod session;
pub mod suggest;
pub mod summary;
pub mod transcribe;
pub mod utils;

// Re-export commonly used types at the crate root
pub use api::{start_server, AppState, ServerError};
pub use bootstrap::{bootstrap_services, BootstrappedServices, Config};
pub use error::{ErrorCode, ParleyError, ParleyResult};
pub use events::{EventEmitter, LoggingEventEmitter, NoopEventEmitter, QuestionView, SessionEvent};
pub use model::{Session, SessionStatus, SuggestedQuestion, SummaryState, Transcript};
pub use registry::{SessionEntry, SessionRegistry, SessionState, SocketSender};
pub use session::{SessionOrchestrator, StopReceipt};
pub use transcribe::{CompleteTranscription, FullAudioTranscriber, StreamingTranscriber};
pub use utils::now_millis;
