//! Fixed protocol and policy constants.
//!
//! Audio format values are dictated by the device contract (16 kHz mono
//! 16-bit LE PCM); provider limits come from the transcription service's
//! documented caps. Changing these breaks the wire contract.

// ─────────────────────────────────────────────────────────────────────────────
// Audio Format (device contract)
// ─────────────────────────────────────────────────────────────────────────────

/// Sample rate the device is required to send (Hz).
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Channel count (mono).
pub const CHANNELS: u16 = 1;

/// Bit depth (16-bit LE PCM).
pub const BITS_PER_SAMPLE: u16 = 16;

/// PCM bytes per second of audio: 16_000 samples × 2 bytes × 1 channel.
pub const PCM_BYTES_PER_SECOND: usize = (SAMPLE_RATE_HZ as usize) * 2;

/// Size of the minimal RIFF/WAVE header produced by [`crate::audio::wav`].
pub const WAV_HEADER_BYTES: usize = 44;

// ─────────────────────────────────────────────────────────────────────────────
// Inbound Frames
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum accepted size of a single inbound audio frame (bytes).
/// Larger frames are dropped silently.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Streaming Transcription
// ─────────────────────────────────────────────────────────────────────────────

/// Interval of the streaming transcriber's flush-check tick (seconds).
pub const STREAM_TICK_SECS: u64 = 1;

/// Minimum time between streaming flushes (seconds).
pub const STREAM_FLUSH_INTERVAL_SECS: u64 = 5;

/// Minimum window fill before a flush is attempted: 1 s of audio.
pub const STREAM_WINDOW_MIN_BYTES: usize = PCM_BYTES_PER_SECOND;

// ─────────────────────────────────────────────────────────────────────────────
// Provider Limits (full-audio pass)
// ─────────────────────────────────────────────────────────────────────────────

/// Hard cap on a single WAV upload accepted by the transcription provider.
pub const PROVIDER_WAV_MAX_BYTES: usize = 25 * 1024 * 1024;

/// Target WAV size per chunk when splitting long sessions.
/// Kept under the 25 MiB provider cap as a safety margin.
pub const CHUNK_TARGET_WAV_BYTES: usize = 20 * 1024 * 1024;

/// Minimum chunk size: 1 s of PCM. A trailing residue smaller than this
/// is merged into the previous chunk.
pub const MIN_CHUNK_BYTES: usize = PCM_BYTES_PER_SECOND;

/// Minimum audio required for the full-audio pass: 0.25 s of PCM.
pub const MIN_FULL_AUDIO_BYTES: usize = PCM_BYTES_PER_SECOND / 4;

/// Retries per chunk on retryable provider failures.
pub const CHUNK_MAX_RETRIES: u32 = 3;

/// Initial retry backoff (milliseconds).
pub const RETRY_BACKOFF_BASE_MS: u64 = 1_000;

/// Retry backoff ceiling (milliseconds).
pub const RETRY_BACKOFF_CAP_MS: u64 = 10_000;

/// Retries per streaming flush (best-effort, single retry).
pub const STREAM_FLUSH_RETRIES: u32 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Inactivity Watchdog
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between watchdog silence checks (seconds).
pub const WATCHDOG_TICK_SECS: u64 = 30;

/// Silence threshold after which a session is auto-stopped (seconds).
pub const INACTIVITY_TIMEOUT_SECS: u64 = 240;

// ─────────────────────────────────────────────────────────────────────────────
// Suggestion Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum time between rolling suggestion runs per session (seconds).
pub const SUGGESTION_MIN_INTERVAL_SECS: u64 = 60;

/// Rolling transcript window consulted by the suggestion gate (seconds).
pub const SUGGESTION_WINDOW_SECS: u64 = 180;

/// Minimum word count in the rolling window before a rolling run fires.
pub const SUGGESTION_MIN_WORDS: usize = 50;

/// Normalized word-set Jaccard similarity at or above which a candidate
/// question is considered a duplicate of an existing one.
pub const QUESTION_DUP_THRESHOLD: f64 = 0.7;

// ─────────────────────────────────────────────────────────────────────────────
// Session Status Reporting
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum interval between recording-status messages to the client (seconds).
pub const RECORDING_STATUS_INTERVAL_SECS: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in client-facing messages.
pub const APP_NAME: &str = "Parley";

/// Service identifier returned by the health endpoint.
pub const SERVICE_ID: &str = "parley";

// ─────────────────────────────────────────────────────────────────────────────
// Provider Key Vault
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum number of decrypted per-tenant keys held in memory.
pub const KEY_CACHE_MAX_ENTRIES: usize = 64;
