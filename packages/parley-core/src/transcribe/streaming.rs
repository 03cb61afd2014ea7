//! Rolling streaming transcription for live partial display.
//!
//! The target provider does no word-level streaming, so partials come from
//! discrete windows: audio accumulates in a window buffer that is flushed as
//! a WAV upload at most every 5 s, once at least 1 s of audio is buffered.
//! A cumulative buffer mirrors every byte ever sent and survives `close()`.
//!
//! Provider failures during a flush are surfaced through the error callback
//! and never tear the transcriber down; the next window tries again.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::retry::with_retry;
use crate::audio::wav;
use crate::protocol_constants::{
    PROVIDER_WAV_MAX_BYTES, STREAM_FLUSH_INTERVAL_SECS, STREAM_FLUSH_RETRIES, STREAM_TICK_SECS,
    STREAM_WINDOW_MIN_BYTES,
};
use crate::providers::{ProviderError, SpeechToText, TranscribeOptions};
use crate::utils::now_millis;

/// One stable window result from the streaming transcriber.
#[derive(Debug, Clone)]
pub struct StreamingPartial {
    pub text: String,
    pub language: Option<String>,
    /// Unix timestamp (milliseconds) at which the window was flushed.
    pub timestamp: u64,
}

/// Callback invoked with each non-empty window result.
pub type PartialCallback = Arc<dyn Fn(StreamingPartial) + Send + Sync>;

/// Callback invoked when a flush fails after its retry.
pub type ErrorCallback = Arc<dyn Fn(ProviderError) + Send + Sync>;

struct Buffers {
    /// Drained on each flush.
    window: Vec<u8>,
    /// Mirrors all bytes ever sent; exposed via `get_complete`.
    complete: Vec<u8>,
    last_flush_at: Instant,
    closed: bool,
}

struct Inner {
    buffers: Mutex<Buffers>,
    stt: Arc<dyn SpeechToText>,
    opts: TranscribeOptions,
    on_partial: PartialCallback,
    on_error: ErrorCallback,
    cancel: CancellationToken,
}

/// Rolling window transcriber for one session.
pub struct StreamingTranscriber {
    inner: Arc<Inner>,
}

impl StreamingTranscriber {
    /// Creates the transcriber and starts its periodic flush tick.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        language: Option<String>,
        tenant_id: Option<String>,
        on_partial: PartialCallback,
        on_error: ErrorCallback,
    ) -> Self {
        let inner = Arc::new(Inner {
            buffers: Mutex::new(Buffers {
                window: Vec::new(),
                complete: Vec::new(),
                last_flush_at: Instant::now(),
                closed: false,
            }),
            stt,
            opts: TranscribeOptions {
                language,
                diarize: false,
                tenant_id,
            },
            on_partial,
            on_error,
            cancel: CancellationToken::new(),
        });

        let tick_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(STREAM_TICK_SECS));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick_inner.cancel.cancelled() => break,
                    _ = tick.tick() => {
                        Self::flush(&tick_inner, false).await;
                    }
                }
            }
        });

        Self { inner }
    }

    /// Appends PCM to the window and cumulative buffers. Non-blocking.
    /// No-op after `close()`.
    pub fn send(&self, pcm: &[u8]) {
        let mut buffers = self.inner.buffers.lock();
        if buffers.closed {
            return;
        }
        buffers.window.extend_from_slice(pcm);
        buffers.complete.extend_from_slice(pcm);
    }

    /// Full accumulation of everything ever sent, valid after `close()` too.
    #[must_use]
    pub fn get_complete(&self) -> Vec<u8> {
        self.inner.buffers.lock().complete.clone()
    }

    /// Total bytes accumulated.
    #[must_use]
    pub fn complete_len(&self) -> usize {
        self.inner.buffers.lock().complete.len()
    }

    /// Stops the periodic tick, marks the transcriber terminal, and runs one
    /// final flush if the window holds at least 1 s of audio. Idempotent.
    pub async fn close(&self) {
        let already_closed = {
            let mut buffers = self.inner.buffers.lock();
            let was = buffers.closed;
            buffers.closed = true;
            was
        };
        self.inner.cancel.cancel();
        if !already_closed {
            Self::flush(&self.inner, true).await;
        }
    }

    /// Flushes the window if due. `force` skips the 5 s interval gate (used
    /// by `close()`); the 1 s minimum window fill always applies.
    async fn flush(inner: &Arc<Inner>, force: bool) {
        let window = {
            let mut buffers = inner.buffers.lock();
            let elapsed = buffers.last_flush_at.elapsed();
            if !force && elapsed < Duration::from_secs(STREAM_FLUSH_INTERVAL_SECS) {
                return;
            }
            if buffers.window.len() < STREAM_WINDOW_MIN_BYTES {
                return;
            }
            buffers.last_flush_at = Instant::now();
            std::mem::take(&mut buffers.window)
        };

        let wav = wav::wrap_pcm(&window);
        if wav.len() > PROVIDER_WAV_MAX_BYTES {
            // Impossible under normal flush timing; guards against a stalled tick
            log::warn!(
                "[Streaming] Dropping oversized window ({} bytes WAV)",
                wav.len()
            );
            return;
        }

        let result = with_retry("streaming flush", STREAM_FLUSH_RETRIES, || {
            inner.stt.transcribe_wav(wav.clone(), &inner.opts)
        })
        .await;

        match result {
            Ok(transcription) => {
                let text = transcription.text.trim();
                if !text.is_empty() {
                    (inner.on_partial)(StreamingPartial {
                        text: text.to_string(),
                        language: transcription.language,
                        timestamp: now_millis(),
                    });
                }
            }
            Err(e) => {
                log::warn!("[Streaming] Window flush failed: {}", e);
                (inner.on_error)(e);
            }
        }
    }
}

impl Drop for StreamingTranscriber {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}
