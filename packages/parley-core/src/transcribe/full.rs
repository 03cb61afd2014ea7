//! Authoritative end-of-session transcription.
//!
//! The entire cumulative PCM is submitted to the provider at session end.
//! Sessions short enough to fit a single upload go out as one diarized
//! request; longer sessions are split on PCM boundaries (never the WAV) into
//! chunks whose wrapped size stays under a 20 MiB target, then stitched back
//! together on a time base computed from PCM byte counts. The provider's
//! reported durations are not trusted for stitching; byte counts are exact
//! and avoid drift across multi-hour sessions.

use std::ops::Range;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::retry::with_retry;
use crate::audio::wav;
use crate::error::{ParleyError, ParleyResult};
use crate::protocol_constants::{
    CHUNK_MAX_RETRIES, CHUNK_TARGET_WAV_BYTES, MIN_CHUNK_BYTES, MIN_FULL_AUDIO_BYTES,
    PCM_BYTES_PER_SECOND, PROVIDER_WAV_MAX_BYTES, WAV_HEADER_BYTES,
};
use crate::providers::{SpeechToText, TranscribeOptions, VerboseTranscription};

/// Placeholder text kept in place of a chunk whose transcription failed.
const FAILED_CHUNK_TEXT: &str = "[audio segment unavailable]";

/// One time-shifted segment of the stitched transcript.
#[derive(Debug, Clone)]
pub struct TranscribedSegment {
    /// Offset from session audio start, seconds.
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Display label derived from the diarization id.
    pub speaker: Option<String>,
    /// Opaque diarization id from the provider.
    pub speaker_id: Option<i32>,
}

/// Stitched result of the full-audio pass.
#[derive(Debug, Clone)]
pub struct CompleteTranscription {
    pub text: String,
    pub language: Option<String>,
    /// Total duration, computed from the PCM byte count.
    pub duration: f64,
    pub segments: Vec<TranscribedSegment>,
}

/// Options for one full-audio run.
#[derive(Debug, Clone)]
pub struct FullAudioOptions {
    pub language: Option<String>,
    pub tenant_id: Option<String>,
    /// Cooperative cancellation: checked between chunks, never mid-call.
    pub cancel: CancellationToken,
}

impl Default for FullAudioOptions {
    fn default() -> Self {
        Self {
            language: None,
            tenant_id: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// Duration in seconds of a PCM byte count under the device contract.
#[must_use]
pub fn pcm_duration_seconds(bytes: usize) -> f64 {
    bytes as f64 / PCM_BYTES_PER_SECOND as f64
}

/// Computes chunk boundaries over the PCM byte range.
///
/// Each chunk wraps to at most the 20 MiB WAV target; boundaries land on
/// sample boundaries (even offsets). A trailing residue under 1 s is merged
/// into the previous chunk.
pub(crate) fn split_points(total_len: usize) -> Vec<Range<usize>> {
    // Max PCM payload per chunk, aligned down to a whole 16-bit sample
    let max_chunk = (CHUNK_TARGET_WAV_BYTES - WAV_HEADER_BYTES) & !1usize;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < total_len {
        let end = (start + max_chunk).min(total_len);
        chunks.push(start..end);
        start = end;
    }

    if chunks.len() > 1 {
        let last = chunks.last().expect("non-empty").clone();
        if last.len() < MIN_CHUNK_BYTES {
            chunks.pop();
            let prev = chunks.last_mut().expect("at least one chunk remains");
            prev.end = last.end;
        }
    }

    chunks
}

/// Full-audio transcriber over a shared provider client.
pub struct FullAudioTranscriber {
    stt: Arc<dyn SpeechToText>,
}

impl FullAudioTranscriber {
    pub fn new(stt: Arc<dyn SpeechToText>) -> Self {
        Self { stt }
    }

    /// Transcribes the entire cumulative PCM into a diarized transcript.
    ///
    /// Fails with `AudioTooShort` under 0.25 s of audio, and with a terminal
    /// `Transcription` error only when every chunk fails. Individual chunk
    /// failures leave a placeholder segment preserving time alignment.
    pub async fn transcribe_complete(
        &self,
        pcm: &[u8],
        opts: &FullAudioOptions,
    ) -> ParleyResult<CompleteTranscription> {
        if pcm.len() < MIN_FULL_AUDIO_BYTES {
            return Err(ParleyError::AudioTooShort {
                seconds: pcm_duration_seconds(pcm.len()),
            });
        }

        let provider_opts = TranscribeOptions {
            language: opts.language.clone(),
            diarize: true,
            tenant_id: opts.tenant_id.clone(),
        };

        let chunks = if wav::wav_size(pcm.len()) <= PROVIDER_WAV_MAX_BYTES {
            vec![0..pcm.len()]
        } else {
            split_points(pcm.len())
        };

        log::info!(
            "[FullAudio] Transcribing {:.1}s of audio in {} chunk(s)",
            pcm_duration_seconds(pcm.len()),
            chunks.len()
        );

        let mut stitched_text: Vec<String> = Vec::with_capacity(chunks.len());
        let mut segments: Vec<TranscribedSegment> = Vec::new();
        let mut language: Option<String> = None;
        let mut offset_secs = 0.0f64;
        let mut failures = 0usize;
        let mut last_error: Option<String> = None;
        let mut cancelled = false;

        for (index, range) in chunks.iter().enumerate() {
            let chunk_pcm = &pcm[range.clone()];
            let chunk_duration = pcm_duration_seconds(chunk_pcm.len());

            if cancelled || opts.cancel.is_cancelled() {
                // Stop submitting further chunks; keep time alignment intact
                if !cancelled {
                    log::warn!(
                        "[FullAudio] Cancellation received, skipping chunks {}..{}",
                        index,
                        chunks.len()
                    );
                    cancelled = true;
                }
                failures += 1;
                stitched_text.push(FAILED_CHUNK_TEXT.to_string());
                segments.push(placeholder_segment(offset_secs, chunk_duration));
                offset_secs += chunk_duration;
                continue;
            }

            let wav_bytes = wav::wrap_pcm(chunk_pcm);
            let action = format!("full-audio chunk {}/{}", index + 1, chunks.len());
            // Sequential submission: one in-flight provider call per session
            let result = with_retry(&action, CHUNK_MAX_RETRIES, || {
                self.stt.transcribe_wav(wav_bytes.clone(), &provider_opts)
            })
            .await;

            match result {
                Ok(transcription) => {
                    if language.is_none() {
                        language = transcription.language.clone();
                    }
                    let trimmed = transcription.text.trim();
                    if !trimmed.is_empty() {
                        stitched_text.push(trimmed.to_string());
                    }
                    segments.extend(shift_segments(&transcription, offset_secs, chunk_duration));
                }
                Err(e) => {
                    log::warn!("[FullAudio] {} failed terminally: {}", action, e);
                    failures += 1;
                    last_error = Some(e.to_string());
                    stitched_text.push(FAILED_CHUNK_TEXT.to_string());
                    segments.push(placeholder_segment(offset_secs, chunk_duration));
                }
            }

            offset_secs += chunk_duration;
        }

        if failures == chunks.len() {
            return Err(ParleyError::Transcription(format!(
                "all {} chunk(s) failed: {}",
                chunks.len(),
                last_error.unwrap_or_else(|| "cancelled".to_string())
            )));
        }

        Ok(CompleteTranscription {
            text: stitched_text.join(" "),
            language,
            duration: pcm_duration_seconds(pcm.len()),
            segments,
        })
    }
}

fn placeholder_segment(offset_secs: f64, chunk_duration: f64) -> TranscribedSegment {
    TranscribedSegment {
        start: offset_secs,
        end: offset_secs + chunk_duration,
        text: FAILED_CHUNK_TEXT.to_string(),
        speaker: None,
        speaker_id: None,
    }
}

/// Shifts a chunk's segments onto the session time base.
///
/// Segment offsets are clamped into the chunk's own span first, so provider
/// over-reporting can never overlap the next chunk.
fn shift_segments(
    transcription: &VerboseTranscription,
    offset_secs: f64,
    chunk_duration: f64,
) -> Vec<TranscribedSegment> {
    transcription
        .segments
        .iter()
        .filter(|seg| !seg.text.trim().is_empty())
        .map(|seg| {
            let start = seg.start.clamp(0.0, chunk_duration);
            let end = seg.end.clamp(start, chunk_duration);
            TranscribedSegment {
                start: offset_secs + start,
                end: offset_secs + end,
                text: seg.text.trim().to_string(),
                speaker: seg.speaker.map(|id| format!("Speaker {}", id + 1)),
                speaker_id: seg.speaker,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderError, ProviderResult, ProviderSegment};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MAX_CHUNK_PCM: usize = (CHUNK_TARGET_WAV_BYTES - WAV_HEADER_BYTES) & !1usize;

    // ─────────────────────────────────────────────────────────────────────────
    // split_points
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn single_chunk_when_under_target() {
        let chunks = split_points(1000);
        assert_eq!(chunks, vec![0..1000]);
    }

    #[test]
    fn chunks_cover_input_contiguously() {
        let total = MAX_CHUNK_PCM * 3 + MIN_CHUNK_BYTES * 2;
        let chunks = split_points(total);
        assert_eq!(chunks.first().unwrap().start, 0);
        assert_eq!(chunks.last().unwrap().end, total);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        for chunk in &chunks {
            assert!(chunk.len() <= MAX_CHUNK_PCM + MIN_CHUNK_BYTES);
        }
    }

    #[test]
    fn eighty_mib_splits_into_at_least_four_chunks() {
        let total = 80 * 1024 * 1024;
        let chunks = split_points(total);
        assert!(chunks.len() >= 4, "got {} chunks", chunks.len());
        for chunk in &chunks {
            assert!(wav::wav_size(chunk.len()) <= CHUNK_TARGET_WAV_BYTES + MIN_CHUNK_BYTES);
        }
    }

    #[test]
    fn trailing_residue_merges_into_previous_chunk() {
        let total = MAX_CHUNK_PCM + MIN_CHUNK_BYTES / 2;
        let chunks = split_points(total);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], 0..total);
    }

    #[test]
    fn trailing_chunk_at_minimum_is_kept() {
        let total = MAX_CHUNK_PCM + MIN_CHUNK_BYTES;
        let chunks = split_points(total);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].len(), MIN_CHUNK_BYTES);
    }

    #[test]
    fn boundaries_are_sample_aligned() {
        let total = MAX_CHUNK_PCM * 2 + 12_345;
        for chunk in split_points(total) {
            assert_eq!(chunk.start % 2, 0);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // transcribe_complete
    // ─────────────────────────────────────────────────────────────────────────

    /// Always succeeds, but misreports the duration; stitching must ignore it.
    struct WrongDuration;

    #[async_trait]
    impl SpeechToText for WrongDuration {
        async fn transcribe_wav(
            &self,
            wav_bytes: Vec<u8>,
            _opts: &TranscribeOptions,
        ) -> ProviderResult<VerboseTranscription> {
            let pcm_len = wav_bytes.len() - WAV_HEADER_BYTES;
            Ok(VerboseTranscription {
                text: "chunk text".into(),
                language: Some("en".into()),
                duration: pcm_duration_seconds(pcm_len) + 0.5,
                segments: vec![],
            })
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    /// Simple provider that always succeeds with one segment per call.
    struct AlwaysOk {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechToText for AlwaysOk {
        async fn transcribe_wav(
            &self,
            wav_bytes: Vec<u8>,
            _opts: &TranscribeOptions,
        ) -> ProviderResult<VerboseTranscription> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let pcm_len = wav_bytes.len() - WAV_HEADER_BYTES;
            let duration = pcm_duration_seconds(pcm_len);
            Ok(VerboseTranscription {
                text: "hello".into(),
                language: Some("en".into()),
                duration,
                segments: vec![ProviderSegment {
                    start: 0.1,
                    end: duration + 3.0, // over-reported end gets clamped
                    text: "hello".into(),
                    speaker: Some(1),
                }],
            })
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    struct AlwaysFail;

    #[async_trait]
    impl SpeechToText for AlwaysFail {
        async fn transcribe_wav(
            &self,
            _wav: Vec<u8>,
            _opts: &TranscribeOptions,
        ) -> ProviderResult<VerboseTranscription> {
            Err(ProviderError::Status {
                status: 500,
                message: "down".into(),
            })
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn too_short_audio_is_rejected() {
        let transcriber = FullAudioTranscriber::new(Arc::new(AlwaysOk {
            calls: AtomicUsize::new(0),
        }));
        let result = transcriber
            .transcribe_complete(&vec![0u8; MIN_FULL_AUDIO_BYTES - 2], &FullAudioOptions::default())
            .await;
        assert!(matches!(result, Err(ParleyError::AudioTooShort { .. })));
    }

    #[tokio::test]
    async fn small_audio_goes_out_as_single_request() {
        let stt = Arc::new(AlwaysOk {
            calls: AtomicUsize::new(0),
        });
        let transcriber = FullAudioTranscriber::new(stt.clone());
        let pcm = vec![0u8; PCM_BYTES_PER_SECOND * 10];
        let result = transcriber
            .transcribe_complete(&pcm, &FullAudioOptions::default())
            .await
            .unwrap();

        assert_eq!(stt.calls.load(Ordering::SeqCst), 1);
        assert!((result.duration - 10.0).abs() < 1e-9);
        assert_eq!(result.segments.len(), 1);
        // Over-reported segment end clamped to the chunk duration
        assert!(result.segments[0].end <= 10.0 + 1e-9);
        assert_eq!(result.segments[0].speaker.as_deref(), Some("Speaker 2"));
        assert_eq!(result.segments[0].speaker_id, Some(1));
    }

    #[tokio::test]
    async fn duration_comes_from_byte_count_not_provider() {
        let transcriber = FullAudioTranscriber::new(Arc::new(WrongDuration));
        let pcm = vec![0u8; PCM_BYTES_PER_SECOND * 4];
        let result = transcriber
            .transcribe_complete(&pcm, &FullAudioOptions::default())
            .await
            .unwrap();
        // Provider reported duration + 0.5; stitched duration is exact
        assert!((result.duration - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn oversize_audio_is_chunked_and_stitched_without_overlap() {
        let stt = Arc::new(AlwaysOk {
            calls: AtomicUsize::new(0),
        });
        let transcriber = FullAudioTranscriber::new(stt.clone());
        // ~42 minutes: 80 MiB of PCM forces >= 4 chunks
        let pcm = vec![0u8; 80 * 1024 * 1024];
        let result = transcriber
            .transcribe_complete(&pcm, &FullAudioOptions::default())
            .await
            .unwrap();

        let chunk_count = stt.calls.load(Ordering::SeqCst);
        assert!(chunk_count >= 4, "got {} chunks", chunk_count);
        // Duration within one sample of bytes / 32000
        let expected = pcm.len() as f64 / PCM_BYTES_PER_SECOND as f64;
        assert!((result.duration - expected).abs() < 1.0 / 16_000.0);
        // Segments strictly non-overlapping across chunk boundaries
        for pair in result.segments.windows(2) {
            assert!(pair[1].start >= pair[0].end - 1e-9);
        }
        assert_eq!(result.segments.len(), chunk_count);
        assert_eq!(result.text.matches("hello").count(), chunk_count);
    }

    #[tokio::test(start_paused = true)]
    async fn whole_batch_failure_is_terminal() {
        let transcriber = FullAudioTranscriber::new(Arc::new(AlwaysFail));
        let pcm = vec![0u8; PCM_BYTES_PER_SECOND * 2];
        let result = transcriber
            .transcribe_complete(&pcm, &FullAudioOptions::default())
            .await;
        assert!(matches!(result, Err(ParleyError::Transcription(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn fivexx_storm_recovers_per_chunk_with_backoff() {
        // Each chunk: two 500s, then success (seed scenario S6)
        struct Storm {
            attempts_in_chunk: AtomicUsize,
            calls: AtomicUsize,
        }

        #[async_trait]
        impl SpeechToText for Storm {
            async fn transcribe_wav(
                &self,
                wav_bytes: Vec<u8>,
                _opts: &TranscribeOptions,
            ) -> ProviderResult<VerboseTranscription> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let n = self.attempts_in_chunk.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    return Err(ProviderError::Status {
                        status: 500,
                        message: "storm".into(),
                    });
                }
                self.attempts_in_chunk.store(0, Ordering::SeqCst);
                let pcm_len = wav_bytes.len() - WAV_HEADER_BYTES;
                Ok(VerboseTranscription {
                    text: "ok".into(),
                    language: Some("en".into()),
                    duration: pcm_duration_seconds(pcm_len),
                    segments: vec![],
                })
            }

            fn is_configured(&self) -> bool {
                true
            }
        }

        let stt = Arc::new(Storm {
            attempts_in_chunk: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });
        let transcriber = FullAudioTranscriber::new(stt.clone());
        let pcm = vec![0u8; PCM_BYTES_PER_SECOND * 2];

        let start = tokio::time::Instant::now();
        let result = transcriber
            .transcribe_complete(&pcm, &FullAudioOptions::default())
            .await
            .unwrap();

        // 3 attempts for the single chunk; backoffs of 1 s then 2 s observed
        assert_eq!(stt.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), std::time::Duration::from_secs(3));
        assert_eq!(result.text, "ok");
    }

    #[tokio::test]
    async fn cancellation_stops_submitting_further_chunks() {
        let stt = Arc::new(AlwaysOk {
            calls: AtomicUsize::new(0),
        });
        let transcriber = FullAudioTranscriber::new(stt.clone());
        let opts = FullAudioOptions::default();
        opts.cancel.cancel();
        // Oversize input would normally produce several provider calls
        let pcm = vec![0u8; 80 * 1024 * 1024];
        let result = transcriber.transcribe_complete(&pcm, &opts).await;
        assert_eq!(stt.calls.load(Ordering::SeqCst), 0);
        // Every chunk became a placeholder: terminal
        assert!(matches!(result, Err(ParleyError::Transcription(_))));
    }
}
