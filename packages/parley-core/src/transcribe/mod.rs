//! Transcription pipelines: rolling streaming windows during the session and
//! the authoritative chunked full-audio pass at session end.

pub mod full;
mod retry;
pub mod streaming;

pub use full::{CompleteTranscription, FullAudioOptions, FullAudioTranscriber, TranscribedSegment};
pub use streaming::{StreamingPartial, StreamingTranscriber};
