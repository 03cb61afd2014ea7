//! Audio handling: inbound frame normalization, cumulative PCM accumulation,
//! and the minimal WAV container used for provider submissions.

pub mod framer;
pub mod pcm;
pub mod wav;

pub use framer::AudioData;
pub use pcm::PcmBuffer;
