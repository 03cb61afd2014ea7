//! Inbound audio frame normalization.
//!
//! The device contract is 16-bit LE mono PCM at 16 kHz; the server does no
//! resampling. The framer only normalizes transport encoding: strings are
//! treated as base64, raw byte arrays pass through. Empty and oversized
//! frames are dropped silently.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::protocol_constants::MAX_FRAME_BYTES;

/// Audio payload as it arrives on the attach channel: either a base64 string
/// or a raw byte array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AudioData {
    Text(String),
    Bytes(Vec<u8>),
}

/// Normalizes an inbound frame to raw PCM bytes.
///
/// Returns `None` (silent drop) for empty frames, frames over 1 MiB, and
/// strings that fail base64 decoding.
pub fn normalize(data: &AudioData) -> Option<Vec<u8>> {
    let pcm = match data {
        AudioData::Text(encoded) => {
            if encoded.is_empty() || encoded.len() > MAX_FRAME_BYTES * 2 {
                return None;
            }
            match BASE64.decode(encoded) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::debug!("[Framer] Dropping undecodable frame: {}", e);
                    return None;
                }
            }
        }
        AudioData::Bytes(bytes) => bytes.clone(),
    };

    if pcm.is_empty() || pcm.len() > MAX_FRAME_BYTES {
        return None;
    }
    Some(pcm)
}

/// Normalizes a raw binary frame (WebSocket binary message path).
pub fn normalize_binary(bytes: &[u8]) -> Option<Vec<u8>> {
    if bytes.is_empty() || bytes.len() > MAX_FRAME_BYTES {
        return None;
    }
    Some(bytes.to_vec())
}
