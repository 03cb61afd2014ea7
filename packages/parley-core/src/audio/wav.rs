use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol_constants::{BITS_PER_SAMPLE, CHANNELS, SAMPLE_RATE_HZ, WAV_HEADER_BYTES};

/// Generates a standard 44-byte WAVE header for a finite LPCM payload.
///
/// @param sample_rate - Typically 16000 for the device contract.
/// @param channels - 1 (mono) or 2 (stereo).
/// @param bits_per_sample - Bit depth (16 or 24). Invalid values default to 16.
/// @param data_len - Exact byte length of the PCM payload that follows.
pub fn create_wav_header(
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    data_len: u32,
) -> Bytes {
    // Validate bits_per_sample - only 16 and 24 are valid for PCM WAV
    let bits_per_sample = match bits_per_sample {
        16 | 24 => bits_per_sample,
        other => {
            log::warn!("[WAV] Invalid bits_per_sample {}, defaulting to 16", other);
            16
        }
    };

    let mut header = BytesMut::with_capacity(WAV_HEADER_BYTES);

    let bytes_per_sample = bits_per_sample / 8;
    let byte_rate = sample_rate * channels as u32 * bytes_per_sample as u32;
    let block_align = channels * bytes_per_sample;

    // RIFF header
    header.put_slice(b"RIFF");
    header.put_u32_le(36 + data_len); // File size minus the 8-byte RIFF preamble
    header.put_slice(b"WAVE");

    // fmt chunk
    header.put_slice(b"fmt ");
    header.put_u32_le(16); // Chunk size
    header.put_u16_le(1); // Audio format (PCM)
    header.put_u16_le(channels);
    header.put_u32_le(sample_rate);
    header.put_u32_le(byte_rate);
    header.put_u16_le(block_align);
    header.put_u16_le(bits_per_sample);

    // data chunk
    header.put_slice(b"data");
    header.put_u32_le(data_len);

    header.freeze()
}

/// Wraps a raw PCM payload in the device-contract WAV container
/// (16 kHz mono 16-bit LE).
pub fn wrap_pcm(pcm: &[u8]) -> Vec<u8> {
    let header = create_wav_header(SAMPLE_RATE_HZ, CHANNELS, BITS_PER_SAMPLE, pcm.len() as u32);
    let mut wav = Vec::with_capacity(WAV_HEADER_BYTES + pcm.len());
    wav.extend_from_slice(&header);
    wav.extend_from_slice(pcm);
    wav
}

/// Size of the WAV container produced by [`wrap_pcm`] for a PCM payload.
#[must_use]
pub fn wav_size(pcm_len: usize) -> usize {
    WAV_HEADER_BYTES + pcm_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_44_bytes() {
        let header = create_wav_header(16000, 1, 16, 32000);
        assert_eq!(header.len(), 44);
    }

    #[test]
    fn header_magic_and_sizes() {
        let header = create_wav_header(16000, 1, 16, 32000);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(&header[36..40], b"data");
        // RIFF size = 36 + data_len
        let riff_size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        assert_eq!(riff_size, 36 + 32000);
        let data_size = u32::from_le_bytes([header[40], header[41], header[42], header[43]]);
        assert_eq!(data_size, 32000);
    }

    #[test]
    fn header_format_fields() {
        let header = create_wav_header(16000, 1, 16, 0);
        let format = u16::from_le_bytes([header[20], header[21]]);
        let channels = u16::from_le_bytes([header[22], header[23]]);
        let sample_rate = u32::from_le_bytes([header[24], header[25], header[26], header[27]]);
        let byte_rate = u32::from_le_bytes([header[28], header[29], header[30], header[31]]);
        let bits = u16::from_le_bytes([header[34], header[35]]);
        assert_eq!(format, 1); // PCM
        assert_eq!(channels, 1);
        assert_eq!(sample_rate, 16000);
        assert_eq!(byte_rate, 32000);
        assert_eq!(bits, 16);
    }

    #[test]
    fn invalid_bit_depth_defaults_to_16() {
        let header = create_wav_header(16000, 1, 13, 0);
        let bits = u16::from_le_bytes([header[34], header[35]]);
        assert_eq!(bits, 16);
    }

    #[test]
    fn wrap_pcm_prepends_header() {
        let pcm = vec![0u8; 320];
        let wav = wrap_pcm(&pcm);
        assert_eq!(wav.len(), wav_size(pcm.len()));
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[44..], &pcm[..]);
    }
}
