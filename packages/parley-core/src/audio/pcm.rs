//! Cumulative PCM accumulation for a session.

use crate::protocol_constants::PCM_BYTES_PER_SECOND;

/// Append-only PCM accumulator for one session.
///
/// Bytes append in exactly the order the orchestrator accepts them, and
/// [`PcmBuffer::snapshot`] returns the full contiguous sequence. Memory grows
/// linearly with session duration: 32 KiB per second at the device contract
/// format, roughly 115 MiB per hour. Long sessions (hours) are expected.
#[derive(Debug, Default)]
pub struct PcmBuffer {
    data: Vec<u8>,
    chunks: u64,
}

impl PcmBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one accepted frame.
    pub fn append(&mut self, pcm: &[u8]) {
        self.data.extend_from_slice(pcm);
        self.chunks += 1;
    }

    /// Total accumulated bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether any audio has been accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of frames appended so far.
    #[must_use]
    pub fn chunk_count(&self) -> u64 {
        self.chunks
    }

    /// Estimated audio duration derived from the byte count.
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        self.data.len() as f64 / PCM_BYTES_PER_SECOND as f64
    }

    /// Accumulated size in mebibytes.
    #[must_use]
    pub fn size_mb(&self) -> f64 {
        self.data.len() as f64 / (1024.0 * 1024.0)
    }

    /// Full contiguous copy of everything accepted, in receive order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_preserve_order() {
        let mut buf = PcmBuffer::new();
        buf.append(&[1, 2]);
        buf.append(&[3]);
        buf.append(&[4, 5, 6]);
        assert_eq!(buf.snapshot(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(buf.chunk_count(), 3);
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn duration_tracks_byte_count() {
        let mut buf = PcmBuffer::new();
        buf.append(&vec![0u8; PCM_BYTES_PER_SECOND * 2]);
        assert!((buf.duration_seconds() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_buffer_reports_zero() {
        let buf = PcmBuffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.duration_seconds(), 0.0);
        assert_eq!(buf.chunk_count(), 0);
    }
}
