//! Pluggable checksum functions.

/// A checksum function applied to frame headers and bodies.
///
/// Implementations must be deterministic: the same bytes always produce
/// the same value, across processes and restarts, or previously written
/// segments will fail validation on replay.
pub trait Checksum: Send + Sync {
    /// Computes the checksum of `data`.
    fn checksum(&self, data: &[u8]) -> u32;
}

/// CRC-32 (IEEE) checksum. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32;

impl Checksum for Crc32 {
    fn checksum(&self, data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}

/// A checksum that is always zero.
///
/// Disables corruption detection; framing and lengths are still validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoChecksum;

impl Checksum for NoChecksum {
    fn checksum(&self, _data: &[u8]) -> u32 {
        0
    }
}

impl<F> Checksum for F
where
    F: Fn(&[u8]) -> u32 + Send + Sync,
{
    fn checksum(&self, data: &[u8]) -> u32 {
        self(data)
    }
}
