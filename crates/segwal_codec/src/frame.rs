//! Checksummed, length-framed multi-part records.
//!
//! ## Frame Format
//!
//! ```text
//! | magic (4) | part count (2) | part length (4) x count | header crc (4) | parts (N) | body crc (4) |
//! ```
//!
//! All integers are little endian. The header checksum covers everything
//! before it, the body checksum covers the concatenated part bytes.
//!
//! ## Splitting
//!
//! Frames are read back from arbitrarily chunked input. The decoder
//! distinguishes three outcomes:
//!
//! - **Incomplete**: not enough bytes yet for one frame → `Ok(None)`
//! - **Malformed**: the header cannot be trusted → `Err(MalformedLength)`
//! - **Corrupt**: a checksum does not match → `Err(ChecksumMismatch)`

use crate::checksum::Checksum;
use crate::error::{CodecError, CodecResult};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"SWAL";

/// Maximum number of parts in a single frame.
pub const MAX_PARTS: usize = 16;

/// Maximum length of a single part.
pub const MAX_PART_LENGTH: usize = 256 * 1024 * 1024;

/// magic (4) + part count (2)
const PREFIX_SIZE: usize = 6;

/// Size of one stored checksum.
const CRC_SIZE: usize = 4;

/// Size of one stored part length.
const LENGTH_SIZE: usize = 4;

fn header_size(parts: usize) -> usize {
    PREFIX_SIZE + parts * LENGTH_SIZE + CRC_SIZE
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The parts, in the order they were encoded.
    pub parts: Vec<Bytes>,
    /// Total number of bytes the frame occupies, framing included.
    pub length: usize,
}

/// Encodes parts into frames.
#[derive(Clone)]
pub struct FrameEncoder {
    checksum: Arc<dyn Checksum>,
}

impl FrameEncoder {
    /// Creates an encoder using the given checksum function.
    pub fn new(checksum: Arc<dyn Checksum>) -> Self {
        Self { checksum }
    }

    /// Encodes `parts` into one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no parts, more than [`MAX_PARTS`]
    /// parts, or a part longer than [`MAX_PART_LENGTH`].
    pub fn encode(&self, parts: &[Bytes]) -> CodecResult<Bytes> {
        if parts.is_empty() || parts.len() > MAX_PARTS {
            return Err(CodecError::encoding_failed(format!(
                "frame must have between 1 and {MAX_PARTS} parts, got {}",
                parts.len()
            )));
        }

        let mut body_len = 0usize;
        for part in parts {
            if part.len() > MAX_PART_LENGTH {
                return Err(CodecError::encoding_failed(format!(
                    "part of {} bytes exceeds maximum of {MAX_PART_LENGTH}",
                    part.len()
                )));
            }
            body_len += part.len();
        }

        let header_len = header_size(parts.len());
        let mut frame = BytesMut::with_capacity(header_len + body_len + CRC_SIZE);

        frame.put_slice(&FRAME_MAGIC);
        // Bounded by MAX_PARTS above.
        frame.put_u16_le(parts.len() as u16);
        for part in parts {
            frame.put_u32_le(part.len() as u32);
        }
        let header_crc = self.checksum.checksum(&frame);
        frame.put_u32_le(header_crc);

        let body_start = frame.len();
        for part in parts {
            frame.put_slice(part);
        }
        let body_crc = self.checksum.checksum(&frame[body_start..]);
        frame.put_u32_le(body_crc);

        Ok(frame.freeze())
    }
}

impl std::fmt::Debug for FrameEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameEncoder").finish_non_exhaustive()
    }
}

/// Parsed and validated frame header.
struct Header {
    lengths: Vec<usize>,
    header_len: usize,
    total_len: usize,
}

/// Decodes frames, possibly from incomplete input.
#[derive(Clone)]
pub struct FrameDecoder {
    checksum: Arc<dyn Checksum>,
}

impl FrameDecoder {
    /// Creates a decoder using the given checksum function.
    pub fn new(checksum: Arc<dyn Checksum>) -> Self {
        Self { checksum }
    }

    /// Returns the total length of the frame at the start of `buf`.
    ///
    /// Returns `Ok(None)` if `buf` does not yet hold the complete header.
    /// The header checksum is verified before a length is reported.
    pub fn frame_length(&self, buf: &[u8]) -> CodecResult<Option<usize>> {
        Ok(self.header(buf)?.map(|header| header.total_len))
    }

    fn header(&self, buf: &[u8]) -> CodecResult<Option<Header>> {
        let magic_len = FRAME_MAGIC.len().min(buf.len());
        if buf[..magic_len] != FRAME_MAGIC[..magic_len] {
            return Err(CodecError::malformed("invalid frame magic"));
        }
        if buf.len() < PREFIX_SIZE {
            return Ok(None);
        }

        let count = usize::from(u16::from_le_bytes([buf[4], buf[5]]));
        if count == 0 || count > MAX_PARTS {
            return Err(CodecError::malformed(format!(
                "part count {count} outside 1..={MAX_PARTS}"
            )));
        }

        let header_len = header_size(count);
        if buf.len() < header_len {
            return Ok(None);
        }

        let crc_offset = header_len - CRC_SIZE;
        let stored = read_u32(&buf[crc_offset..]);
        let computed = self.checksum.checksum(&buf[..crc_offset]);
        if stored != computed {
            return Err(CodecError::ChecksumMismatch {
                section: "header",
                expected: stored,
                actual: computed,
            });
        }

        let mut lengths = Vec::with_capacity(count);
        let mut body_len = 0usize;
        for i in 0..count {
            let offset = PREFIX_SIZE + i * LENGTH_SIZE;
            let length = read_u32(&buf[offset..]) as usize;
            if length > MAX_PART_LENGTH {
                return Err(CodecError::malformed(format!(
                    "part length {length} exceeds maximum of {MAX_PART_LENGTH}"
                )));
            }
            body_len += length;
            lengths.push(length);
        }

        Ok(Some(Header {
            lengths,
            header_len,
            total_len: header_len + body_len + CRC_SIZE,
        }))
    }

    /// Splits the first complete frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` if `buf` holds less than one complete frame.
    /// Parts are zero-copy slices of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedLength`] for an untrustworthy header
    /// and [`CodecError::ChecksumMismatch`] for corrupt bytes.
    pub fn split(&self, buf: &Bytes) -> CodecResult<Option<Frame>> {
        let Some(header) = self.header(buf)? else {
            return Ok(None);
        };
        if buf.len() < header.total_len {
            return Ok(None);
        }

        let body_end = header.total_len - CRC_SIZE;
        let body = &buf[header.header_len..body_end];
        let stored = read_u32(&buf[body_end..]);
        let computed = self.checksum.checksum(body);
        if stored != computed {
            return Err(CodecError::ChecksumMismatch {
                section: "body",
                expected: stored,
                actual: computed,
            });
        }

        let mut parts = Vec::with_capacity(header.lengths.len());
        let mut offset = header.header_len;
        for length in header.lengths {
            parts.push(buf.slice(offset..offset + length));
            offset += length;
        }

        Ok(Some(Frame {
            parts,
            length: header.total_len,
        }))
    }

    /// Splits every complete frame out of `buf`.
    ///
    /// Returns the frames and the number of bytes they consumed; any
    /// remaining bytes are an incomplete trailing frame.
    pub fn split_all(&self, buf: &Bytes) -> CodecResult<(Vec<Frame>, usize)> {
        let mut frames = Vec::new();
        let mut consumed = 0usize;
        while consumed < buf.len() {
            let rest = buf.slice(consumed..);
            match self.split(&rest)? {
                Some(frame) => {
                    consumed += frame.length;
                    frames.push(frame);
                }
                None => break,
            }
        }
        Ok((frames, consumed))
    }
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder").finish_non_exhaustive()
    }
}

fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}
