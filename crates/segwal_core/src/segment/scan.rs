//! Sequential record scan over a segment file.
//!
//! Reads the file in chunks and splits complete records off the front of
//! the accumulated bytes. Bytes that do not yet form a whole record are
//! carried over and prefixed to the next chunk.

use crate::error::{WalError, WalResult};
use bytes::{Bytes, BytesMut};
use segwal_codec::{Frame, FrameDecoder};
use segwal_storage::ChunkReader;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// A record found by the scanner.
#[derive(Debug)]
pub(crate) struct ScannedFrame {
    /// Offset of the record in the file.
    pub position: u64,
    /// The decoded record.
    pub frame: Frame,
}

/// Yields every complete record of a segment file in order.
#[derive(Debug)]
pub(crate) struct FrameScanner {
    path: PathBuf,
    reader: ChunkReader,
    decoder: FrameDecoder,
    remainder: Bytes,
    ready: VecDeque<Frame>,
    position: u64,
    eof: bool,
}

impl FrameScanner {
    pub(crate) async fn open(
        path: &Path,
        decoder: FrameDecoder,
        chunk_size: usize,
    ) -> WalResult<Self> {
        let reader = ChunkReader::open(path, chunk_size).await?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            decoder,
            remainder: Bytes::new(),
            ready: VecDeque::new(),
            position: 0,
            eof: false,
        })
    }

    /// Returns the next complete record, or `None` at end of file.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, on a checksum mismatch, and on framing that
    /// cannot be trusted.
    pub(crate) async fn next_frame(&mut self) -> WalResult<Option<ScannedFrame>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                let position = self.position;
                self.position += frame.length as u64;
                return Ok(Some(ScannedFrame { position, frame }));
            }
            if self.eof {
                return Ok(None);
            }

            match self.reader.next_chunk().await? {
                Some(chunk) => self.fill(chunk)?,
                None => self.eof = true,
            }
        }
    }

    fn fill(&mut self, chunk: Bytes) -> WalResult<()> {
        let buffer = if self.remainder.is_empty() {
            chunk
        } else {
            let mut joined = BytesMut::with_capacity(self.remainder.len() + chunk.len());
            joined.extend_from_slice(&self.remainder);
            joined.extend_from_slice(&chunk);
            joined.freeze()
        };

        let (frames, consumed) = self
            .decoder
            .split_all(&buffer)
            .map_err(|e| WalError::from_codec(&self.path, e))?;
        self.ready.extend(frames);
        self.remainder = buffer.slice(consumed..);
        Ok(())
    }

    /// Offset just past the last complete record returned so far.
    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    /// Bytes left over at end of file that do not form a complete record.
    pub(crate) fn trailing(&self) -> usize {
        self.remainder.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segwal_codec::{Checksum, Crc32, FrameEncoder};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn codec() -> (FrameEncoder, FrameDecoder) {
        let checksum: Arc<dyn Checksum> = Arc::new(Crc32);
        (
            FrameEncoder::new(checksum.clone()),
            FrameDecoder::new(checksum),
        )
    }

    fn record(encoder: &FrameEncoder, body: &'static [u8]) -> Bytes {
        encoder
            .encode(&[Bytes::from_static(b"k"), Bytes::from_static(body)])
            .unwrap()
    }

    #[tokio::test]
    async fn scans_across_small_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0");
        let (encoder, decoder) = codec();

        let records = [
            record(&encoder, b"first"),
            record(&encoder, b""),
            record(&encoder, b"third record"),
        ];
        let mut content = Vec::new();
        for r in &records {
            content.extend_from_slice(r);
        }
        tokio::fs::write(&path, &content).await.unwrap();

        let mut scanner = FrameScanner::open(&path, decoder, 7).await.unwrap();
        let mut expected_position = 0u64;
        for r in &records {
            let scanned = scanner.next_frame().await.unwrap().unwrap();
            assert_eq!(scanned.position, expected_position);
            assert_eq!(scanned.frame.length, r.len());
            expected_position += r.len() as u64;
        }
        assert!(scanner.next_frame().await.unwrap().is_none());
        assert_eq!(scanner.position(), content.len() as u64);
        assert_eq!(scanner.trailing(), 0);
    }

    #[tokio::test]
    async fn torn_tail_is_reported_not_returned() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0");
        let (encoder, decoder) = codec();

        let whole = record(&encoder, b"whole");
        let torn = record(&encoder, b"torn");
        let mut content = whole.to_vec();
        content.extend_from_slice(&torn[..torn.len() - 3]);
        tokio::fs::write(&path, &content).await.unwrap();

        let mut scanner = FrameScanner::open(&path, decoder, 1024).await.unwrap();
        assert!(scanner.next_frame().await.unwrap().is_some());
        assert!(scanner.next_frame().await.unwrap().is_none());
        assert_eq!(scanner.position(), whole.len() as u64);
        assert_eq!(scanner.trailing(), torn.len() - 3);
    }

    #[tokio::test]
    async fn corruption_fails_the_scan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0");
        let (encoder, decoder) = codec();

        let mut content = record(&encoder, b"payload").to_vec();
        let body_byte = content.len() - 6;
        content[body_byte] ^= 0xFF;
        tokio::fs::write(&path, &content).await.unwrap();

        let mut scanner = FrameScanner::open(&path, decoder, 1024).await.unwrap();
        let err = scanner.next_frame().await.unwrap_err();
        assert!(matches!(err, WalError::InvalidChecksum { .. }));
        assert_eq!(err.filename(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn garbage_is_block_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0");
        tokio::fs::write(&path, b"not a record").await.unwrap();

        let (_, decoder) = codec();
        let mut scanner = FrameScanner::open(&path, decoder, 1024).await.unwrap();
        assert!(matches!(
            scanner.next_frame().await.unwrap_err(),
            WalError::BlockMissing { .. }
        ));
    }
}
