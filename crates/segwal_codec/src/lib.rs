//! # segwal Codec
//!
//! Key canonicalization and record framing for the segwal write-ahead log.
//!
//! This crate provides:
//! - [`Key`] - structured lookup keys and their [`CanonicalKey`] tokens
//! - [`encode_keys`] / [`decode_keys`] - the compact CBOR array stored with
//!   every record
//! - [`FrameEncoder`] / [`FrameDecoder`] - checksummed, length-framed
//!   multi-part records with incremental splitting
//! - [`Checksum`] - the pluggable checksum function used by the framing
//!
//! ## Usage
//!
//! ```
//! use bytes::Bytes;
//! use segwal_codec::{encode_keys, Crc32, FrameDecoder, FrameEncoder, Key};
//! use std::sync::Arc;
//!
//! let checksum = Arc::new(Crc32);
//! let encoder = FrameEncoder::new(checksum.clone());
//! let decoder = FrameDecoder::new(checksum);
//!
//! let keys = encode_keys(&[Key::from(1), Key::from("users")]).unwrap();
//! let frame = encoder.encode(&[Bytes::from(keys), Bytes::from_static(b"body")]).unwrap();
//!
//! let decoded = decoder.split(&frame).unwrap().unwrap();
//! assert_eq!(decoded.length, frame.len());
//! assert_eq!(&decoded.parts[1][..], b"body");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checksum;
mod error;
mod frame;
mod key;

pub use checksum::{Checksum, Crc32, NoChecksum};
pub use error::{CodecError, CodecResult};
pub use frame::{
    Frame, FrameDecoder, FrameEncoder, FRAME_MAGIC, MAX_PARTS, MAX_PART_LENGTH,
};
pub use key::{decode_keys, encode_keys, CanonicalKey, Key};
