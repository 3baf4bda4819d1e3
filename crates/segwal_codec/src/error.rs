//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while framing records or encoding keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A stored checksum does not match the checksum of the framed bytes.
    #[error("checksum mismatch in {section}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Which part of the frame failed (`header` or `body`).
        section: &'static str,
        /// Checksum stored in the frame.
        expected: u32,
        /// Checksum computed over the bytes read.
        actual: u32,
    },

    /// The frame header cannot describe a valid record.
    #[error("malformed frame length: {message}")]
    MalformedLength {
        /// Description of the framing problem.
        message: String,
    },

    /// Failed to encode the key list.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode the key list.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// A CBOR item has no key representation.
    #[error("unsupported key type: {type_name}")]
    UnsupportedType {
        /// Name of the unsupported type.
        type_name: String,
    },
}

impl CodecError {
    /// Create a malformed length error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedLength {
            message: message.into(),
        }
    }

    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Returns true if this error is a checksum failure.
    #[must_use]
    pub fn is_checksum_mismatch(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. })
    }
}
