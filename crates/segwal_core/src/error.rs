//! Error types for the write-ahead log.
//!
//! Every I/O-family error reports [`ErrorCode::IoError`] and, where a file
//! is involved, names it. [`WalError::cause`] tells the members of the
//! family apart.

use segwal_codec::CodecError;
use segwal_storage::StorageError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for write-ahead log operations.
pub type WalResult<T> = Result<T, WalError>;

/// Stable error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Any failure to open, read, write, sync, or decode a segment, and
    /// writes attempted while no segment is active.
    IoError,
    /// Another process holds the log directory.
    Locked,
    /// The log has been closed.
    Closed,
    /// The caller supplied an unusable argument or configuration.
    InvalidArgument,
}

impl ErrorCode {
    /// Returns the code as a string, e.g. `"IO_ERROR"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IoError => "IO_ERROR",
            Self::Locked => "LOCKED",
            Self::Closed => "CLOSED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in write-ahead log operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// A segment file could not be opened.
    #[error("unable to open file {}: {source}", filename.display())]
    Open {
        /// The segment file.
        filename: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Reading, writing, syncing, or removing a segment file failed.
    #[error("i/o error on {}: {source}", filename.display())]
    Io {
        /// The file involved.
        filename: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Fewer bytes were read than the indexed block length.
    #[error("incomplete read of block in {}: expected {expected} bytes, read {actual}", filename.display())]
    BlockShortRead {
        /// The segment file.
        filename: PathBuf,
        /// Indexed block length.
        expected: u32,
        /// Bytes actually read.
        actual: usize,
    },

    /// A block did not decode to exactly one record.
    #[error("block did not parse correctly in {}: {reason}", filename.display())]
    BlockMissing {
        /// The segment file.
        filename: PathBuf,
        /// What was wrong with the block.
        reason: String,
    },

    /// A block failed checksum validation.
    #[error("block contained an invalid checksum in {}: {source}", filename.display())]
    InvalidChecksum {
        /// The segment file.
        filename: PathBuf,
        /// The codec failure.
        #[source]
        source: CodecError,
    },

    /// A write was attempted while no segment is active.
    #[error("attempt to write when no logs exist")]
    NoLogs,

    /// Another process holds the log directory lock.
    #[error("log directory {} is locked by another process", path.display())]
    Locked {
        /// The log directory.
        path: PathBuf,
    },

    /// The log has been closed.
    #[error("write-ahead log is closed")]
    Closed,

    /// An entry could not be encoded.
    #[error("invalid entry: {source}")]
    InvalidEntry {
        /// The codec failure.
        #[source]
        source: CodecError,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },
}

impl WalError {
    /// Returns the stable code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Open { .. }
            | Self::Io { .. }
            | Self::BlockShortRead { .. }
            | Self::BlockMissing { .. }
            | Self::InvalidChecksum { .. }
            | Self::NoLogs => ErrorCode::IoError,
            Self::Locked { .. } => ErrorCode::Locked,
            Self::Closed => ErrorCode::Closed,
            Self::InvalidEntry { .. } | Self::InvalidConfig { .. } => ErrorCode::InvalidArgument,
        }
    }

    /// Returns the specific cause within the error's family, e.g.
    /// `"BLOCK_SHORT_READ"`.
    #[must_use]
    pub fn cause(&self) -> &'static str {
        match self {
            Self::Open { .. } => "OPEN_ERROR",
            Self::Io { .. } => "IO",
            Self::BlockShortRead { .. } => "BLOCK_SHORT_READ",
            Self::BlockMissing { .. } => "BLOCK_MISSING",
            Self::InvalidChecksum { .. } => "INVALID_CHECKSUM",
            Self::NoLogs => "NO_LOGS",
            Self::Locked { .. } => "LOCKED",
            Self::Closed => "CLOSED",
            Self::InvalidEntry { .. } => "INVALID_ENTRY",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
        }
    }

    /// Returns the file this error concerns, if any.
    #[must_use]
    pub fn filename(&self) -> Option<&std::path::Path> {
        match self {
            Self::Open { filename, .. }
            | Self::Io { filename, .. }
            | Self::BlockShortRead { filename, .. }
            | Self::BlockMissing { filename, .. }
            | Self::InvalidChecksum { filename, .. } => Some(filename),
            Self::Locked { path } => Some(path),
            Self::NoLogs | Self::Closed | Self::InvalidEntry { .. } | Self::InvalidConfig { .. } => {
                None
            }
        }
    }

    /// Creates an I/O error for `filename`.
    pub fn io(filename: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            filename: filename.into(),
            source,
        }
    }

    /// Creates a block missing error.
    pub fn block_missing(filename: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::BlockMissing {
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    /// Classifies a codec failure while decoding a block of `filename`.
    pub fn from_codec(filename: impl Into<PathBuf>, source: CodecError) -> Self {
        let filename = filename.into();
        if source.is_checksum_mismatch() {
            Self::InvalidChecksum { filename, source }
        } else {
            Self::BlockMissing {
                filename,
                reason: source.to_string(),
            }
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

impl From<StorageError> for WalError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Open { path, source } => Self::Open {
                filename: path,
                source,
            },
            StorageError::Read { path, source } | StorageError::Write { path, source } => {
                Self::Io {
                    filename: path,
                    source,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_family_shares_one_code() {
        let errors = [
            WalError::io("0", io::Error::other("boom")),
            WalError::BlockShortRead {
                filename: "0".into(),
                expected: 10,
                actual: 3,
            },
            WalError::block_missing("0", "no records"),
            WalError::from_codec(
                "0",
                CodecError::ChecksumMismatch {
                    section: "body",
                    expected: 1,
                    actual: 2,
                },
            ),
        ];
        let causes = ["IO", "BLOCK_SHORT_READ", "BLOCK_MISSING", "INVALID_CHECKSUM"];
        for (err, cause) in errors.iter().zip(causes) {
            assert_eq!(err.cause(), cause);
            assert_eq!(err.code(), ErrorCode::IoError);
            assert_eq!(err.code().as_str(), "IO_ERROR");
            assert_eq!(err.filename(), Some(std::path::Path::new("0")));
        }
    }

    #[test]
    fn codec_errors_are_classified() {
        let checksum = WalError::from_codec(
            "1",
            CodecError::ChecksumMismatch {
                section: "header",
                expected: 1,
                actual: 2,
            },
        );
        assert!(matches!(checksum, WalError::InvalidChecksum { .. }));

        let malformed = WalError::from_codec("1", CodecError::malformed("bad magic"));
        assert!(matches!(malformed, WalError::BlockMissing { .. }));
    }

    #[test]
    fn storage_open_maps_to_open() {
        let err: WalError = StorageError::Open {
            path: "7".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        }
        .into();
        assert!(matches!(err, WalError::Open { .. }));
        assert!(err.to_string().contains("unable to open file 7"));
    }

    #[test]
    fn no_logs_message() {
        assert_eq!(
            WalError::NoLogs.to_string(),
            "attempt to write when no logs exist"
        );
        assert_eq!(WalError::NoLogs.code(), ErrorCode::IoError);
        assert_eq!(WalError::NoLogs.cause(), "NO_LOGS");
    }
}
