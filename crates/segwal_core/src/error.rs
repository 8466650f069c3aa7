//! Error types for the write-ahead log.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for WAL operations.
pub type WalResult<T> = Result<T, WalError>;

/// Errors that can occur while writing, reading or maintaining a WAL.
#[derive(Debug, Error)]
pub enum WalError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record failed checksum verification.
    #[error("checksum mismatch: expected {expected:016x}, got {actual:016x}")]
    ChecksumMismatch {
        /// Checksum stored with the record (or anchored chain value).
        expected: u64,
        /// Checksum computed while decoding.
        actual: u64,
    },

    /// A frame declares more bytes than its segment holds.
    #[error("unexpected end of log at offset {offset}")]
    UnexpectedEndOfLog {
        /// Segment offset of the frame that was cut short.
        offset: u64,
    },

    /// Segments disagree on their header metadata.
    #[error("conflicting metadata found")]
    MetadataConflict,

    /// No segment files in a directory expected to hold a log.
    #[error("no WAL files found in {}", dir.display())]
    FileNotFound {
        /// The directory that was scanned.
        dir: PathBuf,
    },

    /// A file claims to be a sealed segment but its name does not parse.
    #[error("bad WAL segment name: {name}")]
    BadName {
        /// The offending file name.
        name: String,
    },

    /// A record body or entry payload is malformed.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in the current mode.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// The WAL was opened read-only.
    #[error("WAL is opened read-only")]
    ReadOnly,

    /// The WAL is closed.
    #[error("WAL is closed")]
    Closed,

    /// The background segment allocator has stopped.
    #[error("segment allocator is closed")]
    AllocatorClosed,

    /// Configuration rejected by [`crate::WalConfig::validate`].
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the rejected setting.
        message: String,
    },
}

impl WalError {
    /// Creates an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if the error indicates on-disk corruption.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. }
                | Self::UnexpectedEndOfLog { .. }
                | Self::InvalidRecord { .. }
        )
    }
}
