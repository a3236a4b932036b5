use chrono::NaiveTime;
use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Errors surfaced by the channel document engine.
///
/// File-level variants carry the path relative to the channel root so the
/// caller can show which file failed.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: unsupported version \"{found}\" (expected \"{expected}\")", .path.display())]
    UnsupportedVersion {
        path: PathBuf,
        found: String,
        expected: &'static str,
    },

    #[error("{}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("failed to encode {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("resource identifier \"{0}\" is already used in this schedule")]
    IdentifierInUse(String),

    #[error("unknown resource identifier \"{0}\"")]
    UnknownResource(String),

    #[error("day ordinal {0} is outside the channel")]
    NoSuchDay(i64),

    #[error("no program starts at {} on day {ordinal}", .start_time.format("%H:%M"))]
    NoSuchProgram { ordinal: i64, start_time: NaiveTime },

    #[error("no list with identifier \"{0}\"")]
    NoSuchList(String),

    #[error("a list with identifier \"{0}\" already exists")]
    DuplicateList(String),

    #[error("no series with identifier \"{0}\"")]
    NoSuchSeries(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ChannelError {
    /// True for failures that concern a whole file (open or save), as opposed
    /// to a rejected editing intent.
    pub fn is_file_error(&self) -> bool {
        matches!(
            self,
            ChannelError::Read { .. }
                | ChannelError::Decode { .. }
                | ChannelError::UnsupportedVersion { .. }
                | ChannelError::Malformed { .. }
                | ChannelError::Encode { .. }
                | ChannelError::Write { .. }
        )
    }
}
