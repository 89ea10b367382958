//! Error types for medium store operations

use crate::action::ActionKind;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// Result type alias for medium store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Structured end-of-medium outcome.
///
/// Reported whenever fewer bytes than requested could be obtained from the
/// medium. Callers may either continue with the partial bytes or treat the
/// condition as fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfMedium {
    /// Absolute position the read started at
    pub offset: u64,
    /// Number of bytes requested
    pub requested: usize,
    /// Number of bytes that were actually available
    pub bytes_read: usize,
    /// The bytes obtained before the end of the medium was hit
    pub partial: Bytes,
}

impl EndOfMedium {
    /// Create an end-of-medium outcome without any partial bytes
    pub fn empty(offset: u64, requested: usize) -> Self {
        Self {
            offset,
            requested,
            bytes_read: 0,
            partial: Bytes::new(),
        }
    }

    /// Create an end-of-medium outcome carrying the bytes read so far
    pub fn with_partial(offset: u64, requested: usize, partial: Bytes) -> Self {
        Self {
            offset,
            requested,
            bytes_read: partial.len(),
            partial,
        }
    }
}

impl fmt::Display for EndOfMedium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tried to read {} bytes at offset {}, but only {} bytes were available",
            self.requested, self.offset, self.bytes_read
        )
    }
}

/// Errors that can occur during medium store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is not opened
    #[error("Medium store is closed")]
    Closed,

    /// The store or accessor is already opened
    #[error("Medium store is already opened")]
    AlreadyOpen,

    /// Fewer bytes than requested were available
    #[error("End of medium: {0}")]
    EndOfMedium(EndOfMedium),

    /// A non-random-access medium was asked to re-read an already passed range
    #[error("Invalid medium offset {offset}: {reason}")]
    InvalidMediumOffset {
        /// The offending absolute position
        offset: u64,
        /// Why the position cannot be served
        reason: String,
    },

    /// An edit was attempted on a read-only medium
    #[error("Medium is read-only: {0}")]
    ReadOnlyMedium(String),

    /// A new edit overlaps a pending edit without enclosing it
    #[error(
        "{new_kind} of [{new_start}, {new_end}) overlaps pending {existing_kind} of [{existing_start}, {existing_end})"
    )]
    OverlappingWrite {
        /// Kind of the pending action
        existing_kind: ActionKind,
        /// Start of the pending action's range
        existing_start: u64,
        /// End of the pending action's range
        existing_end: u64,
        /// Kind of the rejected action
        new_kind: ActionKind,
        /// Start of the rejected action's range
        new_start: u64,
        /// End of the rejected action's range
        new_end: u64,
    },

    /// The action was already applied or undone
    #[error("Action {0} is not pending")]
    ActionNotPending(u64),

    /// An offset or action of another store session was used
    #[error("Foreign medium: {0}")]
    ForeignMedium(String),

    /// The offset handle is not (or no longer) registered
    #[error("Unknown medium offset handle: {0}")]
    UnknownOffset(String),

    /// A precondition on an argument was violated
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid store configuration
    #[error("Invalid store configuration: {0}")]
    InvalidConfiguration(String),

    /// The stream of a stream medium was already taken by another accessor
    #[error("Stream unavailable: {0}")]
    StreamUnavailable(String),

    /// I/O error from the underlying resource
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Check whether this is an end-of-medium outcome
    pub const fn is_end_of_medium(&self) -> bool {
        matches!(self, Self::EndOfMedium(_))
    }

    /// Get the end-of-medium payload, if any
    pub const fn as_end_of_medium(&self) -> Option<&EndOfMedium> {
        match self {
            Self::EndOfMedium(eom) => Some(eom),
            _ => None,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<EndOfMedium> for StoreError {
    fn from(eom: EndOfMedium) -> Self {
        Self::EndOfMedium(eom)
    }
}
