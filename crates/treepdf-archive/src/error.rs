//! Error types for archive operations

use thiserror::Error;

/// Errors that can occur during archive operations
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// IO error during archive operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The source is not a supported archive or the backend refused it
    #[error("Unable to open archive file {name}: {reason}")]
    CannotOpen {
        /// Logical name of the archive
        name: String,
        /// Why the archive could not be opened
        reason: String,
    },

    /// Uncompressed size exceeds the configured soft limit
    #[error("Uncompressed size of archive \"{name}\" is too large: {size} > {limit}")]
    TooLarge {
        /// Logical name of the archive
        name: String,
        /// Measured uncompressed size (may be a lower bound)
        size: u64,
        /// Soft limit in effect
        limit: u64,
    },

    /// Uncompressed size exceeds the fixed bomb limit
    #[error("Archive \"{name}\" is a potential zip bomb, size {size} > {limit}")]
    BombDetected {
        /// Logical name of the archive
        name: String,
        /// Measured uncompressed size (may be a lower bound)
        size: u64,
        /// Bomb limit in effect
        limit: u64,
    },

    /// An operation needs an open archive but none is current
    #[error("There is no archive file associated with this archiver instance")]
    NotOpen,

    /// Reading an entry would exceed the remaining size budget
    #[error("Entry '{entry}' exceeds the remaining archive size budget of {budget} bytes")]
    EntryTooLarge {
        /// Entry path within the archive
        entry: String,
        /// Remaining budget when the read started
        budget: u64,
    },

    /// Archive is password-protected
    #[error("Archive entry '{entry}' is password-protected")]
    PasswordProtected {
        /// Entry path within the archive
        entry: String,
    },

    /// The archive is damaged past the point of opening
    #[error("Corrupt archive {name}: {reason}")]
    Corrupt {
        /// Logical name of the archive
        name: String,
        /// Backend error message
        reason: String,
    },
}

impl ArchiveError {
    /// Whether this error is one of the size ceilings
    #[inline]
    #[must_use = "returns whether the error is a size-limit failure"]
    pub const fn is_size_limit(&self) -> bool {
        matches!(
            self,
            Self::TooLarge { .. } | Self::BombDetected { .. } | Self::EntryTooLarge { .. }
        )
    }
}
