//! Bounded archive access for treepdf
//!
//! This crate opens untrusted archive files and presents their contents as a
//! flat list of entry paths plus on-demand entry reads. Every archive passes
//! two independent size ceilings before any entry can be read:
//!
//! - a **soft limit** configured by the operator (may be disabled), and
//! - the fixed **bomb limit** ([`BOMB_LIMIT`]), always active.
//!
//! Entry reads are additionally capped by the remaining budget of the
//! effective ceiling, so archives whose headers lie about sizes cannot
//! exceed the limits either.
//!
//! # Supported formats
//!
//! - **ZIP** archives
//! - **TAR** archives, plain, gzip or bzip2 compressed
//! - **7Z** archives
//! - **RAR** is recognised but has no driver
//!
//! # Usage
//!
//! ```no_run
//! use treepdf_archive::{ArchiveGuard, ArchiveLimits, ByteSource};
//!
//! let mut guard = ArchiveGuard::new(ArchiveLimits::new(Some(100 << 20)));
//! guard.open(&ByteSource::file("photos.zip"), None).unwrap();
//! for entry in guard.entries().unwrap().to_vec() {
//!     if let Some(contents) = guard.read_entry(&entry).unwrap() {
//!         println!("{entry}: {} bytes", contents.len());
//!     }
//! }
//! guard.close();
//! ```

mod driver;
pub mod error;
pub mod format;
pub mod guard;
pub mod path;
pub mod source;

// =============================================================================
// Archive Constants
// =============================================================================

/// Uncompressed archive size which is _really_ considered harmful (1 GiB).
///
/// Archives above this size are rejected regardless of the configured soft
/// limit. The limit may be lowered per guard but never raised.
pub const BOMB_LIMIT: u64 = 1 << 30;

/// Maximum nesting depth for recursive archive extraction.
///
/// Limits how deeply nested archives are followed (e.g., ZIP within ZIP).
pub const DEFAULT_MAX_DEPTH: usize = 10;

pub use error::ArchiveError;
pub use format::{ArchiveFormat, DriverStatus, FormatCatalog};
pub use guard::{ArchiveGuard, ArchiveLimits};
pub use source::ByteSource;
