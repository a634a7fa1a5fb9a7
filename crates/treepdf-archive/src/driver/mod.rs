//! Format drivers behind the guard
//!
//! A driver exposes the backend capabilities the guard needs: measure, list
//! and read. Size ceilings are enforced by the guard, never by a driver.

mod sevenz;
mod tar;
mod zip;

use crate::error::ArchiveError;
use crate::format::ArchiveFormat;
use crate::source::ByteSource;
use std::io::Read;

pub(crate) trait ArchiveDriver: Send {
    /// Sum of declared uncompressed entry sizes. May stop once the running
    /// total exceeds `cutoff`; the returned value is then a lower bound.
    fn uncompressed_size(&mut self, cutoff: u64) -> Result<u64, ArchiveError>;

    /// Sanitized file entry paths in archive order, unique
    fn entries(&mut self) -> Result<Vec<String>, ArchiveError>;

    /// Content of one entry, at most `cap` bytes; `None` if the entry is absent
    fn read_entry(&mut self, path: &str, cap: u64) -> Result<Option<Vec<u8>>, ArchiveError>;
}

/// Open the driver for a detected format
pub(crate) fn open_driver(
    format: ArchiveFormat,
    source: &ByteSource,
) -> Result<Box<dyn ArchiveDriver>, ArchiveError> {
    match format {
        ArchiveFormat::Zip => Ok(Box::new(zip::ZipDriver::open(source)?)),
        ArchiveFormat::Tar | ArchiveFormat::TarGz | ArchiveFormat::TarBz2 => {
            Ok(Box::new(tar::TarDriver::open(source, format)?))
        }
        ArchiveFormat::SevenZ => Ok(Box::new(sevenz::SevenZDriver::open(source)?)),
        ArchiveFormat::Rar => Err(ArchiveError::CannotOpen {
            name: source.name().to_string(),
            reason: "no driver for rar archives".to_string(),
        }),
    }
}

/// Read an entry stream, failing once more than `cap` bytes come out
pub(crate) fn read_capped<R: Read>(
    reader: R,
    entry: &str,
    cap: u64,
    size_hint: u64,
) -> Result<Vec<u8>, ArchiveError> {
    let capacity = usize::try_from(size_hint.min(cap)).unwrap_or(0);
    let mut contents = Vec::with_capacity(capacity);
    reader.take(cap.saturating_add(1)).read_to_end(&mut contents)?;
    if contents.len() as u64 > cap {
        return Err(ArchiveError::EntryTooLarge {
            entry: entry.to_string(),
            budget: cap,
        });
    }
    Ok(contents)
}
