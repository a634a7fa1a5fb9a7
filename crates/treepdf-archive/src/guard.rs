//! The archive guard: one bounded archive session at a time

use crate::driver::{open_driver, ArchiveDriver};
use crate::error::ArchiveError;
use crate::format::{ArchiveFormat, DriverStatus};
use crate::path::{folder_name, top_level_folder};
use crate::source::ByteSource;
use crate::BOMB_LIMIT;
use log::{debug, warn};

/// The two size ceilings applied when opening an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchiveLimits {
    /// Operator-configured limit; `None` means unlimited
    pub soft: Option<u64>,
    /// Hard limit, never above [`BOMB_LIMIT`]
    bomb: u64,
}

impl ArchiveLimits {
    /// Limits with the given soft limit and the fixed bomb limit
    #[must_use]
    pub const fn new(soft: Option<u64>) -> Self {
        Self {
            soft,
            bomb: BOMB_LIMIT,
        }
    }

    /// Lower the bomb limit. Values above [`BOMB_LIMIT`] are clamped.
    #[must_use]
    pub const fn with_bomb_limit(mut self, bomb: u64) -> Self {
        self.bomb = if bomb < BOMB_LIMIT { bomb } else { BOMB_LIMIT };
        self
    }

    /// Hard limit in effect
    #[inline]
    #[must_use]
    pub const fn bomb(&self) -> u64 {
        self.bomb
    }

    /// Soft limit after applying an optional per-call override
    #[inline]
    #[must_use]
    pub fn effective_soft(&self, size_override: Option<u64>) -> Option<u64> {
        size_override.or(self.soft)
    }

    /// Largest number of bytes that may be read out of one archive
    #[inline]
    #[must_use]
    pub fn ceiling(&self, size_override: Option<u64>) -> u64 {
        self.effective_soft(size_override)
            .map_or(self.bomb, |soft| soft.min(self.bomb))
    }

    /// What is left of both limits once `extracted` bytes have been read
    ///
    /// Nested archives are opened with the remainder, so one walk through
    /// archives inside archives never reads more than [`ceiling`](Self::ceiling).
    #[must_use]
    pub fn remaining(&self, extracted: u64) -> Self {
        Self {
            soft: self.soft.map(|soft| soft.saturating_sub(extracted)),
            bomb: self.bomb.saturating_sub(extracted),
        }
    }
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self::new(None)
    }
}

/// State of the current archive
struct OpenArchive {
    name: String,
    format: ArchiveFormat,
    driver: Box<dyn ArchiveDriver>,
    uncompressed_size: u64,
    ceiling: u64,
    consumed: u64,
    entries: Option<Vec<String>>,
}

/// Opens archives behind the soft and bomb ceilings
///
/// At most one archive is current; opening another replaces it and every
/// operation on a closed guard fails with [`ArchiveError::NotOpen`]. The
/// backend handle is released on `close`, on a failed open and on drop.
pub struct ArchiveGuard {
    limits: ArchiveLimits,
    current: Option<OpenArchive>,
}

impl ArchiveGuard {
    /// Create a guard with no current archive
    #[must_use]
    pub const fn new(limits: ArchiveLimits) -> Self {
        Self {
            limits,
            current: None,
        }
    }

    /// Configured soft limit
    #[inline]
    #[must_use]
    pub const fn size_limit(&self) -> Option<u64> {
        self.limits.soft
    }

    /// Replace the soft limit used by later `open` calls
    pub fn set_size_limit(&mut self, limit: Option<u64>) {
        self.limits.soft = limit;
    }

    /// Limits applied by this guard
    #[inline]
    #[must_use]
    pub const fn limits(&self) -> ArchiveLimits {
        self.limits
    }

    /// Whether the source looks like an archive with a working driver
    ///
    /// Only the leading bytes are read.
    #[must_use]
    pub fn can_open(&self, source: &ByteSource) -> bool {
        match ArchiveFormat::detect_source(source) {
            Ok(Some(format)) => format.driver_status() == DriverStatus::Supported,
            Ok(None) => false,
            Err(e) => {
                debug!("Cannot sniff {}: {e}", source.name());
                false
            }
        }
    }

    /// Open an archive, replacing the current one
    ///
    /// The soft limit is `size_override` if given, else the configured one.
    /// It is checked before the bomb limit, which always applies.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::CannotOpen`] if the format is unknown or unsupported
    ///   or the backend fails to open it
    /// - [`ArchiveError::TooLarge`] if the uncompressed size exceeds the soft limit
    /// - [`ArchiveError::BombDetected`] if it exceeds the bomb limit
    ///
    /// On error no archive is current.
    pub fn open(
        &mut self,
        source: &ByteSource,
        size_override: Option<u64>,
    ) -> Result<(), ArchiveError> {
        self.close();
        let name = source.name().to_string();
        let cannot_open = |reason: String| ArchiveError::CannotOpen {
            name: name.clone(),
            reason,
        };

        let format = ArchiveFormat::detect_source(source)
            .map_err(|e| cannot_open(e.to_string()))?
            .ok_or_else(|| cannot_open("not a recognised archive".to_string()))?;
        if format.driver_status() != DriverStatus::Supported {
            return Err(cannot_open(format!("{format} archives are not supported")));
        }
        let mut driver = open_driver(format, source).map_err(|e| match e {
            ArchiveError::CannotOpen { .. } => e,
            other => cannot_open(other.to_string()),
        })?;

        let soft = self.limits.effective_soft(size_override);
        let bomb = self.limits.bomb;
        let cutoff = soft.unwrap_or(bomb);
        let size = driver
            .uncompressed_size(cutoff)
            .map_err(|e| cannot_open(e.to_string()))?;

        if let Some(limit) = soft {
            if size > limit {
                warn!("Archive {name} exceeds the size limit ({size} > {limit})");
                return Err(ArchiveError::TooLarge { name, size, limit });
            }
        }
        if size > bomb {
            warn!("Archive {name} exceeds the bomb limit ({size} > {bomb})");
            return Err(ArchiveError::BombDetected {
                name,
                size,
                limit: bomb,
            });
        }

        debug!("Opened {format} archive {name}, {size} bytes uncompressed");
        self.current = Some(OpenArchive {
            name,
            format,
            driver,
            uncompressed_size: size,
            ceiling: self.limits.ceiling(size_override),
            consumed: 0,
            entries: None,
        });
        Ok(())
    }

    /// Whether an archive is current
    #[inline]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.current.is_some()
    }

    fn current(&mut self) -> Result<&mut OpenArchive, ArchiveError> {
        self.current.as_mut().ok_or(ArchiveError::NotOpen)
    }

    /// Name of the current archive
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotOpen`] without a current archive.
    pub fn name(&self) -> Result<&str, ArchiveError> {
        self.current
            .as_ref()
            .map(|a| a.name.as_str())
            .ok_or(ArchiveError::NotOpen)
    }

    /// Format of the current archive
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotOpen`] without a current archive.
    pub fn format(&self) -> Result<ArchiveFormat, ArchiveError> {
        self.current
            .as_ref()
            .map(|a| a.format)
            .ok_or(ArchiveError::NotOpen)
    }

    /// Measured uncompressed size of the current archive
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotOpen`] without a current archive.
    pub fn uncompressed_size(&self) -> Result<u64, ArchiveError> {
        self.current
            .as_ref()
            .map(|a| a.uncompressed_size)
            .ok_or(ArchiveError::NotOpen)
    }

    /// Entry paths of the current archive in archive order
    ///
    /// The listing is built on first use and cached for the session.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotOpen`] without a current archive, or the
    /// backend error if the listing fails.
    pub fn entries(&mut self) -> Result<&[String], ArchiveError> {
        let archive = self.current()?;
        if archive.entries.is_none() {
            archive.entries = Some(archive.driver.entries()?);
        }
        Ok(archive.entries.as_deref().unwrap_or_default())
    }

    /// Read one entry; `Ok(None)` when the path is not in the archive
    ///
    /// Reads draw on a budget equal to the effective ceiling, shared by all
    /// reads of the current archive.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotOpen`] without a current archive,
    /// [`ArchiveError::EntryTooLarge`] if the budget is exhausted, or the
    /// backend error.
    pub fn read_entry(&mut self, path: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        let archive = self.current()?;
        let budget = archive.ceiling.saturating_sub(archive.consumed);
        let contents = archive.driver.read_entry(path, budget)?;
        if let Some(bytes) = &contents {
            archive.consumed = archive.consumed.saturating_add(bytes.len() as u64);
        }
        Ok(contents)
    }

    /// Count bytes extracted on behalf of the current archive elsewhere,
    /// such as the contents of an archive nested in it
    ///
    /// Later reads get a correspondingly smaller budget. Does nothing when
    /// no archive is open.
    pub fn charge(&mut self, bytes: u64) {
        if let Some(archive) = self.current.as_mut() {
            archive.consumed = archive.consumed.saturating_add(bytes);
        }
    }

    /// Folder shared by all entries, if any
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotOpen`] without a current archive.
    pub fn top_level_folder(&mut self) -> Result<Option<String>, ArchiveError> {
        let entries = self.entries()?;
        Ok(top_level_folder(entries.iter().map(String::as_str)))
    }

    /// Folder name proposed for extracting the current archive
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotOpen`] without a current archive.
    pub fn folder_name(&self) -> Result<String, ArchiveError> {
        self.name().map(folder_name)
    }

    /// Release the current archive. Does nothing when none is open.
    pub fn close(&mut self) {
        if let Some(archive) = self.current.take() {
            debug!("Closed archive {}", archive.name);
        }
    }
}

impl Default for ArchiveGuard {
    fn default() -> Self {
        Self::new(ArchiveLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn zip_of_size(size: usize) -> ByteSource {
        ByteSource::memory("blob.zip", zip_bytes(&[("blob.bin", &vec![0u8; size])]))
    }

    #[test]
    fn test_open_list_read() {
        let source = ByteSource::memory(
            "photos.zip",
            zip_bytes(&[("photos/a.txt", b"alpha"), ("photos/b/c.txt", b"gamma")]),
        );
        let mut guard = ArchiveGuard::default();
        assert!(guard.can_open(&source));
        guard.open(&source, None).unwrap();

        assert_eq!(guard.format().unwrap(), ArchiveFormat::Zip);
        assert_eq!(guard.uncompressed_size().unwrap(), 10);
        assert_eq!(guard.entries().unwrap(), ["photos/a.txt", "photos/b/c.txt"]);
        assert_eq!(guard.read_entry("photos/a.txt").unwrap().unwrap(), b"alpha");
        assert_eq!(guard.read_entry("missing.txt").unwrap(), None);
        assert_eq!(guard.top_level_folder().unwrap().as_deref(), Some("photos"));
        assert_eq!(guard.folder_name().unwrap(), "photos");
    }

    #[test]
    fn test_not_open() {
        let mut guard = ArchiveGuard::default();
        assert!(matches!(guard.entries(), Err(ArchiveError::NotOpen)));
        assert!(matches!(guard.read_entry("a"), Err(ArchiveError::NotOpen)));
        assert!(matches!(guard.top_level_folder(), Err(ArchiveError::NotOpen)));

        guard.open(&zip_of_size(3), None).unwrap();
        guard.close();
        guard.close();
        assert!(!guard.is_open());
        assert!(matches!(guard.entries(), Err(ArchiveError::NotOpen)));
    }

    #[test]
    fn test_cannot_open_non_archive() {
        let mut guard = ArchiveGuard::default();
        let source = ByteSource::memory("notes.txt", b"plain text".to_vec());
        assert!(!guard.can_open(&source));
        let err = guard.open(&source, None).unwrap_err();
        assert!(matches!(err, ArchiveError::CannotOpen { .. }), "got {err:?}");
        assert!(!guard.is_open());
    }

    #[test]
    fn test_cannot_open_truncated_zip() {
        let mut bytes = zip_bytes(&[("a.txt", b"alpha")]);
        bytes.truncate(10);
        let mut guard = ArchiveGuard::default();
        let err = guard.open(&ByteSource::memory("broken.zip", bytes), None).unwrap_err();
        assert!(matches!(err, ArchiveError::CannotOpen { .. }), "got {err:?}");
    }

    #[test]
    fn test_rar_cannot_open() {
        let mut guard = ArchiveGuard::default();
        let source = ByteSource::memory("x.rar", b"Rar!\x1a\x07\x00\xcf\x90".to_vec());
        assert!(!guard.can_open(&source));
        assert!(matches!(
            guard.open(&source, None),
            Err(ArchiveError::CannotOpen { .. })
        ));
    }

    #[test]
    fn test_soft_limit_checked_before_bomb() {
        let limits = ArchiveLimits::new(Some(50)).with_bomb_limit(10);
        let mut guard = ArchiveGuard::new(limits);
        let err = guard.open(&zip_of_size(100), None).unwrap_err();
        assert!(matches!(err, ArchiveError::TooLarge { limit: 50, .. }), "got {err:?}");
        assert!(!guard.is_open());
    }

    #[test]
    fn test_bomb_enforced_without_soft_limit() {
        let mut guard = ArchiveGuard::new(ArchiveLimits::new(None).with_bomb_limit(64));
        let err = guard.open(&zip_of_size(100), None).unwrap_err();
        assert!(matches!(err, ArchiveError::BombDetected { limit: 64, .. }), "got {err:?}");
    }

    #[test]
    fn test_bomb_enforced_under_soft_limit() {
        let mut guard = ArchiveGuard::new(ArchiveLimits::new(Some(1000)).with_bomb_limit(64));
        let err = guard.open(&zip_of_size(100), None).unwrap_err();
        assert!(matches!(err, ArchiveError::BombDetected { .. }), "got {err:?}");
    }

    #[test]
    fn test_override_replaces_configured_limit() {
        let mut guard = ArchiveGuard::new(ArchiveLimits::new(Some(10)));
        assert!(guard.open(&zip_of_size(100), Some(200)).is_ok());
        assert!(matches!(
            guard.open(&zip_of_size(100), None),
            Err(ArchiveError::TooLarge { .. })
        ));

        guard.set_size_limit(None);
        assert_eq!(guard.size_limit(), None);
        assert!(guard.open(&zip_of_size(100), None).is_ok());
    }

    #[test]
    fn test_failed_open_replaces_current() {
        let mut guard = ArchiveGuard::new(ArchiveLimits::new(Some(50)));
        guard.open(&zip_of_size(10), None).unwrap();
        assert!(guard.open(&zip_of_size(100), None).is_err());
        assert!(matches!(guard.entries(), Err(ArchiveError::NotOpen)));
    }

    #[test]
    fn test_bomb_limit_never_raised() {
        let limits = ArchiveLimits::new(None).with_bomb_limit(u64::MAX);
        assert_eq!(limits.bomb(), BOMB_LIMIT);
        assert_eq!(limits.ceiling(None), BOMB_LIMIT);
        assert_eq!(limits.ceiling(Some(5)), 5);
    }

    #[test]
    fn test_remaining_limits_shrink_both_ceilings() {
        let limits = ArchiveLimits::new(Some(100)).with_bomb_limit(60);
        let left = limits.remaining(40);
        assert_eq!(left.soft, Some(60));
        assert_eq!(left.bomb(), 20);
        assert_eq!(left.ceiling(None), 20);

        let spent = ArchiveLimits::new(None).with_bomb_limit(60).remaining(500);
        assert_eq!(spent.bomb(), 0);
        let mut guard = ArchiveGuard::new(spent);
        assert!(matches!(
            guard.open(&zip_of_size(1), None),
            Err(ArchiveError::BombDetected { limit: 0, .. })
        ));
    }

    #[test]
    fn test_charge_reduces_read_budget() {
        let source = ByteSource::memory(
            "pair.zip",
            zip_bytes(&[("a.bin", &[1u8; 30]), ("b.bin", &[2u8; 30])]),
        );
        let mut guard = ArchiveGuard::new(ArchiveLimits::new(Some(64)));
        guard.open(&source, None).unwrap();
        assert_eq!(guard.read_entry("a.bin").unwrap().unwrap().len(), 30);
        guard.charge(20);
        assert!(matches!(
            guard.read_entry("b.bin"),
            Err(ArchiveError::EntryTooLarge { budget: 14, .. })
        ));
    }

    #[test]
    fn test_tar_archive() {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in [("docs/a.txt", &b"one"[..]), ("docs/b.txt", &b"two!"[..])] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, data).unwrap();
        }
        let source = ByteSource::memory("docs.tar", builder.into_inner().unwrap());

        let mut guard = ArchiveGuard::default();
        guard.open(&source, None).unwrap();
        assert_eq!(guard.format().unwrap(), ArchiveFormat::Tar);
        assert_eq!(guard.uncompressed_size().unwrap(), 7);
        assert_eq!(guard.entries().unwrap(), ["docs/a.txt", "docs/b.txt"]);
        assert_eq!(guard.read_entry("docs/b.txt").unwrap().unwrap(), b"two!");
        assert_eq!(guard.read_entry("docs/c.txt").unwrap(), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_too_large_iff_over_soft(size in 0usize..400, limit in 0u64..400) {
            let mut guard = ArchiveGuard::new(ArchiveLimits::new(Some(limit)));
            let result = guard.open(&zip_of_size(size), None);
            if size as u64 > limit {
                let is_too_large = matches!(result, Err(ArchiveError::TooLarge { .. }));
                prop_assert!(is_too_large);
            } else {
                prop_assert!(result.is_ok());
            }
        }
    }
}
