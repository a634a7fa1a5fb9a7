use super::{read_capped, ArchiveDriver};
use crate::error::ArchiveError;
use crate::format::ArchiveFormat;
use crate::path::sanitize_path;
use crate::source::ByteSource;
use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use log::{debug, warn};
use std::collections::HashSet;
use std::io::{self, Read};
use tar::{Archive, EntryType};

/// Tar blocks are 512 bytes; entry data is padded to a whole block
const BLOCK: u64 = 512;

/// Tar streams have no index: a pass decompresses the source and walks the
/// headers from the start. Reads in listing order continue one pass from
/// where the previous read stopped.
pub(crate) struct TarDriver {
    source: ByteSource,
    format: ArchiveFormat,
    listing: Option<Vec<String>>,
    cursor: Option<Cursor>,
    passes: usize,
}

/// A decompressed stream stopped on a header boundary
struct Cursor {
    stream: Box<dyn Read + Send>,
    /// Paths already passed, in or before the last entry read
    passed: HashSet<String>,
}

impl TarDriver {
    pub(crate) fn open(source: &ByteSource, format: ArchiveFormat) -> Result<Self, ArchiveError> {
        let mut driver = Self {
            source: source.clone(),
            format,
            listing: None,
            cursor: None,
            passes: 0,
        };
        // Fail early on a stream that does not even have a first header
        let mut archive = driver.archive()?;
        archive
            .entries()
            .and_then(|mut entries| entries.next().transpose())
            .map_err(|e| driver.corrupt(&e))?;
        Ok(driver)
    }

    /// Decompressed stream from the start of the source
    fn stream(&mut self) -> Result<Box<dyn Read + Send>, ArchiveError> {
        self.passes += 1;
        debug!("Decompressing {} from the start (pass {})", self.source.name(), self.passes);
        let reader = self.source.reader()?;
        Ok(match self.format {
            ArchiveFormat::TarGz => Box::new(MultiGzDecoder::new(reader)),
            ArchiveFormat::TarBz2 => Box::new(BzDecoder::new(reader)),
            _ => Box::new(reader),
        })
    }

    fn archive(&mut self) -> Result<Archive<Box<dyn Read + Send>>, ArchiveError> {
        Ok(Archive::new(self.stream()?))
    }

    /// Decompression passes started so far
    #[cfg(test)]
    fn passes(&self) -> usize {
        self.passes
    }

    fn corrupt(&self, err: &io::Error) -> ArchiveError {
        ArchiveError::Corrupt {
            name: self.source.name().to_string(),
            reason: err.to_string(),
        }
    }

    /// Walk the headers, calling `visit` with each regular file; stops when
    /// `visit` returns `false`
    fn scan<F>(&mut self, mut visit: F) -> Result<(), ArchiveError>
    where
        F: FnMut(String, u64, &mut dyn Read) -> Result<bool, ArchiveError>,
    {
        let mut archive = self.archive()?;
        let mut seen = HashSet::new();
        for entry in archive.entries().map_err(|e| self.corrupt(&e))? {
            let mut entry = entry.map_err(|e| self.corrupt(&e))?;
            if !matches!(
                entry.header().entry_type(),
                EntryType::Regular | EntryType::Continuous
            ) {
                continue;
            }
            let raw_name = entry
                .path()
                .map(|p| p.to_string_lossy().into_owned())
                .map_err(|e| self.corrupt(&e))?;
            let Some(path) = sanitize_path(&raw_name) else {
                warn!("Skipping invalid path in {}: {raw_name}", self.source.name());
                continue;
            };
            if !seen.insert(path.clone()) {
                continue;
            }
            let size = entry.size();
            if !visit(path, size, &mut entry)? {
                break;
            }
        }
        Ok(())
    }
}

impl ArchiveDriver for TarDriver {
    fn uncompressed_size(&mut self, cutoff: u64) -> Result<u64, ArchiveError> {
        let mut total: u64 = 0;
        let mut paths = Vec::new();
        let mut complete = true;
        self.scan(|path, size, _| {
            total = total.saturating_add(size);
            paths.push(path);
            if total > cutoff {
                complete = false;
                return Ok(false);
            }
            Ok(true)
        })?;
        if complete {
            self.listing = Some(paths);
        }
        Ok(total)
    }

    fn entries(&mut self) -> Result<Vec<String>, ArchiveError> {
        if let Some(listing) = &self.listing {
            return Ok(listing.clone());
        }
        let mut paths = Vec::new();
        self.scan(|path, _, _| {
            paths.push(path);
            Ok(true)
        })?;
        self.listing = Some(paths.clone());
        Ok(paths)
    }

    fn read_entry(&mut self, path: &str, cap: u64) -> Result<Option<Vec<u8>>, ArchiveError> {
        if self.listing.is_none() {
            self.entries()?;
        }
        let listed = self
            .listing
            .as_ref()
            .is_some_and(|listing| listing.iter().any(|entry| entry == path));
        if !listed {
            return Ok(None);
        }
        let mut cursor = match self.cursor.take() {
            Some(cursor) if !cursor.passed.contains(path) => cursor,
            _ => Cursor {
                stream: self.stream()?,
                passed: HashSet::new(),
            },
        };
        let found = self.advance(&mut cursor, path, cap)?;
        // Only a cursor that stopped right after the entry can be resumed
        if found.is_some() {
            self.cursor = Some(cursor);
        }
        Ok(found)
    }
}

impl TarDriver {
    /// Read forward from `cursor` to `path`, leaving the stream on the next
    /// header
    fn advance(
        &self,
        cursor: &mut Cursor,
        path: &str,
        cap: u64,
    ) -> Result<Option<Vec<u8>>, ArchiveError> {
        let Cursor { stream, passed } = cursor;
        let mut found = None;
        {
            let mut archive = Archive::new(&mut *stream);
            for entry in archive.entries().map_err(|e| self.corrupt(&e))? {
                let mut entry = entry.map_err(|e| self.corrupt(&e))?;
                if !matches!(
                    entry.header().entry_type(),
                    EntryType::Regular | EntryType::Continuous
                ) {
                    continue;
                }
                let raw_name = entry
                    .path()
                    .map(|p| p.to_string_lossy().into_owned())
                    .map_err(|e| self.corrupt(&e))?;
                let Some(candidate) = sanitize_path(&raw_name) else {
                    continue;
                };
                if !passed.insert(candidate.clone()) || candidate != path {
                    continue;
                }
                let size = entry.size();
                found = Some((read_capped(&mut entry, path, cap, size)?, size));
                break;
            }
        }
        let Some((contents, size)) = found else {
            return Ok(None);
        };
        let padding = size.next_multiple_of(BLOCK) - size;
        io::copy(&mut stream.take(padding), &mut io::sink()).map_err(|e| self.corrupt(&e))?;
        Ok(Some(contents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tar_bytes(count: usize) -> Vec<u8> {
        let mut builder = ::tar::Builder::new(Vec::new());
        for i in 0..count {
            let data = format!("entry {i} ").repeat(i + 1);
            let mut header = ::tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("docs/{i:02}.txt"), data.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use std::io::Write;
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_sequential_reads_share_one_pass() {
        for (format, data) in [
            (ArchiveFormat::Tar, tar_bytes(20)),
            (ArchiveFormat::TarGz, gzip(&tar_bytes(20))),
        ] {
            let source = ByteSource::memory("docs.tar", data);
            let mut driver = TarDriver::open(&source, format).unwrap();
            driver.uncompressed_size(u64::MAX).unwrap();
            let entries = driver.entries().unwrap();
            assert_eq!(entries.len(), 20);
            let before = driver.passes();

            for (i, entry) in entries.iter().enumerate() {
                let contents = driver.read_entry(entry, u64::MAX).unwrap().unwrap();
                assert_eq!(contents, format!("entry {i} ").repeat(i + 1).into_bytes());
            }
            assert_eq!(driver.passes(), before + 1, "{format}");
        }
    }

    #[test]
    fn test_reading_backwards_restarts() {
        let source = ByteSource::memory("docs.tar", tar_bytes(3));
        let mut driver = TarDriver::open(&source, ArchiveFormat::Tar).unwrap();
        let entries = driver.entries().unwrap();
        let before = driver.passes();

        assert_eq!(driver.read_entry(&entries[2], 1024).unwrap().unwrap(), b"entry 2 entry 2 entry 2 ");
        assert_eq!(driver.read_entry(&entries[0], 1024).unwrap().unwrap(), b"entry 0 ");
        assert_eq!(driver.read_entry(&entries[1], 1024).unwrap().unwrap(), b"entry 1 entry 1 ");
        assert_eq!(driver.read_entry("docs/missing.txt", 1024).unwrap(), None);
        assert_eq!(driver.passes(), before + 2);
    }
}
