//! Archive formats, their signatures and the container mime-type table

use crate::source::ByteSource;
use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Read};
use std::sync::OnceLock;

/// Bytes needed to see a tar header behind any compression layer
const TAR_HEADER_LEN: usize = 512;
const USTAR_OFFSET: usize = 257;
const USTAR_MAGIC: &[u8] = b"ustar";

/// Leading bytes read from a source for signature detection
pub const SNIFF_LEN: usize = 1024;

/// Archive formats known to the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    /// PKZIP
    Zip,
    /// Uncompressed tar
    Tar,
    /// Gzip-compressed tar
    TarGz,
    /// Bzip2-compressed tar
    TarBz2,
    /// 7-Zip
    SevenZ,
    /// RAR (recognised, no driver)
    Rar,
}

/// Whether the archive backend can open a format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    /// Format can be opened and listed
    Supported,
    /// Format is recognised but cannot be read
    Unsupported,
}

impl ArchiveFormat {
    /// Every known format, in table order
    pub const ALL: [Self; 6] = [
        Self::Zip,
        Self::Tar,
        Self::TarGz,
        Self::TarBz2,
        Self::SevenZ,
        Self::Rar,
    ];

    /// Mime-types a file of this format may be declared as
    #[must_use]
    pub const fn mime_types(self) -> &'static [&'static str] {
        match self {
            Self::Zip => &["application/zip", "application/x-zip-compressed", "multipart/x-zip"],
            Self::Tar => &["application/x-tar", "application/x-gtar"],
            Self::TarGz => &[
                "application/gzip",
                "application/x-gzip",
                "application/x-compressed-tar",
                "application/x-tgz",
            ],
            Self::TarBz2 => &[
                "application/x-bzip2",
                "application/x-bzip-compressed-tar",
                "application/x-bzip",
            ],
            Self::SevenZ => &["application/x-7z-compressed"],
            Self::Rar => &["application/x-rar-compressed", "application/vnd.rar", "application/x-rar"],
        }
    }

    /// Status of the builtin driver for this format
    #[must_use]
    pub const fn driver_status(self) -> DriverStatus {
        match self {
            Self::Rar => DriverStatus::Unsupported,
            _ => DriverStatus::Supported,
        }
    }

    /// Identify the archive format from its leading bytes
    ///
    /// Compressed streams are only accepted when a tar header follows, so a
    /// single gzipped document is not mistaken for an archive.
    #[must_use]
    pub fn detect(head: &[u8]) -> Option<Self> {
        if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
            return Some(Self::Zip);
        }
        if head.starts_with(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]) {
            return Some(Self::SevenZ);
        }
        if head.starts_with(b"Rar!\x1a\x07") {
            return Some(Self::Rar);
        }
        if head.starts_with(&[0x1f, 0x8b]) {
            return is_tar_header(&inflate_head(MultiGzDecoder::new(head))).then_some(Self::TarGz);
        }
        if head.starts_with(b"BZh") {
            return is_tar_header(&inflate_head(BzDecoder::new(head))).then_some(Self::TarBz2);
        }
        is_tar_header(head).then_some(Self::Tar)
    }

    /// Sniff the format of a byte source
    ///
    /// # Errors
    ///
    /// Returns an IO error if the source cannot be read.
    pub fn detect_source(source: &ByteSource) -> io::Result<Option<Self>> {
        Ok(Self::detect(&source.head(SNIFF_LEN)?))
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarBz2 => "tar.bz2",
            Self::SevenZ => "7z",
            Self::Rar => "rar",
        };
        f.write_str(name)
    }
}

fn inflate_head<R: Read>(decoder: R) -> Vec<u8> {
    let mut out = Vec::with_capacity(TAR_HEADER_LEN);
    // A truncated sniff buffer ends the stream early; whatever was inflated is enough
    let _ = decoder.take(TAR_HEADER_LEN as u64).read_to_end(&mut out);
    out
}

fn is_tar_header(block: &[u8]) -> bool {
    block
        .get(USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len())
        .is_some_and(|magic| magic == USTAR_MAGIC)
}

/// Container mime-types, computed once from a format → driver status table
///
/// The default catalog uses the builtin drivers. Tests and embedders can pass
/// their own table to model a backend with fewer capabilities.
#[derive(Debug)]
pub struct FormatCatalog {
    table: Vec<(ArchiveFormat, DriverStatus)>,
    supported: OnceLock<BTreeSet<String>>,
}

impl FormatCatalog {
    /// Catalog over an explicit driver status table
    #[must_use]
    pub fn new(table: Vec<(ArchiveFormat, DriverStatus)>) -> Self {
        Self {
            table,
            supported: OnceLock::new(),
        }
    }

    /// Mime-types of every supported format
    #[must_use]
    pub fn supported_mime_types(&self) -> &BTreeSet<String> {
        self.supported.get_or_init(|| {
            let set: BTreeSet<String> = self
                .table
                .iter()
                .filter(|(_, status)| *status == DriverStatus::Supported)
                .flat_map(|(format, _)| format.mime_types().iter().map(|m| (*m).to_string()))
                .collect();
            debug!("Container mime-types: {} entries", set.len());
            set
        })
    }

    /// Whether a file of this mime-type is recursed into
    #[inline]
    #[must_use]
    pub fn is_container(&self, mime_type: &str) -> bool {
        self.supported_mime_types().contains(mime_type)
    }

    /// The driver status table this catalog was built from
    #[must_use]
    pub fn table(&self) -> &[(ArchiveFormat, DriverStatus)] {
        &self.table
    }
}

impl Default for FormatCatalog {
    fn default() -> Self {
        Self::new(
            ArchiveFormat::ALL
                .iter()
                .map(|format| (*format, format.driver_status()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tar_bytes() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "a/b.txt", &b"hello"[..]).unwrap();
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_detect_signatures() {
        assert_eq!(ArchiveFormat::detect(b"PK\x03\x04rest"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::detect(b"PK\x05\x06"), Some(ArchiveFormat::Zip));
        assert_eq!(
            ArchiveFormat::detect(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0, 4]),
            Some(ArchiveFormat::SevenZ)
        );
        assert_eq!(ArchiveFormat::detect(b"Rar!\x1a\x07\x00"), Some(ArchiveFormat::Rar));
        assert_eq!(ArchiveFormat::detect(b"%PDF-1.7"), None);
        assert_eq!(ArchiveFormat::detect(b""), None);
    }

    #[test]
    fn test_detect_tar_layers() {
        let tar = tar_bytes();
        assert_eq!(ArchiveFormat::detect(&tar), Some(ArchiveFormat::Tar));

        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar).unwrap();
        let gz = gz.finish().unwrap();
        assert_eq!(ArchiveFormat::detect(&gz), Some(ArchiveFormat::TarGz));

        let mut bz = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        bz.write_all(&tar).unwrap();
        let bz = bz.finish().unwrap();
        assert_eq!(ArchiveFormat::detect(&bz), Some(ArchiveFormat::TarBz2));
    }

    #[test]
    fn test_plain_gzip_is_not_an_archive() {
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(b"just some text that was gzipped").unwrap();
        let gz = gz.finish().unwrap();
        assert_eq!(ArchiveFormat::detect(&gz), None);
    }

    #[test]
    fn test_catalog_unions_supported_formats() {
        let catalog = FormatCatalog::default();
        assert!(catalog.is_container("application/zip"));
        assert!(catalog.is_container("application/x-7z-compressed"));
        assert!(catalog.is_container("application/x-compressed-tar"));
        assert!(!catalog.is_container("application/vnd.rar"));
        assert!(!catalog.is_container("application/pdf"));
    }

    #[test]
    fn test_catalog_respects_table() {
        let catalog = FormatCatalog::new(vec![
            (ArchiveFormat::Zip, DriverStatus::Unsupported),
            (ArchiveFormat::Tar, DriverStatus::Supported),
        ]);
        assert!(!catalog.is_container("application/zip"));
        assert!(catalog.is_container("application/x-tar"));
        assert_eq!(catalog.supported_mime_types().len(), 2);
        // second call hits the cache
        assert_eq!(catalog.supported_mime_types().len(), 2);
    }
}
