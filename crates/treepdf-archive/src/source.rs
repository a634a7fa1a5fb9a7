//! Byte sources an archive can be opened from

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reader type handed to the archive drivers
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Where the archive bytes live
#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceData {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

/// A named, re-readable byte source
///
/// Files on the local filesystem are reopened for every pass; nested archives
/// extracted from another archive are kept in memory and shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteSource {
    name: String,
    data: SourceData,
}

impl ByteSource {
    /// Source backed by a local file; the name is the path as given
    #[must_use = "creating a source that is not opened is a waste of resources"]
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        Self {
            name: path.display().to_string(),
            data: SourceData::File(path.to_path_buf()),
        }
    }

    /// Source backed by bytes already in memory
    #[must_use = "creating a source that is not opened is a waste of resources"]
    pub fn memory<S: Into<String>, B: Into<Arc<[u8]>>>(name: S, bytes: B) -> Self {
        Self {
            name: name.into(),
            data: SourceData::Memory(bytes.into()),
        }
    }

    /// Replace the logical name used in messages
    #[must_use]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Logical name of the source
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total length in bytes
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file metadata cannot be read.
    pub fn len(&self) -> io::Result<u64> {
        match &self.data {
            SourceData::File(path) => Ok(std::fs::metadata(path)?.len()),
            SourceData::Memory(bytes) => Ok(bytes.len() as u64),
        }
    }

    /// Whether the source holds no bytes
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file metadata cannot be read.
    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Open a fresh reader positioned at the start
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be opened.
    pub fn reader(&self) -> io::Result<Box<dyn ReadSeek>> {
        match &self.data {
            SourceData::File(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            SourceData::Memory(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
        }
    }

    /// Read up to `len` leading bytes for signature sniffing
    ///
    /// # Errors
    ///
    /// Returns an IO error if the source cannot be read.
    pub fn head(&self, len: usize) -> io::Result<Vec<u8>> {
        match &self.data {
            SourceData::File(path) => {
                let mut head = Vec::with_capacity(len);
                File::open(path)?.take(len as u64).read_to_end(&mut head)?;
                Ok(head)
            }
            SourceData::Memory(bytes) => Ok(bytes[..bytes.len().min(len)].to_vec()),
        }
    }
}
