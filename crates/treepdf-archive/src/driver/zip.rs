use super::{read_capped, ArchiveDriver};
use crate::error::ArchiveError;
use crate::path::sanitize_path;
use crate::source::{ByteSource, ReadSeek};
use log::warn;
use std::collections::HashSet;
use zip::result::ZipError;
use zip::ZipArchive;

struct ZipEntry {
    path: String,
    index: usize,
    size: u64,
}

pub(crate) struct ZipDriver {
    name: String,
    archive: ZipArchive<Box<dyn ReadSeek>>,
    index: Vec<ZipEntry>,
}

impl ZipDriver {
    pub(crate) fn open(source: &ByteSource) -> Result<Self, ArchiveError> {
        let name = source.name().to_string();
        let mut archive =
            ZipArchive::new(source.reader()?).map_err(|e| corrupt(&name, &e))?;

        // Central directory only; nothing is decompressed here
        let mut index = Vec::with_capacity(archive.len());
        let mut seen = HashSet::new();
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i).map_err(|e| corrupt(&name, &e))?;
            if file.is_dir() {
                continue;
            }
            let raw_name = file.name().to_string();
            let Some(path) = sanitize_path(&raw_name) else {
                warn!("Skipping invalid path in {name}: {raw_name}");
                continue;
            };
            if !seen.insert(path.clone()) {
                warn!("Skipping duplicate entry in {name}: {path}");
                continue;
            }
            index.push(ZipEntry {
                path,
                index: i,
                size: file.size(),
            });
        }

        Ok(Self {
            name,
            archive,
            index,
        })
    }
}

impl ArchiveDriver for ZipDriver {
    fn uncompressed_size(&mut self, cutoff: u64) -> Result<u64, ArchiveError> {
        let mut total: u64 = 0;
        for entry in &self.index {
            total = total.saturating_add(entry.size);
            if total > cutoff {
                break;
            }
        }
        Ok(total)
    }

    fn entries(&mut self) -> Result<Vec<String>, ArchiveError> {
        Ok(self.index.iter().map(|e| e.path.clone()).collect())
    }

    fn read_entry(&mut self, path: &str, cap: u64) -> Result<Option<Vec<u8>>, ArchiveError> {
        let Some(entry) = self.index.iter().find(|e| e.path == path) else {
            return Ok(None);
        };
        let file = match self.archive.by_index(entry.index) {
            Ok(file) => file,
            Err(ZipError::UnsupportedArchive(msg)) if msg.contains("assword") => {
                return Err(ArchiveError::PasswordProtected {
                    entry: path.to_string(),
                })
            }
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(corrupt(&self.name, &e)),
        };
        if file.encrypted() {
            return Err(ArchiveError::PasswordProtected {
                entry: path.to_string(),
            });
        }
        let size = entry.size;
        read_capped(file, path, cap, size).map(Some)
    }
}

fn corrupt(name: &str, err: &ZipError) -> ArchiveError {
    ArchiveError::Corrupt {
        name: name.to_string(),
        reason: err.to_string(),
    }
}
