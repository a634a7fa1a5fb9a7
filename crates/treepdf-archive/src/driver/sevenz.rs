use super::{read_capped, ArchiveDriver};
use crate::error::ArchiveError;
use crate::path::sanitize_path;
use crate::source::{ByteSource, ReadSeek};
use log::{debug, warn};
use sevenz_rust::{Archive, BlockDecoder, Password, SevenZArchiveEntry};
use std::collections::{HashSet, VecDeque};
use std::io::{self, Read};

struct SevenZEntry {
    path: String,
    size: u64,
    /// Position in the archive's file table
    file_index: usize,
}

/// 7z entries live in compressed blocks that decode front to back; a read
/// decodes only the block holding the entry, and in a solid block keeps the
/// entries after it for the reads that usually follow.
pub(crate) struct SevenZDriver {
    name: String,
    source: Box<dyn ReadSeek>,
    archive: Archive,
    password: Vec<u8>,
    index: Vec<SevenZEntry>,
    read_ahead: VecDeque<(String, Vec<u8>)>,
    passes: usize,
}

impl SevenZDriver {
    pub(crate) fn open(source: &ByteSource) -> Result<Self, ArchiveError> {
        let name = source.name().to_string();
        let len = source.len()?;
        let mut reader = source.reader()?;
        // Headers are read with an empty password; encrypted headers fail here
        let password = Password::empty().to_vec();
        let archive = Archive::read(&mut reader, len, &password).map_err(|e| {
            ArchiveError::Corrupt {
                name: name.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut index = Vec::new();
        let mut seen = HashSet::new();
        for (file_index, file) in archive.files.iter().enumerate() {
            if file.is_directory() {
                continue;
            }
            let raw_name = file.name();
            let Some(path) = sanitize_path(raw_name) else {
                warn!("Skipping invalid path in {name}: {raw_name}");
                continue;
            };
            if !seen.insert(path.clone()) {
                continue;
            }
            index.push(SevenZEntry {
                path,
                size: file.size(),
                file_index,
            });
        }

        Ok(Self {
            name,
            source: reader,
            archive,
            password,
            index,
            read_ahead: VecDeque::new(),
            passes: 0,
        })
    }

    /// Blocks decoded so far
    #[cfg(test)]
    fn passes(&self) -> usize {
        self.passes
    }

    /// An entry decoded ahead of time, dropping those queued before it
    fn take_read_ahead(&mut self, path: &str) -> Option<Vec<u8>> {
        let position = self.read_ahead.iter().position(|(queued, _)| queued == path)?;
        self.read_ahead.drain(..position);
        self.read_ahead.pop_front().map(|(_, contents)| contents)
    }

    fn password_error(&self, path: &str, message: &str) -> Option<ArchiveError> {
        is_password_error(message).then(|| ArchiveError::PasswordProtected {
            entry: path.to_string(),
        })
    }
}

impl ArchiveDriver for SevenZDriver {
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
        let Some(wanted) = self.index.iter().position(|e| e.path == path) else {
            return Ok(None);
        };
        if let Some(contents) = self.take_read_ahead(path) {
            if contents.len() as u64 > cap {
                return Err(ArchiveError::EntryTooLarge {
                    entry: path.to_string(),
                    budget: cap,
                });
            }
            return Ok(Some(contents));
        }
        self.read_ahead.clear();

        let file_index = self.index[wanted].file_index;
        let Some(block) = self.archive.stream_map.file_folder_index[file_index] else {
            // Empty files have no stream
            return Ok(Some(Vec::new()));
        };
        self.passes += 1;
        debug!("Decoding block {block} of {} for {path} (pass {})", self.name, self.passes);

        // Entries before the wanted one are drained, those after it are kept
        // while they fit in what is left of the budget
        let index = &self.index;
        let mut next = self.archive.stream_map.folder_first_file_index[block];
        let mut found: Option<Result<Vec<u8>, ArchiveError>> = None;
        let mut spare = 0u64;
        let mut read_ahead = VecDeque::new();
        let decoder = BlockDecoder::new(block, &self.archive, &self.password, &mut self.source);
        let walk = decoder.for_each_entries(&mut |_: &SevenZArchiveEntry, reader: &mut dyn Read| {
            let current = next;
            next += 1;
            let listed = index.iter().find(|e| e.file_index == current);
            match (listed, found.is_some()) {
                (Some(entry), false) if entry.file_index == file_index => {
                    let contents = read_capped(reader, path, cap, entry.size);
                    if let Ok(bytes) = &contents {
                        spare = cap - bytes.len() as u64;
                    }
                    let keep_going = contents.is_ok();
                    found = Some(contents);
                    Ok(keep_going)
                }
                (Some(entry), true) => {
                    if entry.size > spare {
                        return Ok(false);
                    }
                    match read_capped(reader, &entry.path, spare, entry.size) {
                        Ok(bytes) => {
                            spare -= bytes.len() as u64;
                            read_ahead.push_back((entry.path.clone(), bytes));
                            Ok(true)
                        }
                        Err(_) => Ok(false),
                    }
                }
                _ => {
                    io::copy(reader, &mut io::sink())?;
                    Ok(true)
                }
            }
        });

        match (found, walk) {
            (Some(Err(ArchiveError::Io(e))), _) => {
                Err(self.password_error(path, &e.to_string()).unwrap_or(ArchiveError::Io(e)))
            }
            (Some(Ok(contents)), _) => {
                self.read_ahead = read_ahead;
                Ok(Some(contents))
            }
            (Some(Err(e)), _) => Err(e),
            (None, Ok(_)) => Ok(None),
            (None, Err(e)) => {
                let message = e.to_string();
                Err(self
                    .password_error(path, &message)
                    .unwrap_or_else(|| ArchiveError::Corrupt {
                        name: self.name.clone(),
                        reason: message,
                    }))
            }
        }
    }
}

fn is_password_error(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("password") || message.contains("encrypted")
}
