//! Recursive traversal of directories and archives
//!
//! The walk runs in two phases. The first descends depth-first through the
//! starting node and records every leaf, with archive contents read through
//! one [`ArchiveGuard`] per nesting level. All archives of one walk share a
//! single extraction budget: a nested archive is opened with what its
//! ancestors left, so extracted bytes held for the second phase never exceed
//! the ceiling of the limits. The second converts the leaves, optionally in
//! parallel, and keeps the traversal order.
//!
//! Logical paths start with the name of the starting node and pass through
//! archives like directories: `docs/photos.zip/img1.jpg`.

use crate::chain::{ChainOutcome, ConverterChain};
use crate::error::PipelineError;
use crate::report::{Diagnostic, DiagnosticKind};
use log::{debug, warn};
use rayon::prelude::*;
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use treepdf_archive::path::basename;
use treepdf_archive::{
    ArchiveError, ArchiveFormat, ArchiveGuard, ArchiveLimits, ByteSource, DriverStatus,
    FormatCatalog, DEFAULT_MAX_DEPTH,
};
use treepdf_core::mime::{detect_mime_type, SNIFF_LEN};
use treepdf_pdf::{PdfSynthesizer, SourceDocument};

/// Traversal settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// Descend into archives; when off they are converted as leaves
    pub archives: bool,
    /// Size ceilings for every archive opened
    pub limits: ArchiveLimits,
    /// Maximum number of nested archive levels
    pub max_depth: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            archives: true,
            limits: ArchiveLimits::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Where the bytes of a leaf are
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafData {
    /// A file on disk, read when converted
    File(PathBuf),
    /// An archive entry already extracted
    Memory(Arc<[u8]>),
}

impl LeafData {
    fn bytes(&self) -> io::Result<Cow<'_, [u8]>> {
        match self {
            Self::File(path) => fs::read(path).map(Cow::Owned),
            Self::Memory(bytes) => Ok(Cow::Borrowed(bytes)),
        }
    }
}

/// One node found by the first phase, in traversal order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkNode {
    /// A file to hand to the converter chain
    Leaf {
        /// Logical path
        path: String,
        /// Detected mime-type
        mime_type: String,
        /// Content
        data: LeafData,
    },
    /// A branch that failed; an error page takes its place
    Failed(Diagnostic),
    /// A listed entry that could not be read back; dropped from the output
    Skipped(Diagnostic),
}

/// Converted documents in traversal order plus what went wrong
#[derive(Debug, Clone, Default)]
pub struct WalkOutput {
    /// One document per leaf or failed branch
    pub documents: Vec<SourceDocument>,
    /// Problems in traversal order
    pub diagnostics: Vec<Diagnostic>,
}

/// Nodes found so far and bytes extracted from archives to find them
#[derive(Debug, Default)]
struct Collected {
    nodes: Vec<WalkNode>,
    extracted: u64,
}

/// Converted form of one node
enum Converted {
    Document(SourceDocument, Option<Diagnostic>),
    Skipped(Diagnostic),
}

/// Walks a directory or archive and converts what it finds
#[derive(Debug)]
pub struct TreeWalker {
    catalog: FormatCatalog,
    options: WalkOptions,
}

impl TreeWalker {
    /// Walker recognising containers through `catalog`
    #[must_use]
    pub fn new(catalog: FormatCatalog, options: WalkOptions) -> Self {
        Self { catalog, options }
    }

    /// Traversal settings
    #[must_use]
    pub const fn options(&self) -> &WalkOptions {
        &self.options
    }

    /// Walk `root` and convert every leaf through `chain`
    ///
    /// With `jobs > 1` leaves are converted on a thread pool of that size;
    /// the output order is the traversal order either way.
    ///
    /// # Errors
    ///
    /// Fails only if `root` does not exist or cannot be read, or `root` is
    /// an archive that cannot be opened. Every other failure becomes an
    /// error page and a diagnostic.
    pub fn walk(
        &self,
        root: &Path,
        chain: &ConverterChain,
        synth: &PdfSynthesizer,
        jobs: usize,
    ) -> Result<WalkOutput, PipelineError> {
        let nodes = self.collect(root)?;
        debug!("Collected {} nodes under {}", nodes.len(), root.display());

        let convert = |node: WalkNode| convert_node(node, chain, synth);
        let converted: Vec<Converted> = if jobs > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
                Ok(pool) => pool.install(|| nodes.into_par_iter().map(convert).collect()),
                Err(e) => {
                    warn!("Cannot start {jobs} conversion threads, converting sequentially: {e}");
                    nodes.into_iter().map(convert).collect()
                }
            }
        } else {
            nodes.into_iter().map(convert).collect()
        };

        let mut output = WalkOutput::default();
        for item in converted {
            match item {
                Converted::Document(document, diagnostic) => {
                    output.documents.push(document);
                    output.diagnostics.extend(diagnostic);
                }
                Converted::Skipped(diagnostic) => output.diagnostics.push(diagnostic),
            }
        }
        Ok(output)
    }

    /// First phase: every node under `root` in depth-first order
    ///
    /// Directory entries are visited sorted by name; archive entries in
    /// archive order. Symbolic links are not followed.
    ///
    /// # Errors
    ///
    /// Same conditions as [`walk`](Self::walk).
    pub fn collect(&self, root: &Path) -> Result<Vec<WalkNode>, PipelineError> {
        let metadata = fs::metadata(root).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => PipelineError::NotFound(root.to_path_buf()),
            _ => PipelineError::Io {
                path: root.to_path_buf(),
                source,
            },
        })?;
        let name = root
            .file_name()
            .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned());

        let mut found = Collected::default();
        if metadata.is_dir() {
            let entries = read_dir_sorted(root).map_err(|source| PipelineError::Io {
                path: root.to_path_buf(),
                source,
            })?;
            self.visit_entries(&name, entries, &mut found)?;
        } else {
            let source = ByteSource::file(root).with_name(name.clone());
            let head = source.head(SNIFF_LEN).map_err(|source| PipelineError::Io {
                path: root.to_path_buf(),
                source,
            })?;
            self.visit_file(name, source, &head, LeafData::File(root.to_path_buf()), 0, true, &mut found)?;
        }
        debug!("Extracted {} bytes from archives under {}", found.extracted, root.display());
        Ok(found.nodes)
    }

    fn visit_dir(&self, dir: &Path, logical: &str, found: &mut Collected) -> Result<(), PipelineError> {
        match read_dir_sorted(dir) {
            Ok(entries) => self.visit_entries(logical, entries, found),
            Err(e) => {
                warn!("Cannot read directory {}: {e}", dir.display());
                found.nodes.push(WalkNode::Failed(Diagnostic::new(
                    logical,
                    DiagnosticKind::Unreadable,
                    e.to_string(),
                )));
                Ok(())
            }
        }
    }

    fn visit_entries(
        &self,
        logical: &str,
        entries: Vec<(String, PathBuf, fs::FileType)>,
        found: &mut Collected,
    ) -> Result<(), PipelineError> {
        for (name, path, file_type) in entries {
            let child = format!("{logical}/{name}");
            if file_type.is_symlink() {
                debug!("Not following symbolic link {}", path.display());
            } else if file_type.is_dir() {
                self.visit_dir(&path, &child, found)?;
            } else if file_type.is_file() {
                let source = ByteSource::file(&path).with_name(child.clone());
                match source.head(SNIFF_LEN) {
                    Ok(head) => {
                        self.visit_file(child, source, &head, LeafData::File(path), 0, false, found)?;
                    }
                    Err(e) => {
                        warn!("Cannot read {}: {e}", path.display());
                        found.nodes.push(WalkNode::Failed(Diagnostic::new(
                            child,
                            DiagnosticKind::Unreadable,
                            e.to_string(),
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Classify one file: archive to descend into, or leaf
    ///
    /// `depth` counts the archives enclosing the file.
    #[allow(clippy::too_many_arguments)]
    fn visit_file(
        &self,
        logical: String,
        source: ByteSource,
        head: &[u8],
        data: LeafData,
        depth: usize,
        is_root: bool,
        found: &mut Collected,
    ) -> Result<(), PipelineError> {
        let mime_type = detect_mime_type(basename(&logical), head);
        let openable = ArchiveFormat::detect(head)
            .is_some_and(|format| format.driver_status() == DriverStatus::Supported);

        if self.options.archives && self.catalog.is_container(&mime_type) && openable {
            return self.visit_archive(logical, &source, depth, is_root, found);
        }
        found.nodes.push(WalkNode::Leaf {
            path: logical,
            mime_type,
            data,
        });
        Ok(())
    }

    fn visit_archive(
        &self,
        logical: String,
        source: &ByteSource,
        depth: usize,
        is_root: bool,
        found: &mut Collected,
    ) -> Result<(), PipelineError> {
        if depth >= self.options.max_depth {
            warn!("Not descending into {logical}: more than {} nested archives", self.options.max_depth);
            found.nodes.push(WalkNode::Failed(Diagnostic::new(
                logical,
                DiagnosticKind::TooDeep,
                format!("Archive nesting exceeds {} levels", self.options.max_depth),
            )));
            return Ok(());
        }

        let mut guard = ArchiveGuard::new(self.options.limits.remaining(found.extracted));
        let entries = match guard.open(source, None).and_then(|()| guard.entries().map(<[String]>::to_vec)) {
            Ok(entries) => entries,
            Err(e @ ArchiveError::CannotOpen { .. }) if is_root => {
                return Err(PipelineError::CannotOpen(e));
            }
            Err(e) => {
                found.nodes.push(WalkNode::Failed(Diagnostic::new(
                    logical,
                    DiagnosticKind::from_archive_error(&e),
                    e.to_string(),
                )));
                return Ok(());
            }
        };
        debug!("Descending into {logical} ({} entries)", entries.len());

        for entry in entries {
            let child = format!("{logical}/{entry}");
            match guard.read_entry(&entry) {
                Ok(Some(bytes)) => {
                    found.extracted = found.extracted.saturating_add(bytes.len() as u64);
                    let before = found.extracted;
                    let bytes: Arc<[u8]> = bytes.into();
                    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
                    let nested = ByteSource::memory(child.clone(), Arc::clone(&bytes));
                    self.visit_file(
                        child,
                        nested,
                        head,
                        LeafData::Memory(Arc::clone(&bytes)),
                        depth + 1,
                        false,
                        found,
                    )?;
                    // Whatever nested archives extracted comes out of this budget too
                    guard.charge(found.extracted - before);
                }
                Ok(None) => {
                    warn!("Archive entry {child} vanished, skipping it");
                    found.nodes.push(WalkNode::Skipped(Diagnostic::new(
                        child,
                        DiagnosticKind::EntryVanished,
                        "Listed archive entry could not be read back",
                    )));
                }
                Err(e) => {
                    warn!("Cannot extract {child}: {e}");
                    found.nodes.push(WalkNode::Failed(Diagnostic::new(
                        child,
                        DiagnosticKind::from_archive_error(&e),
                        e.to_string(),
                    )));
                }
            }
        }
        guard.close();
        Ok(())
    }
}

/// Directory entries sorted by name
fn read_dir_sorted(dir: &Path) -> io::Result<Vec<(String, PathBuf, fs::FileType)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        entries.push((entry.file_name().to_string_lossy().into_owned(), entry.path(), file_type));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// Second phase for one node
fn convert_node(node: WalkNode, chain: &ConverterChain, synth: &PdfSynthesizer) -> Converted {
    let diagnostic = match node {
        WalkNode::Skipped(diagnostic) => return Converted::Skipped(diagnostic),
        WalkNode::Failed(diagnostic) => diagnostic,
        WalkNode::Leaf {
            path,
            mime_type,
            data,
        } => match data.bytes() {
            Ok(bytes) => match chain.convert(&bytes, &mime_type) {
                ChainOutcome::Converted {
                    converter,
                    pdf,
                    attempts,
                } => {
                    let diagnostic = (!attempts.is_empty()).then(|| Diagnostic {
                        message: format!(
                            "{} converter(s) failed before \"{converter}\" succeeded",
                            attempts.len()
                        ),
                        attempts,
                        ..Diagnostic::new(path.clone(), DiagnosticKind::ConverterFailed, "")
                    });
                    return Converted::Document(SourceDocument::new(path, pdf), diagnostic);
                }
                ChainOutcome::Exhausted { attempts } => {
                    let message = if attempts.is_empty() {
                        format!("No converter is configured for mime-type \"{mime_type}\"")
                    } else {
                        format!("Every converter failed for mime-type \"{mime_type}\"")
                    };
                    Diagnostic {
                        attempts,
                        ..Diagnostic::new(path, DiagnosticKind::ChainExhausted, message)
                    }
                }
            },
            Err(e) => Diagnostic::new(path, DiagnosticKind::Unreadable, e.to_string()),
        },
    };

    let page = synth.error_page(&diagnostic.page_lines());
    Converted::Document(SourceDocument::new(diagnostic.path.clone(), page), Some(diagnostic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn paths(nodes: &[WalkNode]) -> Vec<String> {
        nodes
            .iter()
            .map(|node| match node {
                WalkNode::Leaf { path, .. } => path.clone(),
                WalkNode::Failed(d) => format!("failed:{}:{:?}", d.path, d.kind),
                WalkNode::Skipped(d) => format!("skipped:{}", d.path),
            })
            .collect()
    }

    fn walker(options: WalkOptions) -> TreeWalker {
        TreeWalker::new(FormatCatalog::default(), options)
    }

    #[test]
    fn test_directory_order_is_sorted_depth_first() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("docs");
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("c.txt"), "c").unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("b/inner.txt"), "inner").unwrap();

        let nodes = walker(WalkOptions::default()).collect(&root).unwrap();
        assert_eq!(paths(&nodes), ["docs/a.txt", "docs/b/inner.txt", "docs/c.txt"]);
        assert!(matches!(
            &nodes[0],
            WalkNode::Leaf { mime_type, data: LeafData::File(_), .. } if mime_type == "text/plain"
        ));
    }

    #[test]
    fn test_archive_entries_become_leaves() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("docs");
        fs::create_dir(&root).unwrap();
        let archive = zip_bytes(&[("one.txt", b"1"), ("sub/two.txt", b"2")]);
        fs::write(root.join("bundle.zip"), archive).unwrap();

        let nodes = walker(WalkOptions::default()).collect(&root).unwrap();
        assert_eq!(paths(&nodes), ["docs/bundle.zip/one.txt", "docs/bundle.zip/sub/two.txt"]);
        assert!(matches!(
            &nodes[1],
            WalkNode::Leaf { data: LeafData::Memory(bytes), .. } if bytes.as_ref() == b"2"
        ));
    }

    #[test]
    fn test_archives_disabled_keeps_archive_as_leaf() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle.zip");
        fs::write(&path, zip_bytes(&[("one.txt", b"1")])).unwrap();

        let options = WalkOptions {
            archives: false,
            ..WalkOptions::default()
        };
        let nodes = walker(options).collect(&path).unwrap();
        assert!(matches!(
            &nodes[..],
            [WalkNode::Leaf { path, mime_type, .. }] if path == "bundle.zip" && mime_type == "application/zip"
        ));
    }

    #[test]
    fn test_nesting_beyond_max_depth_fails_branch() {
        let dir = TempDir::new().unwrap();
        let inner = zip_bytes(&[("deep.txt", b"deep")]);
        let outer = zip_bytes(&[("inner.zip", &inner), ("top.txt", b"top")]);
        let path = dir.path().join("outer.zip");
        fs::write(&path, outer).unwrap();

        let options = WalkOptions {
            max_depth: 1,
            ..WalkOptions::default()
        };
        let nodes = walker(options).collect(&path).unwrap();
        assert_eq!(
            paths(&nodes),
            ["failed:outer.zip/inner.zip:TooDeep", "outer.zip/top.txt"]
        );

        let nodes = walker(WalkOptions::default()).collect(&path).unwrap();
        assert_eq!(paths(&nodes), ["outer.zip/inner.zip/deep.txt", "outer.zip/top.txt"]);
    }

    #[test]
    fn test_oversized_nested_archive_fails_branch() {
        let dir = TempDir::new().unwrap();
        let big = vec![b'x'; 4096];
        let inner = zip_bytes(&[("big.txt", &big)]);
        let outer = zip_bytes(&[("inner.zip", &inner), ("small.txt", b"s")]);
        let path = dir.path().join("outer.zip");
        fs::write(&path, outer).unwrap();

        let nodes = walker(WalkOptions::default()).collect(&path).unwrap();
        assert_eq!(paths(&nodes), ["outer.zip/inner.zip/big.txt", "outer.zip/small.txt"]);

        // The outer archive only holds the compressed inner one
        let options = WalkOptions {
            limits: ArchiveLimits::new(Some(1024)),
            ..WalkOptions::default()
        };
        let nodes = walker(options).collect(&path).unwrap();
        assert_eq!(
            paths(&nodes),
            ["failed:outer.zip/inner.zip:TooLarge", "outer.zip/small.txt"]
        );

        let options = WalkOptions {
            limits: ArchiveLimits::new(None).with_bomb_limit(1024),
            ..WalkOptions::default()
        };
        let nodes = walker(options).collect(&path).unwrap();
        assert_eq!(
            paths(&nodes),
            ["failed:outer.zip/inner.zip:BombDetected", "outer.zip/small.txt"]
        );
    }

    #[test]
    fn test_nested_archives_share_one_extraction_budget() {
        let dir = TempDir::new().unwrap();
        let zeros = vec![0u8; 20 * 1024];
        let inner = zip_bytes(&[("zeros.bin", &zeros)]);
        let names: Vec<String> = (0..10).map(|i| format!("inner{i}.zip")).collect();
        let entries: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), &inner[..])).collect();
        let path = dir.path().join("outer.zip");
        fs::write(&path, zip_bytes(&entries)).unwrap();

        // Every inner archive fits the limit on its own, all ten do not
        let bomb = 64 * 1024;
        let options = WalkOptions {
            limits: ArchiveLimits::new(None).with_bomb_limit(bomb),
            ..WalkOptions::default()
        };
        let nodes = walker(options).collect(&path).unwrap();

        let held: usize = nodes
            .iter()
            .map(|node| match node {
                WalkNode::Leaf { data: LeafData::Memory(bytes), .. } => bytes.len(),
                _ => 0,
            })
            .sum();
        assert!(held as u64 <= bomb, "held {held} bytes");

        let listed = paths(&nodes);
        assert_eq!(listed.len(), 10);
        assert_eq!(listed[0], "outer.zip/inner0.zip/zeros.bin");
        assert_eq!(listed[1], "outer.zip/inner1.zip/zeros.bin");
        assert_eq!(listed[2], "outer.zip/inner2.zip/zeros.bin");
        assert_eq!(listed[3], "failed:outer.zip/inner3.zip:BombDetected");
        assert!(listed[3..].iter().all(|p| p.starts_with("failed:")), "{listed:?}");
    }

    #[test]
    fn test_unreadable_root_archive_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.zip");
        let mut data = zip_bytes(&[("one.txt", b"1")]);
        data.truncate(30);
        fs::write(&path, data).unwrap();

        let err = walker(WalkOptions::default()).collect(&path).unwrap_err();
        assert!(matches!(err, PipelineError::CannotOpen(_)), "got {err:?}");
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = walker(WalkOptions::default())
            .collect(&dir.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_not_followed() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("docs");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("real.txt"), "real").unwrap();
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("link.txt")).unwrap();

        let nodes = walker(WalkOptions::default()).collect(&root).unwrap();
        assert_eq!(paths(&nodes), ["docs/real.txt"]);
    }
}
