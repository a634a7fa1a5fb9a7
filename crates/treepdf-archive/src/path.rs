//! Path helpers for archive entries

use std::path::{Component, Path};

/// Normalise an entry path and strip anything that could escape the archive
///
/// Only normal components are kept; parent references (`..`), current
/// directory references (`.`), roots and drive prefixes are dropped. Backslash
/// separators written by Windows tools are treated as `/`.
///
/// Returns `None` when nothing usable is left (e.g. `"../"`).
///
/// # Examples
///
/// ```
/// use treepdf_archive::path::sanitize_path;
///
/// assert_eq!(sanitize_path("../../etc/passwd").as_deref(), Some("etc/passwd"));
/// assert_eq!(sanitize_path("./docs\\a.txt").as_deref(), Some("docs/a.txt"));
/// assert_eq!(sanitize_path(".."), None);
/// ```
#[must_use]
pub fn sanitize_path(path: &str) -> Option<String> {
    let unified = path.replace('\\', "/");
    let parts: Vec<&str> = Path::new(&unified)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Single folder shared by every entry, if there is one
///
/// Stops at the first root-level file or the first second distinct top-level
/// segment. An empty listing has no common folder.
///
/// # Examples
///
/// ```
/// use treepdf_archive::path::top_level_folder;
///
/// assert_eq!(top_level_folder(["a/x.txt", "a/b/y.txt"]).as_deref(), Some("a"));
/// assert_eq!(top_level_folder(["a/x.txt", "b/y.txt"]), None);
/// assert_eq!(top_level_folder(["x.txt"]), None);
/// ```
#[must_use]
pub fn top_level_folder<'a, I>(entries: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut folder: Option<&str> = None;
    for entry in entries {
        let (head, _) = entry.split_once('/')?;
        match folder {
            None => folder = Some(head),
            Some(seen) if seen != head => return None,
            Some(_) => {}
        }
    }
    folder.map(str::to_string)
}

/// Folder name proposed for extracting an archive: the file name with up to
/// two extensions removed (`photos.tar.gz` becomes `photos`)
#[must_use]
pub fn folder_name(archive_name: &str) -> String {
    let base = Path::new(archive_name);
    let once = base.file_stem().unwrap_or(base.as_os_str());
    let twice = Path::new(once).file_stem().unwrap_or(once);
    twice.to_string_lossy().into_owned()
}

/// Last path segment of a logical path
#[inline]
#[must_use]
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
