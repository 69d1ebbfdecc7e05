//! Turning directories and raw generation results into file entries.

use std::collections::BTreeMap;
use std::path::Path;

use rayon::prelude::*;
use walkdir::WalkDir;

use dslc_core::{FileEntry, RelativePath};

use crate::error::{io_err, SyncError};
use crate::index::ContentHash;

/// Every regular file under `root`, relative to it, sorted by path.
///
/// Symlinks are not followed. A missing `root` is an empty tree.
pub fn load_tree(root: &Path) -> Result<Vec<FileEntry>, SyncError> {
    let paths = walk_files(root)?;
    paths
        .into_par_iter()
        .map(|(relative, native)| {
            let content = std::fs::read(&native).map_err(|e| io_err(&native, e))?;
            Ok(FileEntry::new(relative, content))
        })
        .collect()
}

/// Like [`load_tree`] but keeps only the digest of each file.
pub fn hash_tree(root: &Path) -> Result<Vec<(RelativePath, ContentHash)>, SyncError> {
    let paths = walk_files(root)?;
    paths
        .into_par_iter()
        .map(|(relative, native)| {
            let content = std::fs::read(&native).map_err(|e| io_err(&native, e))?;
            Ok((relative, ContentHash::of(&content)))
        })
        .collect()
}

/// Clean a raw generation result (`name -> bytes`) into entries.
pub fn clean_entries(raw: BTreeMap<String, Vec<u8>>) -> Result<Vec<FileEntry>, SyncError> {
    raw.into_iter()
        .map(|(name, content)| {
            let path =
                RelativePath::parse(&name).map_err(|e| SyncError::from_path_error(&name, e))?;
            Ok(FileEntry::new(path, content))
        })
        .collect()
}

fn walk_files(root: &Path) -> Result<Vec<(RelativePath, std::path::PathBuf)>, SyncError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            io_err(path, source)
        })?;

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            tracing::debug!("skipping symlink: {}", entry.path().display());
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let native = entry.path().to_path_buf();
        let stripped = native.strip_prefix(root).unwrap_or(&native);
        let relative = RelativePath::from_native(stripped).map_err(|e| {
            SyncError::from_path_error(&stripped.display().to_string(), e)
        })?;
        files.push((relative, native));
    }
    Ok(files)
}
