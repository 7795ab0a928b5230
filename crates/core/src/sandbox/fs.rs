// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Host-side access to the filesystem the sandbox shares with us.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Removes `dir` with everything in it, then recreates it empty.
pub fn reset_dir(dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::fs::create_dir_all(dir)
}

/// Writes `data`, creating parent directories as needed.
pub fn write_bytes(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)
}

/// Reads a text file, lossily. `None` if it does not exist or is blank.
pub fn read_text(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Names of the immediate subdirectories of `dir`, sorted.
pub fn list_dirs(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Relative path with `/` separators, whatever the host convention.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Reads every regular file below `root`, keyed by relative path.
///
/// Files in `exclude` and files larger than `max_bytes` are skipped.
pub fn collect_files(
    root: &Path,
    exclude: &[PathBuf],
    max_bytes: u64,
) -> io::Result<BTreeMap<String, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if exclude.iter().any(|e| e == path) {
            continue;
        }
        let size = entry.metadata().map_err(io::Error::from)?.len();
        if size > max_bytes {
            warn!("Skipping {:?}: {} bytes exceeds artifact limit", path, size);
            continue;
        }
        let Some(key) = relative_key(root, path) else {
            continue;
        };
        match std::fs::read(path) {
            Ok(data) => {
                debug!("Collected file: {} ({} bytes)", key, data.len());
                files.insert(key, data);
            }
            Err(e) => warn!("Could not read generated file {:?}: {}", path, e),
        }
    }
    Ok(files)
}
