//! Requirements file discovery
//!
//! Walks search directories for files whose name matches a glob pattern
//! (default `requirements.txt`). Each file found becomes one module, named
//! by its path relative to the directory it was found under.

use crate::error::{DepcacheError, DepcacheResult};
use glob::Pattern;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// File name searched for when none is given
pub const DEFAULT_PATTERN: &str = "requirements.txt";

/// Directories never descended into
const SKIPPED_DIRS: &[&str] = &["node_modules", "__pycache__", "site-packages", "venv", "target"];

/// Find requirement files under `search_dirs`, keyed by module name
///
/// A module name seen twice (same relative path under two search dirs)
/// falls back to the full path.
pub fn discover_requirement_files(
    search_dirs: &[PathBuf],
    pattern: &str,
) -> DepcacheResult<BTreeMap<String, PathBuf>> {
    let pattern = Pattern::new(pattern).map_err(|e| {
        DepcacheError::User(format!("Invalid file pattern '{}': {}", pattern, e))
    })?;

    let mut found = BTreeMap::new();
    for dir in search_dirs {
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped(e));

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !pattern.matches(&name) {
                continue;
            }

            let path = entry.into_path();
            let module = match module_name(dir, &path) {
                Some(module) if !found.contains_key(&module) => module,
                _ => path.display().to_string(),
            };
            debug!("Discovered {} as {}", path.display(), module);
            found.insert(module, path);
        }
    }

    Ok(found)
}

fn is_skipped(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&&*name)
}

fn module_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}
