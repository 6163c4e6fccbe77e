// Collect the files to upload

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into.
pub const EXCLUDED_DIRS: [&str; 7] = [".git", ".venv", "downloads", "tools", "__pycache__", "target", "node_modules"];

/// File extensions never uploaded.
pub const EXCLUDED_EXTENSIONS: [&str; 4] = ["pyc", "pyo", "pyd", "log"];

fn is_excluded_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
}

fn is_excluded_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| EXCLUDED_EXTENSIONS.contains(&ext))
}

/// Files under `root`, as paths relative to it, in walk order.
pub fn collect_files(root: &Path) -> walkdir::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded_dir(e));
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || is_excluded_file(entry.path()) {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }
    Ok(files)
}

/// Repository path for a relative file path, always with forward slashes.
pub fn repo_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
