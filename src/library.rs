// Library browser - audio files already present in the output directory

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Extensions listed in the library (lowercase, without the dot).
pub const AUDIO_EXTENSIONS: [&str; 8] = ["mp3", "m4a", "flac", "wav", "opus", "aac", "ogg", "oga"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    pub path: PathBuf,
}

fn is_audio_file(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Audio files directly under `dir`, names in descending order.
///
/// A missing directory yields an empty list. Nothing is cached; every call
/// reads the directory again.
pub fn list_library(dir: &Path) -> io::Result<Vec<LibraryEntry>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        // follows symlinks, like a plain "is this a file" check
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_audio_file(&name) {
            entries.push(LibraryEntry { name, path });
        }
    }
    entries.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(entries)
}

/// Open a file with the operating system's default application.
pub fn open_entry(path: &Path) -> io::Result<()> {
    debug!(path = %path.display(), "opening library entry");
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]).arg(path);
        c
    } else if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(path);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(path);
        c
    };
    command.spawn().map(|_| ())
}
