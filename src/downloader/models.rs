// Common data models for the downloader

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// File name of the yt-dlp download archive inside the output directory.
pub const ARCHIVE_FILE_NAME: &str = "downloaded.txt";

/// Bitrate used when the requested one is not numeric.
pub const DEFAULT_BITRATE: &str = "192";

/// Title shown for a queue row until the probe resolves it.
pub const PENDING_TITLE: &str = "Resolving…";

/// Target codec for the extract-audio stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    M4a,
    Flac,
    Wav,
    Opus,
    Aac,
    Vorbis,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 7] = [
        Self::Mp3,
        Self::M4a,
        Self::Flac,
        Self::Wav,
        Self::Opus,
        Self::Aac,
        Self::Vorbis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Vorbis => "vorbis",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == wanted)
            .ok_or_else(|| format!("unsupported audio format: {}", s))
    }
}

/// Metadata yt-dlp reports for one entry (`--dump-json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl MediaInfo {
    /// Canonical locator for this entry, if yt-dlp reported one.
    pub fn page_url(&self) -> Option<&str> {
        self.webpage_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(self.url.as_deref().filter(|u| !u.is_empty()))
    }
}

/// User settings read by the worker each time it starts an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub audio_format: AudioFormat,
    pub bitrate: String,
    pub embed_thumbnail: bool,
    pub write_metadata: bool,
    pub cookies_file: Option<PathBuf>,
    pub artist_filter: Option<String>,
}

impl Settings {
    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join(ARCHIVE_FILE_NAME)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            audio_format: AudioFormat::Mp3,
            bitrate: DEFAULT_BITRATE.to_string(),
            embed_thumbnail: false,
            write_metadata: true,
            cookies_file: None,
            artist_filter: None,
        }
    }
}

/// Live settings shared between the UI and the worker thread.
pub type SharedSettings = Arc<RwLock<Settings>>;

/// `./downloads` under the working directory, or the user's download dir.
pub fn default_output_dir() -> PathBuf {
    std::env::current_dir()
        .ok()
        .or_else(dirs::download_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("downloads")
}

/// A requested download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub locator: String,
    pub title: String,
    pub row: usize,
    pub video_id: String,
    /// Clear-generation the item was added in.
    pub generation: u64,
}

impl QueueItem {
    pub fn new(locator: impl Into<String>, row: usize, generation: u64) -> Self {
        Self {
            locator: locator.into(),
            title: PENDING_TITLE.to_string(),
            row,
            video_id: String::new(),
            generation,
        }
    }
}

/// Per-row lifecycle. Done, Skipped and Error are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum ItemStatus {
    Queued,
    Downloading,
    Converting,
    Done,
    Skipped,
    Error(String),
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Error(_))
    }

    pub fn label(&self) -> String {
        match self {
            Self::Queued => "Queued".to_string(),
            Self::Downloading => "Downloading".to_string(),
            Self::Converting => "Converting".to_string(),
            Self::Done => "Done".to_string(),
            Self::Skipped => "Skipped (duplicate)".to_string(),
            Self::Error(msg) => format!("Error: {}", msg),
        }
    }
}

/// Phase reported in a progress update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Downloading,
    Converting,
}

/// Progress for one queue row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub row: usize,
    pub phase: Phase,
    /// Fraction complete in [0, 1].
    pub progress: f64,
    pub speed: String,
    pub eta: String,
    pub downloaded_bytes: u64,
    /// Zero when unknown.
    pub total_bytes: u64,
}

/// Notifications emitted by the download worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerEvent {
    Progress(ProgressUpdate),
    Finished { row: usize, output_dir: PathBuf },
    Errored { row: usize, message: String },
}

impl WorkerEvent {
    pub fn row(&self) -> usize {
        match self {
            Self::Progress(update) => update.row,
            Self::Finished { row, .. } | Self::Errored { row, .. } => *row,
        }
    }
}
