// Option builder - maps user settings to a yt-dlp run configuration
//
// The configuration is kept as a typed value so callers and tests can inspect
// it; `to_args` renders it as yt-dlp command line flags.

use std::path::{Path, PathBuf};

use super::models::{AudioFormat, MediaInfo, Settings, DEFAULT_BITRATE};
use super::tools::find_local_ffmpeg_dir;

/// Normalize a bitrate such as "192", "192k" or " 320K " to "192"/"320".
///
/// Anything that is not a bare number after dropping one trailing `k`
/// falls back to [`DEFAULT_BITRATE`].
pub fn normalize_bitrate(bitrate: &str) -> String {
    let cleaned = bitrate.trim().to_lowercase();
    let cleaned = cleaned.strip_suffix('k').unwrap_or(&cleaned);
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return DEFAULT_BITRATE.to_string();
    }
    cleaned.to_string()
}

/// A post-processing stage yt-dlp runs after retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcessor {
    ExtractAudio { codec: AudioFormat, quality: String },
    Metadata,
    EmbedThumbnail,
}

impl PostProcessor {
    /// yt-dlp's internal name for the stage
    pub fn key(&self) -> &'static str {
        match self {
            Self::ExtractAudio { .. } => "FFmpegExtractAudio",
            Self::Metadata => "FFmpegMetadata",
            Self::EmbedThumbnail => "FFmpegThumbnailsEmbed",
        }
    }

    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            Self::ExtractAudio { codec, quality } => {
                args.push("-x".to_string());
                args.push("--audio-format".to_string());
                args.push(codec.as_str().to_string());
                args.push("--audio-quality".to_string());
                args.push(format!("{}K", quality));
            }
            Self::Metadata => args.push("--embed-metadata".to_string()),
            Self::EmbedThumbnail => args.push("--embed-thumbnail".to_string()),
        }
    }
}

/// Keeps only entries whose uploader, channel or artist contains a substring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploaderFilter {
    original: String,
    needle: String,
}

impl UploaderFilter {
    /// Returns `None` for a blank filter.
    pub fn new(filter: &str) -> Option<Self> {
        let needle = filter.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        Some(Self {
            original: filter.to_string(),
            needle,
        })
    }

    /// `None` lets the entry through, `Some(reason)` skips it.
    ///
    /// The reason quotes the filter as the user typed it.
    pub fn check(&self, info: &MediaInfo) -> Option<String> {
        let matches = [&info.uploader, &info.channel, &info.artist]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&self.needle));
        if matches {
            None
        } else {
            Some(format!(
                "skip: uploader/channel does not include '{}'",
                self.original
            ))
        }
    }
}

/// Inputs to [`build_options`]
#[derive(Debug, Clone, Default)]
pub struct OptionInputs {
    pub output_dir: PathBuf,
    pub audio_format: AudioFormat,
    pub bitrate: String,
    pub embed_thumbnail: bool,
    pub write_metadata: bool,
    pub cookies_file: Option<PathBuf>,
    pub uploader_filter: Option<String>,
    pub download_archive: Option<PathBuf>,
}

impl OptionInputs {
    /// Inputs for a live settings snapshot, archive inside the output dir.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            output_dir: settings.output_dir.clone(),
            audio_format: settings.audio_format,
            bitrate: settings.bitrate.clone(),
            embed_thumbnail: settings.embed_thumbnail,
            write_metadata: settings.write_metadata,
            cookies_file: settings.cookies_file.clone(),
            uploader_filter: settings.artist_filter.clone(),
            download_archive: Some(settings.archive_path()),
        }
    }
}

/// One yt-dlp run configuration
#[derive(Debug, Clone, PartialEq)]
pub struct YtDlpOptions {
    pub format: String,
    pub output_template: PathBuf,
    pub no_playlist: bool,
    pub quiet: bool,
    pub no_warnings: bool,
    pub ignore_errors: bool,
    pub default_search: String,
    pub overwrites: bool,
    pub postprocessors: Vec<PostProcessor>,
    pub ffmpeg_location: Option<PathBuf>,
    pub write_thumbnail: bool,
    pub cookie_file: Option<PathBuf>,
    pub download_archive: Option<PathBuf>,
    pub match_filter: Option<UploaderFilter>,
    pub skip_download: bool,
}

/// Build options, preferring a bundled ffmpeg next to the application.
pub fn build_options(inputs: &OptionInputs) -> YtDlpOptions {
    build_options_with_ffmpeg(inputs, find_local_ffmpeg_dir())
}

/// Same as [`build_options`] with an explicit ffmpeg directory.
pub fn build_options_with_ffmpeg(inputs: &OptionInputs, ffmpeg_dir: Option<PathBuf>) -> YtDlpOptions {
    let mut postprocessors = vec![PostProcessor::ExtractAudio {
        codec: inputs.audio_format,
        quality: normalize_bitrate(&inputs.bitrate),
    }];
    if inputs.write_metadata {
        postprocessors.push(PostProcessor::Metadata);
    }
    if inputs.embed_thumbnail {
        postprocessors.push(PostProcessor::EmbedThumbnail);
    }

    YtDlpOptions {
        format: "bestaudio/best".to_string(),
        output_template: inputs.output_dir.join("%(title)s.%(ext)s"),
        no_playlist: true,
        quiet: false,
        no_warnings: true,
        ignore_errors: true,
        default_search: "ytsearch".to_string(),
        overwrites: false,
        postprocessors,
        ffmpeg_location: ffmpeg_dir,
        write_thumbnail: inputs.embed_thumbnail,
        cookie_file: inputs.cookies_file.clone().filter(|p| !p.as_os_str().is_empty()),
        download_archive: inputs
            .download_archive
            .clone()
            .filter(|p| !p.as_os_str().is_empty()),
        match_filter: inputs
            .uploader_filter
            .as_deref()
            .and_then(UploaderFilter::new),
        skip_download: false,
    }
}

impl YtDlpOptions {
    /// Copy of these options for a metadata-only probe of a single entry.
    pub fn for_probe(&self) -> Self {
        Self {
            skip_download: true,
            no_playlist: true,
            ..self.clone()
        }
    }

    /// Render as yt-dlp flags, without the input locators.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.format.clone(),
            "-o".to_string(),
            path_arg(&self.output_template),
            "--default-search".to_string(),
            self.default_search.clone(),
            if self.no_playlist { "--no-playlist" } else { "--yes-playlist" }.to_string(),
            "--newline".to_string(),
        ];

        if self.quiet {
            // keep progress lines even when quiet; the worker parses them
            args.push("--quiet".to_string());
            args.push("--progress".to_string());
        }
        if self.no_warnings {
            args.push("--no-warnings".to_string());
        }
        if self.ignore_errors {
            args.push("--ignore-errors".to_string());
        }
        if !self.overwrites {
            args.push("--no-overwrites".to_string());
        }

        for pp in &self.postprocessors {
            pp.push_args(&mut args);
        }

        if let Some(dir) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(path_arg(dir));
        }
        if self.write_thumbnail && !self.postprocessors.contains(&PostProcessor::EmbedThumbnail) {
            args.push("--write-thumbnail".to_string());
        }
        if let Some(cookies) = &self.cookie_file {
            args.push("--cookies".to_string());
            args.push(path_arg(cookies));
        }
        if let Some(archive) = &self.download_archive {
            args.push("--download-archive".to_string());
            args.push(path_arg(archive));
        }
        if self.skip_download {
            args.push("--skip-download".to_string());
        }

        args
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
