// Progress reporting - parses yt-dlp output lines into typed events

use std::io::Write;
use std::path::Path;

use regex::Regex;

use super::traits::ProgressHook;

/// Passed to `--progress-template` so progress lines are machine readable.
pub const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.status)s|%(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.filename)s";

/// Status reported while yt-dlp works through an entry
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Downloading {
        /// Percent in [0, 100] when yt-dlp knows it.
        percent: Option<f64>,
        speed: String,
        eta: String,
        downloaded_bytes: u64,
        /// Zero when unknown.
        total_bytes: u64,
        filename: String,
    },
    /// Raw media retrieved; post-processing follows.
    Finished { filename: String },
    /// ffmpeg started writing the converted file.
    Converting { destination: String },
}

impl ProgressEvent {
    /// Completion in [0, 1].
    pub fn fraction(&self) -> f64 {
        match self {
            Self::Downloading { percent: Some(p), .. } => (p / 100.0).clamp(0.0, 1.0),
            Self::Downloading { downloaded_bytes, total_bytes, .. } if *total_bytes > 0 => {
                (*downloaded_bytes as f64 / *total_bytes as f64).clamp(0.0, 1.0)
            }
            Self::Downloading { .. } => 0.0,
            Self::Finished { .. } | Self::Converting { .. } => 1.0,
        }
    }
}

lazy_static::lazy_static! {
    static ref PROGRESS_RE: Regex = Regex::new(
        r"^\[progress\]\s*(\w+)\|([^|]*)\|([^|]*)\|([^|]*)\|([^|]*)\|([^|]*)\|([^|]*)\|(.*)$"
    ).unwrap();
    static ref EXTRACT_RE: Regex = Regex::new(r"^\[ExtractAudio\]\s+Destination:\s+(.+)$").unwrap();
    static ref ANSI_RE: Regex = Regex::new(r"\x1b\[[0-9;]*m").unwrap();
}

/// Parse one stdout line from a yt-dlp run started with [`PROGRESS_TEMPLATE`].
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let line = ANSI_RE.replace_all(line.trim(), "");

    if let Some(caps) = PROGRESS_RE.captures(&line) {
        let field = |i: usize| caps.get(i).map(|m| clean_field(m.as_str())).unwrap_or_default();
        let filename = field(8);
        return match caps.get(1)?.as_str() {
            "downloading" => {
                let total = parse_bytes(&field(6)).or_else(|| parse_bytes(&field(7)));
                Some(ProgressEvent::Downloading {
                    percent: field(2).trim_end_matches('%').trim().parse().ok(),
                    speed: field(3),
                    eta: field(4),
                    downloaded_bytes: parse_bytes(&field(5)).unwrap_or(0),
                    total_bytes: total.unwrap_or(0),
                    filename,
                })
            }
            "finished" => Some(ProgressEvent::Finished { filename }),
            _ => None,
        };
    }

    EXTRACT_RE.captures(&line).map(|caps| ProgressEvent::Converting {
        destination: caps[1].trim().to_string(),
    })
}

// yt-dlp renders missing template fields as "NA"
fn clean_field(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "NA" || trimmed == "None" {
        String::new()
    } else {
        trimmed.to_string()
    }
}

fn parse_bytes(raw: &str) -> Option<u64> {
    raw.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64)
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Prints progress for the console variant, rewriting one line in place.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn render(event: &ProgressEvent) -> String {
        let or_unknown = |s: &str| if s.is_empty() { "?".to_string() } else { s.to_string() };
        match event {
            ProgressEvent::Downloading { percent, speed, eta, filename, .. } => format!(
                "Downloading: {} | {} | ETA {} -> {}",
                percent.map(|p| format!("{:.1}%", p)).unwrap_or_else(|| "?".to_string()),
                or_unknown(speed),
                or_unknown(eta),
                base_name(filename)
            ),
            ProgressEvent::Finished { filename } => {
                format!("Downloaded: {}. Converting...", base_name(filename))
            }
            ProgressEvent::Converting { destination } => {
                format!("Converting -> {}", base_name(destination))
            }
        }
    }
}

impl ProgressHook for ConsoleReporter {
    fn on_progress(&self, event: &ProgressEvent) {
        let mut out = std::io::stdout().lock();
        let _ = match event {
            ProgressEvent::Downloading { .. } => write!(out, "\r{}", Self::render(event)),
            ProgressEvent::Finished { .. } => writeln!(out, "\n{}", Self::render(event)),
            ProgressEvent::Converting { .. } => writeln!(out, "{}", Self::render(event)),
        };
        let _ = out.flush();
    }
}
