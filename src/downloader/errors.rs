// Error types for the yt-dlp backend and the download queue

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadError {
    /// Network timeout while talking to the media site
    NetworkTimeout,

    /// The site blocked the request (429, bot detection, etc.)
    Blocked(String),

    /// yt-dlp or ffmpeg not found on this machine
    ToolNotFound(String),

    /// Locator that yt-dlp cannot handle
    InvalidUrl(String),

    /// Failed to parse yt-dlp JSON output
    ParseError(String),

    /// Spawning or waiting on the child process failed
    ExecutionError(String),

    /// yt-dlp ran to completion but reported failures
    ExitStatus { code: i32, details: String },

    /// User pressed Ctrl-C while a run was in progress
    Interrupted,

    /// Unknown error with details
    Unknown(String),
}

impl DownloadError {
    /// Process exit code the console variant should use for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ExitStatus { code, .. } if *code != 0 => *code,
            Self::Interrupted => 130,
            _ => 1,
        }
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkTimeout => write!(f, "Network timeout: the site is not responding"),
            Self::Blocked(msg) => write!(
                f,
                "The site is throttling or blocking requests. Try again later or pass --cookies.\n{}",
                msg
            ),
            Self::ToolNotFound(tool) => write!(f, "Tool not found: {}", tool),
            Self::InvalidUrl(url) => write!(f, "Invalid URL: {}", url),
            Self::ParseError(msg) => write!(f, "Parse error: {}", msg),
            Self::ExecutionError(msg) => write!(f, "Execution error: {}", msg),
            Self::ExitStatus { code, details } if details.is_empty() => {
                write!(f, "yt-dlp exited with status {}", code)
            }
            Self::ExitStatus { code, details } => {
                write!(f, "yt-dlp exited with status {}: {}", code, details)
            }
            Self::Interrupted => write!(f, "Aborted by user"),
            Self::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for DownloadError {}

// Classify raw yt-dlp stderr
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::NetworkTimeout;
        }

        if lower.contains("429") || lower.contains("sign in to confirm") || lower.contains("blocked") {
            return Self::Blocked(s);
        }

        if lower.contains("command not found") || lower.contains("no such file") {
            return Self::ToolNotFound(s);
        }

        if lower.contains("unsupported url") || lower.contains("invalid url") {
            return Self::InvalidUrl(s);
        }

        if lower.contains("json") {
            return Self::ParseError(s);
        }

        Self::Unknown(s)
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::ToolNotFound(e.to_string())
        } else {
            Self::ExecutionError(e.to_string())
        }
    }
}
