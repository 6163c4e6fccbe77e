use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

use super::errors::DownloadError;

/// Environment variable that overrides the yt-dlp executable.
pub const YTDLP_PATH_ENV: &str = "YTDLP_PATH";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    /// Executable file name on this platform
    pub fn binary_name(&self) -> String {
        if cfg!(windows) {
            format!("{}.exe", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

/// Directory holding the running executable, or the working directory.
pub fn app_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Look for a bundled ffmpeg under `tools/ffmpeg` next to the application.
pub fn find_local_ffmpeg_dir() -> Option<PathBuf> {
    find_local_ffmpeg_dir_in(&app_dir())
}

/// Search `<base>/tools/ffmpeg` recursively and return the first directory
/// that contains the ffmpeg executable.
pub fn find_local_ffmpeg_dir_in(base: &Path) -> Option<PathBuf> {
    let root = base.join("tools").join("ffmpeg");
    if !root.is_dir() {
        return None;
    }
    let target = ToolType::Ffmpeg.binary_name();
    WalkDir::new(&root)
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name() == target.as_str())
        .and_then(|entry| entry.path().parent().map(Path::to_path_buf))
}

/// Fail with installation guidance when ffmpeg is neither on PATH nor bundled.
pub fn ensure_ffmpeg_available() -> Result<(), DownloadError> {
    let manager = ToolManager::new();
    if manager.find_on_path(ToolType::Ffmpeg).is_some() || find_local_ffmpeg_dir().is_some() {
        return Ok(());
    }
    Err(DownloadError::ToolNotFound(ffmpeg_install_advice()))
}

pub fn ffmpeg_install_advice() -> String {
    let mut lines = vec![
        "ffmpeg is required to convert audio.",
        "",
        "Install options:",
    ];
    if cfg!(windows) {
        lines.push("- Windows: run the helper script: .\\install_ffmpeg.ps1");
        lines.push("  (This uses winget. Without winget, download an ffmpeg build and add it to PATH.)");
    } else {
        lines.push("- macOS (Homebrew): brew install ffmpeg");
        lines.push("- Linux (Debian/Ubuntu): sudo apt-get update && sudo apt-get install -y ffmpeg");
    }
    lines.join("\n")
}

pub struct ToolManager;

impl ToolManager {
    pub fn new() -> Self {
        Self
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = match tool_type {
            ToolType::YtDlp => self.find_ytdlp(),
            ToolType::Ffmpeg => self
                .find_on_path(ToolType::Ffmpeg)
                .or_else(|| {
                    find_local_ffmpeg_dir().map(|dir| dir.join(ToolType::Ffmpeg.binary_name()))
                }),
        };
        let version = path.as_deref().and_then(|p| self.get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            path: path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            is_available: path.is_some(),
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
        ]
    }

    /// yt-dlp executable: `YTDLP_PATH`, common install paths, then PATH.
    pub fn find_ytdlp(&self) -> Option<PathBuf> {
        if let Ok(path) = std::env::var(YTDLP_PATH_ENV) {
            let path = PathBuf::from(path.trim());
            if path.is_file() {
                return Some(path);
            }
        }

        let local = app_dir().join("tools").join(ToolType::YtDlp.binary_name());
        if local.is_file() {
            return Some(local);
        }

        self.find_on_path(ToolType::YtDlp)
    }

    pub fn find_on_path(&self, tool_type: ToolType) -> Option<PathBuf> {
        let binary_name = tool_type.binary_name();

        // 1. Try common paths first
        if !cfg!(windows) {
            let common_paths = [
                format!("/opt/homebrew/bin/{}", binary_name),
                format!("/usr/local/bin/{}", binary_name),
                format!("/usr/bin/{}", binary_name),
            ];
            for path in common_paths {
                let path = PathBuf::from(path);
                if path.is_file() {
                    return Some(path);
                }
            }
        }

        // 2. Try PATH
        let finder = if cfg!(windows) { "where" } else { "which" };
        let output = Command::new(finder).arg(&binary_name).output().ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from)
    }

    fn get_version(&self, path: &Path, tool_type: ToolType) -> Option<String> {
        let arg = match tool_type {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version",
        };

        match Command::new(path).arg(arg).output() {
            Ok(output) if output.status.success() => {
                let out = String::from_utf8_lossy(&output.stdout);
                // ffmpeg prints a banner; its first line carries the version
                out.lines().next().map(|l| l.trim().to_string())
            }
            _ => None,
        }
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn local_ffmpeg_found_in_nested_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let bin_dir = tmp.path().join("tools/ffmpeg/ffmpeg-7.0/bin");
        fs::create_dir_all(&bin_dir).unwrap();
        fs::write(bin_dir.join(ToolType::Ffmpeg.binary_name()), b"").unwrap();
        fs::write(tmp.path().join("tools/ffmpeg/README.txt"), b"").unwrap();

        assert_eq!(find_local_ffmpeg_dir_in(tmp.path()), Some(bin_dir));
    }

    #[test]
    fn local_ffmpeg_missing() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(find_local_ffmpeg_dir_in(tmp.path()), None);

        fs::create_dir_all(tmp.path().join("tools/ffmpeg/docs")).unwrap();
        assert_eq!(find_local_ffmpeg_dir_in(tmp.path()), None);
    }

    #[test]
    fn tool_report_is_consistent() {
        let tools = ToolManager::new().get_all_tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "yt-dlp");
        assert_eq!(tools[1].tool_type, ToolType::Ffmpeg);
        for tool in &tools {
            assert_eq!(tool.is_available, tool.path.is_some());
            if !tool.is_available {
                assert!(tool.version.is_none());
            }
        }
    }

    #[test]
    fn advice_names_a_package_manager() {
        let advice = ffmpeg_install_advice();
        assert!(advice.starts_with("ffmpeg is required"));
        assert!(advice.contains("winget") || advice.contains("brew install ffmpeg"));
    }
}
