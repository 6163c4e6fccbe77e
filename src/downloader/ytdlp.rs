// yt-dlp backend - drives the yt-dlp executable as a child process

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::errors::DownloadError;
use super::models::MediaInfo;
use super::options::YtDlpOptions;
use super::progress::{parse_progress_line, PROGRESS_TEMPLATE};
use super::tools::{ToolManager, ToolType};
use super::traits::{MediaBackend, ProgressHook};
use super::utils::{run_output_with_timeout, summarize_stderr};

/// Metadata probes give up after this many seconds.
const PROBE_TIMEOUT_SECS: u64 = 60;

pub struct YtDlpCli {
    ytdlp_path: PathBuf,
}

impl YtDlpCli {
    /// Locate yt-dlp, failing when it is not installed.
    pub fn locate() -> Result<Self, DownloadError> {
        ToolManager::new()
            .find_ytdlp()
            .map(Self::with_path)
            .ok_or_else(|| {
                DownloadError::ToolNotFound(format!(
                    "{} (install it or set {})",
                    ToolType::YtDlp.as_str(),
                    super::tools::YTDLP_PATH_ENV
                ))
            })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { ytdlp_path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.ytdlp_path
    }

    /// Apply the options' uploader filter, returning locators to download.
    ///
    /// With `ignore_errors`, inputs whose entries cannot be listed are left
    /// out and their errors returned alongside the accepted locators.
    async fn filtered_inputs(
        &self,
        inputs: &[String],
        options: &YtDlpOptions,
    ) -> Result<(Vec<String>, Vec<String>), DownloadError> {
        let Some(filter) = &options.match_filter else {
            return Ok((inputs.to_vec(), Vec::new()));
        };

        let listing = YtDlpOptions {
            skip_download: true,
            ..options.clone()
        };
        let mut accepted = Vec::new();
        let mut failures = Vec::new();
        for input in inputs {
            let entries = match self.probe(input, &listing).await {
                Ok(entries) => entries,
                Err(e) if options.ignore_errors => {
                    warn!(input = %input, error = %e, "could not list entries, skipping");
                    failures.push(format!("{}: {}", input, e));
                    continue;
                }
                Err(e) => return Err(e),
            };
            for entry in entries {
                match filter.check(&entry) {
                    Some(reason) => info!(id = %entry.id, "{}", reason),
                    None => accepted.push(entry.page_url().unwrap_or(entry.id.as_str()).to_string()),
                }
            }
        }
        Ok((accepted, failures))
    }

    async fn run_download(
        &self,
        inputs: &[String],
        options: &YtDlpOptions,
        hook: &dyn ProgressHook,
    ) -> Result<(), DownloadError> {
        let mut args = options.to_args();
        args.push("--progress-template".to_string());
        args.push(PROGRESS_TEMPLATE.to_string());
        args.push("--".to_string());
        args.extend(inputs.iter().cloned());
        info!(count = inputs.len(), "starting yt-dlp");
        debug!(path = %self.ytdlp_path.display(), ?args, "spawning");

        let mut child = Command::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match DownloadError::from(e) {
                DownloadError::ToolNotFound(msg) => DownloadError::ToolNotFound(format!("yt-dlp: {}", msg)),
                other => other,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::ExecutionError("Failed to capture stderr".to_string()))?;

        // with --quiet, yt-dlp writes progress to stderr instead of stdout
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut stderr_output = String::new();
        let (mut out_open, mut err_open) = (true, true);
        while out_open || err_open {
            tokio::select! {
                line = out_lines.next_line(), if out_open => match line? {
                    Some(line) => match parse_progress_line(&line) {
                        Some(event) => hook.on_progress(&event),
                        None => debug!("[yt-dlp] {}", line),
                    },
                    None => out_open = false,
                },
                line = err_lines.next_line(), if err_open => match line? {
                    Some(line) => match parse_progress_line(&line) {
                        Some(event) => hook.on_progress(&event),
                        None => {
                            stderr_output.push_str(&line);
                            stderr_output.push('\n');
                        }
                    },
                    None => err_open = false,
                },
            }
        }

        let status = child.wait().await?;

        if status.success() {
            info!("yt-dlp finished");
            return Ok(());
        }

        let details = summarize_stderr(&stderr_output);
        warn!(code = ?status.code(), "yt-dlp reported failures: {}", details);
        Err(DownloadError::ExitStatus {
            code: status.code().unwrap_or(1),
            details,
        })
    }
}

pub(crate) fn parse_media_lines(stdout: &[u8]) -> Result<Vec<MediaInfo>, DownloadError> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .map(|l| {
            serde_json::from_str::<MediaInfo>(l)
                .map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))
        })
        .collect()
}

#[async_trait]
impl MediaBackend for YtDlpCli {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, locator: &str, options: &YtDlpOptions) -> Result<Vec<MediaInfo>, DownloadError> {
        let mut args = options.to_args();
        args.push("--dump-json".to_string());
        args.push(locator.to_string());
        debug!(path = %self.ytdlp_path.display(), ?args, "probing");

        let output = run_output_with_timeout(&self.ytdlp_path, args, PROBE_TIMEOUT_SECS).await?;
        let entries = parse_media_lines(&output.stdout)?;

        if entries.is_empty() && !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::from(summarize_stderr(&stderr)));
        }
        Ok(entries)
    }

    async fn download(
        &self,
        inputs: &[String],
        options: &YtDlpOptions,
        hook: &dyn ProgressHook,
    ) -> Result<(), DownloadError> {
        let (inputs, failures) = self.filtered_inputs(inputs, options).await?;
        if inputs.is_empty() {
            info!("nothing left to download after filtering");
        } else {
            self.run_download(&inputs, options, hook).await?;
        }

        // listing failures count like yt-dlp's own per-item failures
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DownloadError::ExitStatus {
                code: 1,
                details: failures.join(" | "),
            })
        }
    }
}
