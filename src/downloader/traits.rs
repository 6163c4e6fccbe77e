// Seams between the queue, the yt-dlp backend and whoever displays progress

use async_trait::async_trait;

use super::errors::DownloadError;
use super::models::{MediaInfo, WorkerEvent};
use super::options::YtDlpOptions;
use super::progress::ProgressEvent;

/// Something that can resolve and download media
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Resolve metadata for a locator without downloading.
    ///
    /// Playlists and searches yield one entry per item.
    async fn probe(&self, locator: &str, options: &YtDlpOptions) -> Result<Vec<MediaInfo>, DownloadError>;

    /// Download and convert every input, blocking until the run ends.
    ///
    /// A run where yt-dlp reports failures returns [`DownloadError::ExitStatus`].
    async fn download(
        &self,
        inputs: &[String],
        options: &YtDlpOptions,
        hook: &dyn ProgressHook,
    ) -> Result<(), DownloadError>;
}

/// Receives progress while a download runs
pub trait ProgressHook: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressHook for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Receives worker notifications (UI signals, channels)
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WorkerEvent);
}

impl EventSink for std::sync::mpsc::Sender<WorkerEvent> {
    fn emit(&self, event: WorkerEvent) {
        // receiver gone means nobody is listening any more
        let _ = self.send(event);
    }
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<WorkerEvent> {
    fn emit(&self, event: WorkerEvent) {
        let _ = self.send(event);
    }
}
