// Download worker - one background thread draining the queue one item at a time

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::models::{Phase, ProgressUpdate, QueueItem, Settings, SharedSettings, WorkerEvent};
use super::options::{build_options, OptionInputs, YtDlpOptions};
use super::progress::ProgressEvent;
use super::traits::{EventSink, MediaBackend};
use super::utils::truncate_chars;

/// How long the worker waits on an empty queue before re-checking the stop flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Error messages are cut to this many characters for display.
pub const ERROR_MESSAGE_MAX_CHARS: usize = 80;

/// Options the queue uses for a settings snapshot: playlists allowed, quiet run.
pub fn queue_options(settings: &Settings) -> YtDlpOptions {
    let mut options = build_options(&OptionInputs::from_settings(settings));
    options.no_playlist = false;
    options.quiet = true;
    options
}

fn progress_update(row: usize, event: &ProgressEvent) -> ProgressUpdate {
    match event {
        ProgressEvent::Downloading { speed, eta, downloaded_bytes, total_bytes, .. } => ProgressUpdate {
            row,
            phase: Phase::Downloading,
            progress: event.fraction(),
            speed: speed.clone(),
            eta: eta.clone(),
            downloaded_bytes: *downloaded_bytes,
            total_bytes: *total_bytes,
        },
        ProgressEvent::Finished { .. } | ProgressEvent::Converting { .. } => ProgressUpdate {
            row,
            phase: Phase::Converting,
            progress: 1.0,
            speed: String::new(),
            eta: String::new(),
            downloaded_bytes: 0,
            total_bytes: 0,
        },
    }
}

/// Stop handshake between the handle and the worker thread
#[derive(Debug, Default)]
struct Control {
    stop_requested: bool,
    /// Set by the thread once it has left its loop for good.
    exiting: bool,
}

/// State shared between the handle and the worker thread
struct WorkerContext {
    backend: Arc<dyn MediaBackend>,
    settings: SharedSettings,
    sink: Arc<dyn EventSink>,
    control: Mutex<Control>,
    generation: Arc<AtomicU64>,
}

impl WorkerContext {
    // decided under the lock so a restart cannot race the loop exit
    fn should_exit(&self) -> bool {
        let mut control = self.control.lock();
        if control.stop_requested {
            control.exiting = true;
        }
        control.exiting
    }

    fn request_stop(&self) {
        self.control.lock().stop_requested = true;
    }

    fn is_current(&self, item: &QueueItem) -> bool {
        item.generation == self.generation.load(Ordering::Acquire)
    }

    /// Drop events for items whose rows were cleared.
    fn emit_for(&self, item: &QueueItem, event: WorkerEvent) {
        if self.is_current(item) {
            self.sink.emit(event);
        }
    }

    fn run(&self, queue: Receiver<QueueItem>) -> Receiver<QueueItem> {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                error!("failed to start worker runtime: {}", e);
                self.control.lock().exiting = true;
                return queue;
            }
        };

        info!(backend = self.backend.name(), "download worker started");
        while !self.should_exit() {
            let item = match queue.recv_timeout(POLL_INTERVAL) {
                Ok(item) => item,
                Err(RecvTimeoutError::Timeout) => {
                    thread::yield_now();
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };

            if !self.is_current(&item) {
                debug!(row = item.row, "discarding item from a cleared queue");
                continue;
            }
            runtime.block_on(self.process(&item));
        }
        self.control.lock().exiting = true;
        info!("download worker stopped");
        queue
    }

    async fn process(&self, item: &QueueItem) {
        // settings are read when the item starts, not when it was queued
        let settings = self.settings.read().clone();
        let options = queue_options(&settings);
        info!(row = item.row, locator = %item.locator, "starting item");

        if let Err(e) = std::fs::create_dir_all(&settings.output_dir) {
            warn!(row = item.row, "cannot create output dir: {}", e);
            self.emit_for(
                item,
                WorkerEvent::Errored {
                    row: item.row,
                    message: truncate_chars(&e.to_string(), ERROR_MESSAGE_MAX_CHARS),
                },
            );
            return;
        }

        let hook = |event: &ProgressEvent| {
            self.emit_for(item, WorkerEvent::Progress(progress_update(item.row, event)));
        };

        let inputs = [item.locator.clone()];
        match self.backend.download(&inputs, &options, &hook).await {
            Ok(()) => {
                info!(row = item.row, "item done");
                self.emit_for(
                    item,
                    WorkerEvent::Finished {
                        row: item.row,
                        output_dir: settings.output_dir.clone(),
                    },
                );
            }
            Err(e) => {
                warn!(row = item.row, "item failed: {}", e);
                self.emit_for(
                    item,
                    WorkerEvent::Errored {
                        row: item.row,
                        message: truncate_chars(&e.to_string(), ERROR_MESSAGE_MAX_CHARS),
                    },
                );
            }
        }
    }
}

/// Handle to the background download thread
pub struct DownloadWorker {
    context: Arc<WorkerContext>,
    sender: Sender<QueueItem>,
    receiver: Option<Receiver<QueueItem>>,
    handle: Option<JoinHandle<Receiver<QueueItem>>>,
}

impl DownloadWorker {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        settings: SharedSettings,
        sink: Arc<dyn EventSink>,
        generation: Arc<AtomicU64>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            context: Arc::new(WorkerContext {
                backend,
                settings,
                sink,
                control: Mutex::new(Control::default()),
                generation,
            }),
            sender,
            receiver: Some(receiver),
            handle: None,
        }
    }

    /// Queue an item; it runs once the worker is started.
    pub fn enqueue(&self, item: QueueItem) {
        // the receiver lives as long as `self`, so this cannot fail
        let _ = self.sender.send(item);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start the worker thread unless it is already running.
    ///
    /// A thread still finishing its item after [`request_stop`](Self::request_stop)
    /// is told to carry on instead of being replaced. Returns false when the
    /// worker was already running and not stopping.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            let mut control = self.context.control.lock();
            if !control.exiting {
                return std::mem::take(&mut control.stop_requested);
            }
        }
        // the old thread is done or past its loop, so this join is short
        self.reclaim();
        let Some(receiver) = self.receiver.take() else {
            return false;
        };

        *self.context.control.lock() = Control::default();
        let context = Arc::clone(&self.context);
        let spawned = thread::Builder::new()
            .name("download-worker".to_string())
            .spawn(move || context.run(receiver));

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                true
            }
            Err(e) => {
                // the closure (and receiver) is gone; recreate the channel
                error!("failed to spawn download worker: {}", e);
                let (sender, receiver) = mpsc::channel();
                self.sender = sender;
                self.receiver = Some(receiver);
                false
            }
        }
    }

    /// Ask the worker to stop after the current item without waiting.
    pub fn request_stop(&self) {
        self.context.request_stop();
    }

    /// Ask the worker to stop after the current item and wait for it.
    ///
    /// An item already in progress runs to completion.
    pub fn stop(&mut self) {
        self.request_stop();
        self.reclaim();
    }

    fn reclaim(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(receiver) => self.receiver = Some(receiver),
                Err(_) => {
                    error!("download worker panicked");
                    let (sender, receiver) = mpsc::channel();
                    self.sender = sender;
                    self.receiver = Some(receiver);
                }
            }
        }
    }
}

impl Drop for DownloadWorker {
    fn drop(&mut self) {
        self.request_stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::downloader::errors::DownloadError;
    use crate::downloader::models::MediaInfo;
    use crate::downloader::traits::ProgressHook;
    use async_trait::async_trait;
    use parking_lot::{Mutex, RwLock};
    use std::path::PathBuf;

    /// Backend that records calls and fails locators containing "fail".
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub downloads: Mutex<Vec<(String, YtDlpOptions)>>,
        pub probes: Mutex<Vec<String>>,
        pub delay: Option<Duration>,
    }

    #[async_trait]
    impl MediaBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn probe(&self, locator: &str, _options: &YtDlpOptions) -> Result<Vec<MediaInfo>, DownloadError> {
            self.probes.lock().push(locator.to_string());
            if locator.contains("unresolvable") {
                return Err(DownloadError::Unknown("probe failed".into()));
            }
            // "id:<x>" locators resolve to id x
            let id = locator.rsplit(':').next().unwrap_or(locator).to_string();
            Ok(vec![MediaInfo {
                title: Some(format!("Title {}", id)),
                webpage_url: Some(format!("https://video/{}", id)),
                id,
                ..Default::default()
            }])
        }

        async fn download(
            &self,
            inputs: &[String],
            options: &YtDlpOptions,
            hook: &dyn ProgressHook,
        ) -> Result<(), DownloadError> {
            self.downloads.lock().push((inputs[0].clone(), options.clone()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if inputs[0].contains("fail") {
                return Err(DownloadError::Unknown("x".repeat(200)));
            }
            hook.on_progress(&ProgressEvent::Downloading {
                percent: Some(50.0),
                speed: "1MiB/s".into(),
                eta: "00:01".into(),
                downloaded_bytes: 5,
                total_bytes: 10,
                filename: "a.webm".into(),
            });
            hook.on_progress(&ProgressEvent::Finished { filename: "a.webm".into() });
            Ok(())
        }
    }

    fn settings(dir: &std::path::Path) -> SharedSettings {
        Arc::new(RwLock::new(Settings {
            output_dir: dir.to_path_buf(),
            ..Default::default()
        }))
    }

    fn recv(rx: &mpsc::Receiver<WorkerEvent>) -> WorkerEvent {
        rx.recv_timeout(Duration::from_secs(5)).expect("worker event")
    }

    fn item(locator: &str, row: usize) -> QueueItem {
        QueueItem::new(locator, row, 0)
    }

    #[test]
    fn progress_then_finished_per_item() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let (tx, rx) = mpsc::channel();
        let mut worker = DownloadWorker::new(
            backend.clone(),
            settings(tmp.path()),
            Arc::new(tx),
            Arc::new(AtomicU64::new(0)),
        );
        worker.enqueue(item("https://video/a", 0));
        assert!(worker.start());
        assert!(!worker.start(), "second start is a no-op");

        match recv(&rx) {
            WorkerEvent::Progress(update) => {
                assert_eq!(update.row, 0);
                assert_eq!(update.phase, Phase::Downloading);
                assert_eq!(update.progress, 0.5);
                assert_eq!((update.downloaded_bytes, update.total_bytes), (5, 10));
            }
            other => panic!("unexpected {:?}", other),
        }
        match recv(&rx) {
            WorkerEvent::Progress(update) => {
                assert_eq!(update.phase, Phase::Converting);
                assert_eq!(update.progress, 1.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            recv(&rx),
            WorkerEvent::Finished { row: 0, output_dir: tmp.path().to_path_buf() }
        );
        worker.stop();

        let downloads = backend.downloads.lock();
        let opts = &downloads[0].1;
        assert!(!opts.no_playlist && opts.quiet);
        assert_eq!(opts.download_archive, Some(tmp.path().join("downloaded.txt")));
    }

    #[test]
    fn failure_is_reported_and_queue_continues() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let (tx, rx) = mpsc::channel();
        let mut worker = DownloadWorker::new(
            backend.clone(),
            settings(tmp.path()),
            Arc::new(tx),
            Arc::new(AtomicU64::new(0)),
        );
        worker.enqueue(item("https://video/fail", 0));
        worker.enqueue(item("https://video/ok", 1));
        worker.start();

        match recv(&rx) {
            WorkerEvent::Errored { row, message } => {
                assert_eq!(row, 0);
                assert_eq!(message.chars().count(), ERROR_MESSAGE_MAX_CHARS);
            }
            other => panic!("unexpected {:?}", other),
        }
        let finished = loop {
            if let ev @ WorkerEvent::Finished { .. } = recv(&rx) {
                break ev;
            }
        };
        assert_eq!(finished.row(), 1);
        worker.stop();
    }

    #[test]
    fn settings_are_read_when_item_starts() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let shared = settings(tmp.path());
        let (tx, rx) = mpsc::channel();
        let mut worker = DownloadWorker::new(
            backend.clone(),
            shared.clone(),
            Arc::new(tx),
            Arc::new(AtomicU64::new(0)),
        );
        worker.enqueue(item("https://video/a", 0));
        shared.write().bitrate = "320".into();
        worker.start();
        while !matches!(recv(&rx), WorkerEvent::Finished { .. }) {}
        worker.stop();

        let downloads = backend.downloads.lock();
        assert!(downloads[0].1.postprocessors.iter().any(|pp| matches!(
            pp,
            crate::downloader::options::PostProcessor::ExtractAudio { quality, .. } if quality == "320"
        )));
    }

    #[test]
    fn stale_generation_items_are_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let generation = Arc::new(AtomicU64::new(1));
        let (tx, rx) = mpsc::channel();
        let mut worker = DownloadWorker::new(backend.clone(), settings(tmp.path()), Arc::new(tx), generation);
        worker.enqueue(QueueItem::new("https://video/old", 0, 0));
        worker.enqueue(QueueItem::new("https://video/new", 0, 1));
        worker.start();
        while !matches!(recv(&rx), WorkerEvent::Finished { .. }) {}
        worker.stop();

        let downloads = backend.downloads.lock();
        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].0, "https://video/new");
    }

    #[test]
    fn stop_lets_in_flight_item_finish_and_keeps_the_rest() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel();
        let mut worker = DownloadWorker::new(
            backend.clone(),
            settings(tmp.path()),
            Arc::new(tx),
            Arc::new(AtomicU64::new(0)),
        );
        worker.enqueue(item("https://video/a", 0));
        worker.enqueue(item("https://video/b", 1));
        worker.start();
        // wait for the first item to begin
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while backend.downloads.lock().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        worker.stop();
        assert!(!worker.is_running());

        let finished: Vec<_> = rx
            .try_iter()
            .filter(|ev| matches!(ev, WorkerEvent::Finished { .. }))
            .collect();
        assert_eq!(finished.len(), 1);
        assert_eq!(backend.downloads.lock().len(), 1);

        // restarting picks up the item left in the queue
        assert!(worker.start());
        while !matches!(recv(&rx), WorkerEvent::Finished { row: 1, .. }) {}
        worker.stop();
        assert_eq!(backend.downloads.lock().len(), 2);
    }

    #[test]
    fn start_during_a_pending_stop_keeps_the_same_thread() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend {
            delay: Some(Duration::from_millis(300)),
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel();
        let mut worker = DownloadWorker::new(
            backend.clone(),
            settings(tmp.path()),
            Arc::new(tx),
            Arc::new(AtomicU64::new(0)),
        );
        worker.enqueue(item("https://video/a", 0));
        worker.enqueue(item("https://video/b", 1));
        worker.start();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while backend.downloads.lock().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        let asked = std::time::Instant::now();
        worker.request_stop();
        assert!(asked.elapsed() < Duration::from_millis(100), "request_stop must not wait");
        assert!(worker.is_running(), "in-flight item still running");

        assert!(worker.start(), "start cancels the pending stop");
        assert!(!worker.start());
        while !matches!(recv(&rx), WorkerEvent::Finished { row: 1, .. }) {}
        worker.stop();
        assert_eq!(backend.downloads.lock().len(), 2);
    }

    #[test]
    fn missing_output_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let out: PathBuf = tmp.path().join("nested/out");
        let backend = Arc::new(FakeBackend::default());
        let (tx, rx) = mpsc::channel();
        let mut worker = DownloadWorker::new(backend, settings(&out), Arc::new(tx), Arc::new(AtomicU64::new(0)));
        worker.enqueue(item("https://video/a", 0));
        worker.start();
        while !matches!(recv(&rx), WorkerEvent::Finished { .. }) {}
        worker.stop();
        assert!(out.is_dir());
    }
}
