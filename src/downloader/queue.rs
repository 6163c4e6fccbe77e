// Download queue - the model behind the GUI's queue table
//
// Adding input resolves each locator with a metadata probe, skips identifiers
// already seen this session, and hands the rest to the worker. Worker events
// are applied to the table before being forwarded to the UI.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::models::{ItemStatus, Phase, QueueItem, Settings, SharedSettings, WorkerEvent};
use super::traits::{EventSink, MediaBackend};
use super::worker::{queue_options, DownloadWorker};

const BYTES_PER_MB: f64 = 1_048_576.0;

/// Split raw user input into locators.
///
/// Newlines and commas separate entries; anything that is not a URL or an
/// explicit search becomes a top-result search.
pub fn parse_input(raw: &str) -> Vec<String> {
    raw.replace('\r', "")
        .split(|c: char| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            if t.starts_with("http://") || t.starts_with("https://") || t.starts_with("ytsearch") {
                t.to_string()
            } else {
                format!("ytsearch1:{}", t)
            }
        })
        .collect()
}

/// One row of the visible queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRow {
    pub item: QueueItem,
    pub status: ItemStatus,
    pub progress: f64,
    pub speed: String,
    pub eta: String,
    pub size: String,
}

impl QueueRow {
    fn new(item: QueueItem) -> Self {
        Self {
            item,
            status: ItemStatus::Queued,
            progress: 0.0,
            speed: String::new(),
            eta: String::new(),
            size: String::new(),
        }
    }
}

pub fn size_label(downloaded: u64, total: u64) -> String {
    if total == 0 {
        return String::new();
    }
    format!(
        "{:.2}/{:.2} MB",
        downloaded as f64 / BYTES_PER_MB,
        total as f64 / BYTES_PER_MB
    )
}

#[derive(Debug, Default)]
pub struct QueueTable {
    rows: Vec<QueueRow>,
    session_ids: HashSet<String>,
}

impl QueueTable {
    pub fn rows(&self) -> &[QueueRow] {
        &self.rows
    }

    /// Update a row from a worker event. Events for unknown rows are ignored.
    pub fn apply(&mut self, event: &WorkerEvent) {
        let Some(row) = self.rows.get_mut(event.row()) else {
            return;
        };
        match event {
            WorkerEvent::Progress(update) => {
                row.status = match update.phase {
                    Phase::Downloading => ItemStatus::Downloading,
                    Phase::Converting => ItemStatus::Converting,
                };
                row.progress = update.progress;
                row.speed = update.speed.clone();
                row.eta = update.eta.clone();
                row.size = size_label(update.downloaded_bytes, update.total_bytes);
            }
            WorkerEvent::Finished { .. } => {
                row.status = ItemStatus::Done;
                row.progress = 1.0;
            }
            WorkerEvent::Errored { message, .. } => {
                row.status = ItemStatus::Error(message.clone());
            }
        }
    }
}

/// Applies events to the table, then forwards them
struct TableSink {
    table: Arc<Mutex<QueueTable>>,
    forward: Arc<dyn EventSink>,
}

impl EventSink for TableSink {
    fn emit(&self, event: WorkerEvent) {
        self.table.lock().apply(&event);
        self.forward.emit(event);
    }
}

pub struct DownloadQueue {
    backend: Arc<dyn MediaBackend>,
    settings: SharedSettings,
    table: Arc<Mutex<QueueTable>>,
    generation: Arc<AtomicU64>,
    worker: Mutex<DownloadWorker>,
}

impl DownloadQueue {
    pub fn new(backend: Arc<dyn MediaBackend>, settings: SharedSettings, sink: Arc<dyn EventSink>) -> Self {
        let table = Arc::new(Mutex::new(QueueTable::default()));
        let generation = Arc::new(AtomicU64::new(0));
        let worker = DownloadWorker::new(
            Arc::clone(&backend),
            Arc::clone(&settings),
            Arc::new(TableSink {
                table: Arc::clone(&table),
                forward: sink,
            }),
            Arc::clone(&generation),
        );
        Self {
            backend,
            settings,
            table,
            generation,
            worker: Mutex::new(worker),
        }
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Replace the live settings; items not yet started pick them up.
    pub fn update_settings(&self, settings: Settings) {
        *self.settings.write() = settings;
    }

    pub fn rows(&self) -> Vec<QueueRow> {
        self.table.lock().rows().to_vec()
    }

    /// Add every locator in `raw`, returning the new rows.
    pub async fn add(&self, raw: &str) -> Vec<QueueRow> {
        let mut added = Vec::new();
        for locator in parse_input(raw) {
            if let Some(row) = self.add_one(locator).await {
                added.push(row);
            }
        }
        added
    }

    async fn add_one(&self, locator: String) -> Option<QueueRow> {
        let (generation, mut item) = {
            let mut table = self.table.lock();
            // clear() bumps the generation under this lock
            let generation = self.generation.load(Ordering::Acquire);
            let item = QueueItem::new(locator, table.rows.len(), generation);
            table.rows.push(QueueRow::new(item.clone()));
            (generation, item)
        };

        // best effort: a failed probe still queues the locator as typed
        let probe_options = queue_options(&self.settings()).for_probe();
        match self.backend.probe(&item.locator, &probe_options).await {
            Ok(entries) => {
                if let Some(info) = entries.into_iter().next() {
                    item.video_id = info.id.clone();
                    if let Some(title) = info.title.as_deref().filter(|t| !t.is_empty()) {
                        item.title = title.to_string();
                    }
                    if let Some(url) = info.page_url() {
                        item.locator = url.to_string();
                    }
                }
            }
            Err(e) => debug!(locator = %item.locator, "probe failed: {}", e),
        }

        let mut table = self.table.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            // cleared while probing; the row is gone
            return None;
        }

        let duplicate = !item.video_id.is_empty() && !table.session_ids.insert(item.video_id.clone());
        let row = &mut table.rows[item.row];
        row.item = item.clone();
        if duplicate {
            info!(id = %item.video_id, "skipping duplicate");
            row.status = ItemStatus::Skipped;
            return Some(row.clone());
        }
        let snapshot = row.clone();
        drop(table);

        self.worker.lock().enqueue(item);
        Some(snapshot)
    }

    /// Start processing queued items. Returns false if already running.
    pub fn start(&self) -> bool {
        self.worker.lock().start()
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_running()
    }

    /// Stop after the item in progress.
    ///
    /// Returns at once; the worker thread exits when that item is done.
    pub fn stop(&self) {
        self.worker.lock().request_stop();
    }

    /// Drop all rows and forget seen identifiers.
    ///
    /// Items still waiting in the worker queue are discarded.
    pub fn clear(&self) {
        let mut table = self.table.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        table.rows.clear();
        table.session_ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::worker::tests::FakeBackend;
    use parking_lot::RwLock;
    use std::sync::mpsc;
    use std::time::Duration;

    fn queue(backend: Arc<FakeBackend>, dir: &std::path::Path) -> (DownloadQueue, mpsc::Receiver<WorkerEvent>) {
        let (tx, rx) = mpsc::channel();
        let settings = Arc::new(RwLock::new(Settings {
            output_dir: dir.to_path_buf(),
            ..Default::default()
        }));
        (DownloadQueue::new(backend, settings, Arc::new(tx)), rx)
    }

    #[test]
    fn input_tokenizing() {
        assert_eq!(
            parse_input("https://a/1, song name\r\n\n ytsearch5:x ,http://b"),
            vec![
                "https://a/1".to_string(),
                "ytsearch1:song name".to_string(),
                "ytsearch5:x".to_string(),
                "http://b".to_string(),
            ]
        );
        assert!(parse_input(" , \n").is_empty());
    }

    #[test]
    fn size_labels() {
        assert_eq!(size_label(1_048_576, 2_097_152), "1.00/2.00 MB");
        assert_eq!(size_label(10, 0), "");
    }

    #[tokio::test]
    async fn probe_resolves_title_and_url() {
        let tmp = tempfile::tempdir().unwrap();
        let (queue, _rx) = queue(Arc::new(FakeBackend::default()), tmp.path());
        let rows = queue.add("https://short/id:abc").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].item.video_id, "abc");
        assert_eq!(rows[0].item.title, "Title abc");
        assert_eq!(rows[0].item.locator, "https://video/abc");
        assert_eq!(rows[0].status, ItemStatus::Queued);
    }

    #[tokio::test]
    async fn duplicate_identifier_is_skipped_and_never_downloaded() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let (queue, rx) = queue(backend.clone(), tmp.path());

        queue.add("https://x/id:same").await;
        let second = queue.add("https://y/id:same").await;
        assert_eq!(second[0].status, ItemStatus::Skipped);
        assert_eq!(second[0].item.row, 1);

        queue.start();
        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event.row(), 0);
        while !matches!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), WorkerEvent::Finished { .. }) {}
        queue.stop();

        assert_eq!(backend.downloads.lock().len(), 1);
        let rows = queue.rows();
        assert_eq!(rows[0].status, ItemStatus::Done);
        assert_eq!(rows[1].status, ItemStatus::Skipped);
        assert_eq!(rows[1].status.label(), "Skipped (duplicate)");
    }

    #[tokio::test]
    async fn failed_probe_still_enqueues_with_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let (queue, _rx) = queue(backend.clone(), tmp.path());

        let rows = queue.add("unresolvable thing").await;
        assert_eq!(rows[0].item.locator, "ytsearch1:unresolvable thing");
        assert_eq!(rows[0].item.title, crate::downloader::models::PENDING_TITLE);
        assert_eq!(rows[0].status, ItemStatus::Queued);

        // an id-less item never counts as a duplicate
        let again = queue.add("unresolvable thing").await;
        assert_eq!(again[0].status, ItemStatus::Queued);
    }

    #[tokio::test]
    async fn clear_forgets_session_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let (queue, _rx) = queue(Arc::new(FakeBackend::default()), tmp.path());
        queue.add("https://x/id:one").await;
        queue.clear();
        assert!(queue.rows().is_empty());

        let rows = queue.add("https://x/id:one").await;
        assert_eq!(rows[0].item.row, 0);
        assert_eq!(rows[0].status, ItemStatus::Queued);
    }

    #[tokio::test]
    async fn stop_returns_while_an_item_is_in_flight() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend {
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        });
        let (queue, rx) = queue(backend.clone(), tmp.path());
        queue.add("https://x/id:a, https://x/id:b").await;
        queue.start();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while backend.downloads.lock().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        let asked = std::time::Instant::now();
        queue.stop();
        assert!(queue.is_running());
        assert!(asked.elapsed() < Duration::from_millis(250), "stop waited for the download");

        while !matches!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), WorkerEvent::Finished { .. }) {}
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while queue.is_running() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!queue.is_running());
        assert_eq!(backend.downloads.lock().len(), 1);
        assert_eq!(queue.rows()[1].status, ItemStatus::Queued);

        // the remaining item runs on the next start
        assert!(queue.start());
        while !matches!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), WorkerEvent::Finished { row: 1, .. }) {}
        queue.stop();
    }

    #[tokio::test]
    async fn add_after_clear_uses_the_new_generation() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::default());
        let (queue, rx) = queue(backend.clone(), tmp.path());
        queue.add("https://x/id:old").await;
        queue.clear();

        let rows = queue.add("https://x/id:new").await;
        assert_eq!(rows[0].item.generation, 1);
        queue.start();
        let finished = loop {
            if let ev @ WorkerEvent::Finished { .. } = rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                break ev;
            }
        };
        assert_eq!(finished.row(), 0);
        queue.stop();

        let downloads = backend.downloads.lock();
        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].0, "https://video/new");
    }

    #[test]
    fn table_applies_worker_events() {
        let mut table = QueueTable::default();
        table.rows.push(QueueRow::new(QueueItem::new("u", 0, 0)));

        table.apply(&WorkerEvent::Progress(crate::downloader::models::ProgressUpdate {
            row: 0,
            phase: Phase::Downloading,
            progress: 0.25,
            speed: "2MiB/s".into(),
            eta: "00:03".into(),
            downloaded_bytes: 1_048_576,
            total_bytes: 4_194_304,
        }));
        assert_eq!(table.rows[0].status, ItemStatus::Downloading);
        assert_eq!(table.rows[0].size, "1.00/4.00 MB");

        table.apply(&WorkerEvent::Errored { row: 0, message: "boom".into() });
        assert_eq!(table.rows[0].status.label(), "Error: boom");

        // out of range rows are ignored
        table.apply(&WorkerEvent::Finished { row: 7, output_dir: "/x".into() });
        assert_eq!(table.rows.len(), 1);
    }
}
