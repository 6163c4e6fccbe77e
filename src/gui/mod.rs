// Desktop front end: Tauri commands over the download queue and library

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tauri::{AppHandle, Emitter, Manager, State};
use tracing::{info, warn};

use crate::app_info::{AppInfo, APP_INFO};
use crate::downloader::models::{AudioFormat, Settings, WorkerEvent};
use crate::downloader::queue::{DownloadQueue, QueueRow};
use crate::downloader::tools::{ensure_ffmpeg_available, ToolInfo, ToolManager, ToolType};
use crate::downloader::traits::{EventSink, MediaBackend};
use crate::downloader::YtDlpCli;
use crate::library::{self, LibraryEntry};

/// Event name the front end listens on for worker updates.
pub const QUEUE_EVENT: &str = "queue-event";

pub struct AppState {
    queue: DownloadQueue,
}

/// Forwards worker events to the webview
struct TauriSink {
    app: AppHandle,
}

impl EventSink for TauriSink {
    fn emit(&self, event: WorkerEvent) {
        if let Err(e) = self.app.emit(QUEUE_EVENT, &event) {
            warn!("failed to emit {}: {}", QUEUE_EVENT, e);
        }
    }
}

/// A queue row as the table shows it
#[derive(Debug, Clone, Serialize)]
pub struct RowView {
    pub row: usize,
    pub title: String,
    pub locator: String,
    pub status: String,
    pub finished: bool,
    pub progress: f64,
    pub speed: String,
    pub eta: String,
    pub size: String,
}

impl From<QueueRow> for RowView {
    fn from(r: QueueRow) -> Self {
        Self {
            row: r.item.row,
            title: r.item.title,
            locator: r.item.locator,
            status: r.status.label(),
            finished: r.status.is_terminal(),
            progress: r.progress,
            speed: r.speed,
            eta: r.eta,
            size: r.size,
        }
    }
}

fn backend() -> Arc<dyn MediaBackend> {
    match YtDlpCli::locate() {
        Ok(cli) => {
            info!(path = %cli.path().display(), "using yt-dlp");
            Arc::new(cli)
        }
        Err(e) => {
            // items fail individually until yt-dlp shows up on PATH
            warn!("{}", e);
            Arc::new(YtDlpCli::with_path(ToolType::YtDlp.binary_name()))
        }
    }
}

#[tauri::command]
async fn add_items(input: String, state: State<'_, AppState>) -> Result<Vec<RowView>, String> {
    let rows = state.queue.add(&input).await;
    Ok(rows.into_iter().map(RowView::from).collect())
}

#[tauri::command]
fn queue_rows(state: State<'_, AppState>) -> Vec<RowView> {
    state.queue.rows().into_iter().map(RowView::from).collect()
}

#[tauri::command]
fn start_queue(state: State<'_, AppState>) -> bool {
    state.queue.start()
}

/// Off the main thread; the worker finishes its current item on its own.
#[tauri::command]
async fn stop_queue(state: State<'_, AppState>) -> Result<(), String> {
    state.queue.stop();
    Ok(())
}

#[tauri::command]
fn clear_queue(state: State<'_, AppState>) {
    state.queue.clear();
}

#[tauri::command]
fn get_settings(state: State<'_, AppState>) -> Settings {
    state.queue.settings()
}

#[tauri::command]
fn update_settings(settings: Settings, state: State<'_, AppState>) -> Result<(), String> {
    std::fs::create_dir_all(&settings.output_dir).map_err(|e| e.to_string())?;
    state.queue.update_settings(settings);
    Ok(())
}

#[tauri::command]
fn audio_formats() -> Vec<&'static str> {
    AudioFormat::ALL.iter().map(AudioFormat::as_str).collect()
}

#[tauri::command]
fn list_library(state: State<'_, AppState>) -> Result<Vec<LibraryEntry>, String> {
    library::list_library(&state.queue.settings().output_dir).map_err(|e| e.to_string())
}

#[tauri::command]
fn open_library_entry(path: PathBuf) -> Result<(), String> {
    library::open_entry(&path).map_err(|e| e.to_string())
}

#[tauri::command]
fn app_info() -> AppInfo {
    APP_INFO
}

#[tauri::command]
fn status_line() -> String {
    APP_INFO.status_line()
}

#[tauri::command]
fn donate_url() -> String {
    APP_INFO.donate_url()
}

#[tauri::command]
async fn tools_status() -> Result<Vec<ToolInfo>, String> {
    Ok(ToolManager::new().get_all_tools())
}

/// Installation advice when ffmpeg is missing, `None` when it is usable.
#[tauri::command]
fn ffmpeg_advice() -> Option<String> {
    ensure_ffmpeg_available().err().map(|e| e.to_string())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            let settings = Arc::new(RwLock::new(Settings::default()));
            let sink = Arc::new(TauriSink { app: app.handle().clone() });
            app.manage(AppState {
                queue: DownloadQueue::new(backend(), settings, sink),
            });
            if let Some(window) = app.get_webview_window("main") {
                let _ = window.set_title(&APP_INFO.window_title());
            }
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            add_items,
            queue_rows,
            start_queue,
            stop_queue,
            clear_queue,
            get_settings,
            update_settings,
            audio_formats,
            list_library,
            open_library_entry,
            app_info,
            status_line,
            donate_url,
            tools_status,
            ffmpeg_advice,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
