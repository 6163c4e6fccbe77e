// Downloader module - yt-dlp driving, option building and the download queue

pub mod errors;
pub mod models;
pub mod options;
pub mod progress;
pub mod queue;
pub mod tools;
pub mod traits;
pub mod utils;
pub mod worker;
pub mod ytdlp;

pub use errors::DownloadError;
pub use models::{AudioFormat, ItemStatus, MediaInfo, QueueItem, Settings, SharedSettings, WorkerEvent};
pub use options::{build_options, normalize_bitrate, OptionInputs, PostProcessor, UploaderFilter, YtDlpOptions};
pub use progress::{ConsoleReporter, ProgressEvent};
pub use queue::{DownloadQueue, QueueRow};
pub use traits::{EventSink, MediaBackend, ProgressHook};
pub use worker::DownloadWorker;
pub use ytdlp::YtDlpCli;
