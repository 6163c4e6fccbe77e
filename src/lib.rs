pub mod app_info;
pub mod downloader;
pub mod library;
pub mod logging;
pub mod uploader;

#[cfg(feature = "gui")]
pub mod gui;

pub use app_info::APP_INFO;

#[cfg(feature = "gui")]
pub use gui::run;
