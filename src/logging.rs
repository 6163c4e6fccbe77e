// Tracing setup shared by all binaries

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "yt_audio=info,yt_audio_lib=info,upload_repo=info,yt_audio_gui=info";

/// Install a stderr subscriber. Safe to call more than once.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
