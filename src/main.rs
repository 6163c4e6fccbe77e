// Console downloader: fetch audio for URLs or search terms with yt-dlp

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};

use yt_audio_lib::downloader::models::{default_output_dir, ARCHIVE_FILE_NAME};
use yt_audio_lib::downloader::tools::ensure_ffmpeg_available;
use yt_audio_lib::downloader::{
    build_options, AudioFormat, ConsoleReporter, DownloadError, MediaBackend, OptionInputs, YtDlpCli,
};
use yt_audio_lib::logging::init_tracing;

/// Download audio from video URLs or search terms.
#[derive(Debug, Parser)]
#[command(name = "yt-audio", version, about)]
struct Args {
    /// Video URLs or search terms
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output directory
    #[arg(short, long, default_value_os_t = default_output_dir())]
    output: PathBuf,

    /// Target audio format
    #[arg(short = 'f', long = "audio-format", alias = "format", value_enum, default_value_t = AudioFormat::Mp3)]
    audio_format: AudioFormat,

    /// Audio bitrate in kbps, e.g. 192 or 320k
    #[arg(short, long, default_value = "192")]
    bitrate: String,

    /// Embed the video thumbnail as cover art
    #[arg(long)]
    embed_thumbnail: bool,

    /// Do not write metadata tags
    #[arg(long)]
    no_metadata: bool,

    /// Netscape-format cookies file
    #[arg(long)]
    cookies: Option<PathBuf>,

    /// Only keep entries whose uploader/channel/artist contains this text
    #[arg(long)]
    only_artist: Option<String>,
}

async fn run(args: Args) -> Result<(), DownloadError> {
    std::fs::create_dir_all(&args.output)?;
    ensure_ffmpeg_available()?;
    let backend = YtDlpCli::locate()?;
    debug!(path = %backend.path().display(), "using yt-dlp");

    let inputs = OptionInputs {
        download_archive: Some(args.output.join(ARCHIVE_FILE_NAME)),
        output_dir: args.output.clone(),
        audio_format: args.audio_format,
        bitrate: args.bitrate,
        embed_thumbnail: args.embed_thumbnail,
        write_metadata: !args.no_metadata,
        cookies_file: args.cookies,
        uploader_filter: args.only_artist,
    };
    let options = build_options(&inputs);

    backend.download(&args.inputs, &options, &ConsoleReporter).await?;
    println!("\nAll done! Files saved to: {}", args.output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let result = tokio::select! {
        result = run(args) => result,
        _ = tokio::signal::ctrl_c() => Err(DownloadError::Interrupted),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(DownloadError::Interrupted) => {
            eprintln!("\nAborted by user.");
            ExitCode::from(130)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}
