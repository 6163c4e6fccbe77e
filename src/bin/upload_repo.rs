// Upload the current directory to a GitHub repository.
//
// Reads GITHUB_TOKEN and GITHUB_REPO (required) plus the optional
// GITHUB_BRANCH, GITHUB_TOPICS, GITHUB_DESCRIPTION and GITHUB_HOMEPAGE.

use anyhow::Context;
use tracing::error;

use yt_audio_lib::logging::init_tracing;
use yt_audio_lib::uploader::{run_upload, GithubApi, UploadConfig};

async fn upload() -> anyhow::Result<usize> {
    let config = UploadConfig::from_env()?;
    let api = GithubApi::new(&config.token, &config.repo, &config.branch)?;
    let root = std::env::current_dir().context("cannot read the working directory")?;
    let count = run_upload(&api, &config, &root)
        .await
        .with_context(|| format!("upload to {} aborted", config.repo))?;
    Ok(count)
}

#[tokio::main]
async fn main() {
    init_tracing();
    match upload().await {
        Ok(count) => println!("Uploaded all files ({}).", count),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
