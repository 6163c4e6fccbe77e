// Upload utility - push a working tree to a GitHub repository through the
// contents API, one request per file.

pub mod config;
pub mod files;
pub mod github;

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;
use tracing::info;

pub use config::UploadConfig;
pub use github::{ContentApi, GithubApi, PutFileRequest, RepoPatch};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid API url: {0}")]
    InvalidUrl(String),

    #[error("{context}: HTTP {status}: {body}")]
    Api { context: String, status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Commit message used for every uploaded file.
pub fn commit_message(path: &str) -> String {
    format!("Add {}", path)
}

/// Create-or-update request for one file. `sha` is the existing blob hash, if any.
pub fn put_request(path: &str, bytes: &[u8], branch: &str, sha: Option<String>) -> PutFileRequest {
    PutFileRequest {
        message: commit_message(path),
        content: STANDARD.encode(bytes),
        branch: branch.to_string(),
        sha,
    }
}

/// Upload every file under `root`.
///
/// Topics and repository metadata are applied first. The first failed request
/// aborts the run; files already written stay written. Returns the number of
/// files uploaded.
pub async fn run_upload(api: &dyn ContentApi, config: &UploadConfig, root: &Path) -> Result<usize, UploadError> {
    if !config.topics.is_empty() {
        info!(topics = ?config.topics, "setting repository topics");
        api.set_topics(&config.topics).await?;
        println!("Updated repository topics.");
    }
    if config.wants_metadata_patch() {
        info!("updating repository metadata");
        api.patch_repo(&RepoPatch {
            description: config.description.clone(),
            homepage: config.homepage.clone(),
        })
        .await?;
        println!("Updated repository metadata.");
    }

    let files = files::collect_files(root)?;
    for rel in &files {
        let path = files::repo_path(rel);
        let full = root.join(rel);
        let bytes = tokio::fs::read(&full)
            .await
            .map_err(|source| UploadError::Io { path: full.clone(), source })?;

        let sha = api.fetch_sha(&path).await?;
        println!("Uploading {}", path);
        api.put_file(&path, &put_request(&path, &bytes, &config.branch, sha)).await?;
    }
    info!(count = files.len(), repo = %config.repo, "upload finished");
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::fs;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Topics(Vec<String>),
        Patch(RepoPatch),
        Fetch(String),
        Put(String, serde_json::Value),
    }

    #[derive(Default)]
    struct RecordingApi {
        existing: HashMap<String, String>,
        fail_on: Option<String>,
        calls: Mutex<Vec<Call>>,
    }

    #[async_trait]
    impl ContentApi for RecordingApi {
        async fn fetch_sha(&self, path: &str) -> Result<Option<String>, UploadError> {
            self.calls.lock().push(Call::Fetch(path.to_string()));
            Ok(self.existing.get(path).cloned())
        }

        async fn put_file(&self, path: &str, request: &PutFileRequest) -> Result<(), UploadError> {
            let body = serde_json::to_value(request).unwrap();
            self.calls.lock().push(Call::Put(path.to_string(), body));
            if self.fail_on.as_deref() == Some(path) {
                return Err(UploadError::Api {
                    context: path.to_string(),
                    status: 422,
                    body: "conflict".into(),
                });
            }
            Ok(())
        }

        async fn set_topics(&self, topics: &[String]) -> Result<(), UploadError> {
            self.calls.lock().push(Call::Topics(topics.to_vec()));
            if self.fail_on.as_deref() == Some("topics") {
                return Err(UploadError::Api {
                    context: "topics".into(),
                    status: 403,
                    body: "forbidden".into(),
                });
            }
            Ok(())
        }

        async fn patch_repo(&self, patch: &RepoPatch) -> Result<(), UploadError> {
            self.calls.lock().push(Call::Patch(patch.clone()));
            Ok(())
        }
    }

    fn config() -> UploadConfig {
        UploadConfig {
            token: "t".into(),
            repo: "me/repo".into(),
            branch: "dev".into(),
            topics: Vec::new(),
            description: None,
            homepage: None,
        }
    }

    fn tree(files: &[&str]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for f in files {
            let path = tmp.path().join(f);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"hi").unwrap();
        }
        tmp
    }

    #[tokio::test]
    async fn existing_file_sends_its_sha() {
        let tmp = tree(&["a.txt"]);
        let api = RecordingApi {
            existing: HashMap::from([("a.txt".to_string(), "abc123".to_string())]),
            ..Default::default()
        };

        assert_eq!(run_upload(&api, &config(), tmp.path()).await.unwrap(), 1);

        let calls = api.calls.lock();
        assert_eq!(calls[0], Call::Fetch("a.txt".into()));
        let Call::Put(path, body) = &calls[1] else {
            panic!("expected a put, got {:?}", calls[1]);
        };
        assert_eq!(path, "a.txt");
        assert_eq!(body["sha"], "abc123");
        assert_eq!(body["message"], "Add a.txt");
        assert_eq!(body["branch"], "dev");
        assert_eq!(body["content"], "aGk=");
    }

    #[tokio::test]
    async fn new_file_omits_sha() {
        let tmp = tree(&["sub/new.txt"]);
        let api = RecordingApi::default();

        run_upload(&api, &config(), tmp.path()).await.unwrap();

        let calls = api.calls.lock();
        assert_eq!(calls.len(), 2);
        let Call::Put(path, body) = &calls[1] else {
            panic!("expected a put, got {:?}", calls[1]);
        };
        assert_eq!(path, "sub/new.txt");
        assert!(body.get("sha").is_none());
    }

    #[tokio::test]
    async fn metadata_goes_before_files() {
        let tmp = tree(&["a.txt"]);
        let api = RecordingApi::default();
        let cfg = UploadConfig {
            topics: vec!["audio".into()],
            description: Some("desc".into()),
            ..config()
        };

        run_upload(&api, &cfg, tmp.path()).await.unwrap();

        let calls = api.calls.lock();
        assert_eq!(calls[0], Call::Topics(vec!["audio".into()]));
        assert_eq!(
            calls[1],
            Call::Patch(RepoPatch { description: Some("desc".into()), homepage: None })
        );
        assert_eq!(calls[2], Call::Fetch("a.txt".into()));
    }

    #[tokio::test]
    async fn rejected_topics_stop_before_metadata_and_files() {
        let tmp = tree(&["a.txt"]);
        let api = RecordingApi {
            fail_on: Some("topics".into()),
            ..Default::default()
        };
        let cfg = UploadConfig {
            topics: vec!["audio".into()],
            homepage: Some("https://x".into()),
            ..config()
        };

        let err = run_upload(&api, &cfg, tmp.path()).await.unwrap_err();
        assert!(matches!(err, UploadError::Api { status: 403, .. }));
        assert_eq!(*api.calls.lock(), vec![Call::Topics(vec!["audio".into()])]);
    }

    #[tokio::test]
    async fn first_failure_aborts_the_walk() {
        let tmp = tree(&["a.txt", "b.txt", "c.txt"]);
        let api = RecordingApi {
            fail_on: Some("b.txt".into()),
            ..Default::default()
        };

        let err = run_upload(&api, &config(), tmp.path()).await.unwrap_err();
        assert!(matches!(err, UploadError::Api { status: 422, .. }));

        let calls = api.calls.lock();
        assert!(!calls.iter().any(|c| matches!(c, Call::Fetch(p) if p == "c.txt")));
    }
}
