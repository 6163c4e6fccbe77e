// Upload configuration read from GITHUB_* environment variables

use super::UploadError;

pub const TOKEN_VAR: &str = "GITHUB_TOKEN";
pub const REPO_VAR: &str = "GITHUB_REPO";
pub const BRANCH_VAR: &str = "GITHUB_BRANCH";
pub const TOPICS_VAR: &str = "GITHUB_TOPICS";
pub const DESCRIPTION_VAR: &str = "GITHUB_DESCRIPTION";
pub const HOMEPAGE_VAR: &str = "GITHUB_HOMEPAGE";

pub const DEFAULT_BRANCH: &str = "main";

/// Upload settings taken from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    pub token: String,
    /// `owner/name`
    pub repo: String,
    pub branch: String,
    pub topics: Vec<String>,
    pub description: Option<String>,
    pub homepage: Option<String>,
}

impl UploadConfig {
    pub fn from_env() -> Result<Self, UploadError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, UploadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let (Some(token), Some(repo)) = (get(TOKEN_VAR), get(REPO_VAR)) else {
            return Err(UploadError::MissingEnv(format!("{} or {}", TOKEN_VAR, REPO_VAR)));
        };

        let topics = get(TOPICS_VAR)
            .map(|csv| {
                csv.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            token,
            repo,
            branch: get(BRANCH_VAR).unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            topics,
            description: get(DESCRIPTION_VAR),
            homepage: get(HOMEPAGE_VAR),
        })
    }

    pub fn wants_metadata_patch(&self) -> bool {
        self.description.is_some() || self.homepage.is_some()
    }
}
