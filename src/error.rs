use std::fmt;

use thiserror::Error;

/// Why a manifest or listing payload could not be turned into entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("empty manifest response")]
    Empty,

    #[error("received HTML instead of JSON (check the URL, the file may not exist)")]
    UnexpectedHtml,

    #[error("manifest must be a JSON object, got {0}")]
    WrongShape(&'static str),

    #[error("invalid JSON: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unrecognised repository URL: {0}")]
    InvalidRepoUrl(String),

    #[error("unsupported provider: {0} (use GitHub, GitLab, Gitea or Codeberg)")]
    UnsupportedProvider(String),

    #[error("HTTP {status}: {body}")]
    FetchFailure { status: u16, body: String },

    #[error("{folder}/ folder not found: {message}")]
    FolderNotFound { folder: String, message: String },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error(transparent)]
    Parse(#[from] ParseFailure),

    #[error("failed to hash {filename}: {reason}")]
    HashCompute { filename: String, reason: String },

    #[error("failed to download {filename}: {reason}")]
    Download { filename: String, reason: String },

    #[error("failed to load managed state: {0}")]
    StateLoad(String),

    #[error("failed to save managed state: {0}")]
    StatePersist(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SyncError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn download(filename: &str, reason: impl fmt::Display) -> Self {
        SyncError::Download {
            filename: filename.to_owned(),
            reason: reason.to_string(),
        }
    }
}
