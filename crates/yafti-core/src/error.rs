use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum YaftiError {
    #[error("no configuration file found (searched: {})", display_paths(.searched))]
    ConfigNotFound { searched: Vec<PathBuf> },

    #[error("configuration unavailable at {}: {reason}", .path.display())]
    ConfigUnavailable { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("screen not found: {0}")]
    ScreenNotFound(usize),

    #[error("malformed selection: {0}")]
    MalformedSelection(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, YaftiError>;
