use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("{0}")]
    Msg(String),

    /// A target's report could not be written. Never aborts the run.
    #[error("could not persist report for target {target} at {}: {source}", .path.display())]
    Persist {
        target: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Net(#[from] reqwest::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<anyhow::Error> for ScannerError {
    fn from(e: anyhow::Error) -> Self {
        // `{:#}` keeps the context chain ("create /scanout/x: File exists").
        ScannerError::Msg(format!("{e:#}"))
    }
}

pub type Result<T> = std::result::Result<T, ScannerError>;
