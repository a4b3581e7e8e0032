//! Error types for source acquisition

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while staging submission sources
#[derive(Error, Debug)]
pub enum AcquisitionError {
    /// Filesystem failure, including a missing upload or an occupied target
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Non-2xx response or transport failure
    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },

    /// No usable `filename=` in the `content-disposition` header
    #[error("No filename in content-disposition of {url}")]
    MissingFilename { url: String },

    /// The archive did not unpack into the folder its filename announced
    #[error("Expected root folder {expected:?} after extraction, found {found:?}")]
    RootFolderMismatch { expected: String, found: Vec<String> },

    /// Flattening would overwrite an existing entry
    #[error("Cannot flatten sources: {0} already exists")]
    FlattenCollision(PathBuf),

    /// The submission lacks what its strategy needs
    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    /// `download()` called before a strategy was set
    #[error("No download strategy configured")]
    NoStrategyConfigured,

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl AcquisitionError {
    pub fn download(url: &str, message: impl ToString) -> Self {
        AcquisitionError::Download {
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<reqwest::Error> for AcquisitionError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        AcquisitionError::Download {
            url,
            message: err.to_string(),
        }
    }
}

/// Result type for acquisition operations
pub type AcquisitionResult<T> = std::result::Result<T, AcquisitionError>;
