use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({error}, HTTP {status}): {message}")]
    Api {
        status: u16,
        error: String,
        message: String,
    },

    #[error("Unexpected response status: HTTP {0}")]
    UnexpectedStatus(u16),

    #[error("Server accepted the upload but did not return a Location header")]
    MissingLocation,

    #[error("Server returned an invalid download location: {0}")]
    InvalidLocation(String),

    #[error("Downloaded file not found: {0}")]
    TempFileMissing(PathBuf),

    #[error("Destination directory is not configured")]
    DestinationNotConfigured,

    #[error("Failed to create output directory {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to back up {path}: {source}")]
    Backup {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to move optimized image to {path}: {source}")]
    Placement {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to restore {original} from backup {backup}: {source}")]
    RollbackFailed {
        original: PathBuf,
        backup: PathBuf,
        source: std::io::Error,
    },

    #[error("No free file name in {directory} after {attempts} attempts")]
    CollisionLimitExceeded { directory: PathBuf, attempts: u32 },

    #[error("Processing was cancelled")]
    Cancelled,

    #[error("API key is not set. Use --api-key, TINIFY_API_KEY or `config set --api-key`")]
    MissingApiKey,

    #[error("Invalid settings file: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("No image files found in input path: {0}")]
    NoImageFilesFound(String),

    #[error("Walkdir error: {0}")]
    WalkdirError(#[from] walkdir::Error),
}

impl CompressionError {
    /// True for failures that happened after the server already compressed the image.
    pub fn is_placement_failure(&self) -> bool {
        matches!(
            self,
            CompressionError::TempFileMissing(_)
                | CompressionError::DestinationNotConfigured
                | CompressionError::DirectoryCreationFailed { .. }
                | CompressionError::Backup { .. }
                | CompressionError::Placement { .. }
                | CompressionError::RollbackFailed { .. }
                | CompressionError::CollisionLimitExceeded { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CompressionError>;
