// error.rs - Error types for every stage of the compression pipeline

use std::path::PathBuf;

/// Invalid `IMAGE_SQUEEZER_*` environment overrides.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: expected {expected}, got `{value}`")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Failures while accepting a file, before anything reaches the codec worker.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unrecognized image format for {0}")]
    UnknownFormat(String),

    #[error("Failed to read dimensions of {file_name}: {message}")]
    Dimensions { file_name: String, message: String },

    #[error("Sample image not found at {0} (or its alternate spelling)")]
    SampleMissing(PathBuf),
}

/// Failures inside the codec or on the worker channel.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Unsupported format: {0}")]
    Unsupported(String),

    #[error("Failed to decode: {0}")]
    Decode(String),

    #[error("Failed to encode {mime}: {message}")]
    Encode { mime: String, message: String },

    #[error("Invalid target size {width}x{height}")]
    InvalidTarget { width: u32, height: u32 },

    /// Terminal `error` message sent back by the worker.
    #[error("{0}")]
    Worker(String),

    #[error("Codec worker is not running")]
    WorkerGone,
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Nothing to archive: no successfully processed images")]
    Empty,

    #[error("Failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to write archive: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("Failed to create dir {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Save failed for {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No {0} variant available")]
    MissingVariant(&'static str),
}
