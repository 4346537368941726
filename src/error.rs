/// Errors produced while resolving references and decoding manifests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("unsupported layer compression: {0}")]
    UnsupportedCompression(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a single listing line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListingError {
    #[error("missing {0} field")]
    MissingField(&'static str),

    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid time: {0}")]
    InvalidTime(String),

    /// The line names the layer root itself (`/`, `.`, `./`).
    #[error("entry is the layer root")]
    RootEntry,
}
