use thiserror::Error;

/// Errors surfaced by the core wifiology pipeline (decode, aggregate, store).
///
/// Frame-level decode problems are not represented here: a single frame that
/// fails to parse is logged and skipped by the caller (it bumps
/// `weird_frame_count`), it never becomes a `WifiologyError`.
#[derive(Debug, Error)]
pub enum WifiologyError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("capture device error: {0}")]
    Capture(String),

    #[error("radio control error: {0}")]
    Radio(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("upload request failed: {0}")]
    Upload(String),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, WifiologyError>;
