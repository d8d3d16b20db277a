use serde::Serialize;

/// All errors that can occur while packaging, loading, or hosting viewer content.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("No content to display")]
    NoContent,

    #[error("Content is too large ({size} bytes, limit is {limit})")]
    ContentTooLarge { size: u64, limit: u64 },

    #[error("{0}")]
    Custom(String),
}

// Tauri requires error types to implement Serialize for IPC transport.
impl Serialize for ViewerError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ViewerError>;
