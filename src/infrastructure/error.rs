use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("not authorized")]
    NotAuthorized,
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    #[error("save failed: {0}")]
    SaveFailed(String),
    #[error("not found: {0}")]
    NotFound(String),
}
