use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Media not found: {0}")]
    MediaNotFound(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid data from provider: {0}")]
    InvalidData(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // Map "no rows" to MediaNotFound
            sqlx::Error::RowNotFound => Self::MediaNotFound("Row not found".to_string()),
            _ => Self::Database(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
