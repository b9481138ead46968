/// Core error type.
///
/// Adapter crates map their specific errors into this type so the bot core
/// can handle failures consistently (user-facing message vs fatal). Password
/// mismatches are NOT errors; they are ordinary [`crate::auth::AuthOutcome`]
/// values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
