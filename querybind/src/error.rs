//! Error types for compilation, binding and engine execution

/// Errors surfaced to callers of the compiler and the relation binder.
///
/// Per-field read and conversion failures never appear here; they are logged
/// and the field is dropped.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// The caller asked for a configuration that cannot be honored.
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl BindError {
    pub fn invalid_usage(msg: impl Into<String>) -> Self {
        BindError::InvalidUsage(msg.into())
    }
}

/// Errors raised by a [`QueryEngine`](crate::engine::QueryEngine).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unsupported query: {0}")]
    Unsupported(String),

    #[error("Failed to decode column {column}: {message}")]
    Decode { column: String, message: String },
}

pub type Result<T, E = BindError> = std::result::Result<T, E>;
