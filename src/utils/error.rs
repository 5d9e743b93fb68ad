use thiserror::Error;

use crate::navigator::NavState;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Navigation timed out in state {state}")]
    NavigationTimeout { state: NavState },

    #[error("Blocked by site: {reason}")]
    Blocked { reason: String },

    #[error("Browser session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Extraction mismatch: {0}")]
    ExtractionMismatch(String),

    #[error("Browser error: {message}")]
    Browser { message: String, session_lost: bool },

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classes the retry policy reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Timeout,
    Blocked,
    Session,
    Mismatch,
    Transient,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Timeout => "timeout",
            ErrorClass::Blocked => "blocked",
            ErrorClass::Session => "session",
            ErrorClass::Mismatch => "mismatch",
            ErrorClass::Transient => "transient",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppError {
    pub fn browser(message: impl Into<String>) -> Self {
        let message = message.into();
        let session_lost = is_session_loss(&message);
        AppError::Browser { message, session_lost }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::NavigationTimeout { .. } => ErrorClass::Timeout,
            AppError::Blocked { .. } => ErrorClass::Blocked,
            AppError::SessionUnavailable(_) => ErrorClass::Session,
            AppError::Browser { session_lost: true, .. } => ErrorClass::Session,
            AppError::ExtractionMismatch(_) => ErrorClass::Mismatch,
            _ => ErrorClass::Transient,
        }
    }
}

// CDP messages seen when the tab, frame or websocket behind a page has gone away.
fn is_session_loss(message: &str) -> bool {
    const MARKERS: [&str; 8] = [
        "connection closed",
        "connection is closed",
        "channel closed",
        "no such target",
        "target closed",
        "detached",
        "browser has been closed",
        "websocket",
    ];
    let lower = message.to_ascii_lowercase();
    MARKERS.iter().any(|m| lower.contains(m))
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
