pub mod browser;
pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod extractor;
pub mod models;
pub mod navigator;
pub mod notifications;
pub mod orchestrator;
pub mod retry;
pub mod session;
pub mod storage;
pub mod trigger;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use orchestrator::Orchestrator;
pub use session::SessionManager;
pub use utils::error::{AppError, ErrorClass};

pub type Result<T> = std::result::Result<T, AppError>;
