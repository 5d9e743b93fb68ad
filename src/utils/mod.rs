pub mod error;

pub use error::{AppError, ErrorClass, Result};
