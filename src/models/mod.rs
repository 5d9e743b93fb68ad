pub mod availability;
pub mod category;
pub mod cycle_result;
pub mod notification_event;
pub mod snapshot;

// Re-exports for convenience
pub use availability::*;
pub use category::*;
pub use cycle_result::*;
pub use notification_event::*;
pub use snapshot::*;
