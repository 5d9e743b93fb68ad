use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last known availability for one (category, location) key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilitySnapshot {
    pub category: String,
    pub location: String,
    pub has_slots: bool,
    pub slots_count: u32,
    pub last_checked: DateTime<Utc>,
    /// Check time at which availability last went from none to some.
    pub opened_at: Option<DateTime<Utc>>,
}

impl AvailabilitySnapshot {
    pub fn key(&self) -> (String, String) {
        (self.category.clone(), self.location.clone())
    }
}
