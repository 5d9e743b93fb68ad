use serde::{Deserialize, Serialize};

/// Bookable times read for one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaySlots {
    pub date: String,
    pub times: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AvailabilityResult {
    pub has_slots: bool,
    pub slots_count: u32,
    pub days: Vec<DaySlots>,
}

impl AvailabilityResult {
    pub fn none() -> Self {
        Self::default()
    }

    /// Days without any bookable time are dropped; `has_slots` follows the count.
    pub fn from_days(days: Vec<DaySlots>) -> Self {
        let days: Vec<DaySlots> = days.into_iter().filter(|d| !d.times.is_empty()).collect();
        let slots_count = days.iter().map(|d| d.times.len() as u32).sum();
        Self {
            has_slots: slots_count > 0,
            slots_count,
            days,
        }
    }
}
