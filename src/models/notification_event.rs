use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AvailabilityResult, CheckTarget, DaySlots};

const MAX_DATES_SHOWN: usize = 3;
const MAX_TIMES_SHOWN: usize = 2;

/// Emitted when a key goes from no availability to some.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationEvent {
    pub category: String,
    pub category_name: String,
    pub location: String,
    pub previous_has_slots: bool,
    pub new_has_slots: bool,
    pub slots_count: u32,
    pub occurred_at: DateTime<Utc>,
    pub days: Vec<DaySlots>,
}

impl NotificationEvent {
    pub fn opened(target: &CheckTarget, result: &AvailabilityResult, occurred_at: DateTime<Utc>) -> Self {
        Self {
            category: target.category.key.clone(),
            category_name: target.category.name.clone(),
            location: target.location.name.clone(),
            previous_has_slots: false,
            new_has_slots: result.has_slots,
            slots_count: result.slots_count,
            occurred_at,
            days: result.days.clone(),
        }
    }

    pub fn key(&self) -> (String, String) {
        (self.category.clone(), self.location.clone())
    }

    pub fn title(&self) -> String {
        "New DMV appointment available!".to_string()
    }

    /// Multi-line summary: the first few dates with their first few times.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            self.category_name.clone(),
            self.location.clone(),
            format!("Available slots: {}", self.slots_count),
        ];

        for day in self.days.iter().take(MAX_DATES_SHOWN) {
            let mut times = day
                .times
                .iter()
                .take(MAX_TIMES_SHOWN)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            if day.times.len() > MAX_TIMES_SHOWN {
                times.push_str(&format!(" (+{} more)", day.times.len() - MAX_TIMES_SHOWN));
            }
            lines.push(format!("{}: {}", day.date, times));
        }

        if self.days.len() > MAX_DATES_SHOWN {
            lines.push(format!("(+{} more dates)", self.days.len() - MAX_DATES_SHOWN));
        }

        lines.join("\n")
    }
}
