use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{next_opened_at, SnapshotStore};
use crate::models::AvailabilitySnapshot;
use crate::utils::error::Result;

/// Process-local store with the same write rules as the SQLite one.
#[derive(Default)]
pub struct MemorySnapshotStore {
    rows: RwLock<BTreeMap<(String, String), AvailabilitySnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get_snapshot(&self, category: &str, location: &str) -> Result<Option<AvailabilitySnapshot>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&(category.to_string(), location.to_string())).cloned())
    }

    async fn put_snapshot(
        &self,
        category: &str,
        location: &str,
        has_slots: bool,
        slots_count: u32,
        checked_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let key = (category.to_string(), location.to_string());
        let prior = rows.get(&key);

        if prior.is_some_and(|p| p.last_checked > checked_at) {
            return Ok(false);
        }

        let opened_at = next_opened_at(prior, has_slots, checked_at);
        rows.insert(
            key,
            AvailabilitySnapshot {
                category: category.to_string(),
                location: location.to_string(),
                has_slots,
                slots_count,
                last_checked: checked_at,
                opened_at,
            },
        );
        Ok(true)
    }

    async fn list_snapshots(&self) -> Result<Vec<AvailabilitySnapshot>> {
        let rows = self.rows.read().await;
        Ok(rows.values().cloned().collect())
    }
}
