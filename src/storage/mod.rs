//! Durable last-known availability, keyed by (category, location).

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::AvailabilitySnapshot;
use crate::utils::error::Result;

pub use memory::MemorySnapshotStore;
pub use sqlite::SqliteSnapshotStore;

/// Storage seam shared with the reporting side.
///
/// The crawler is the only writer. Writes are atomic per key and a write
/// older than the stored `last_checked` is dropped, so `last_checked` never
/// moves backwards.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get_snapshot(&self, category: &str, location: &str) -> Result<Option<AvailabilitySnapshot>>;

    /// Upserts the row for the key. Returns false when the write was older
    /// than the stored one and therefore ignored.
    async fn put_snapshot(
        &self,
        category: &str,
        location: &str,
        has_slots: bool,
        slots_count: u32,
        checked_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn list_snapshots(&self) -> Result<Vec<AvailabilitySnapshot>>;
}

/// `opened_at` for a write of `has_slots` at `checked_at` over `prior`.
pub(crate) fn next_opened_at(
    prior: Option<&AvailabilitySnapshot>,
    has_slots: bool,
    checked_at: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match prior {
        Some(prior) if prior.has_slots || !has_slots => prior.opened_at,
        _ if has_slots => Some(checked_at),
        _ => None,
    }
}
