//! Edge-triggered change detection over the snapshot store.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::models::{AvailabilityResult, AvailabilitySnapshot, CheckTarget, NotificationEvent};
use crate::storage::SnapshotStore;
use crate::utils::error::Result;

/// Fires only on a no-slots to slots transition. A key never seen before
/// counts as having had no slots.
pub fn should_notify(prior: Option<&AvailabilitySnapshot>, fresh: &AvailabilityResult) -> bool {
    let was_open = prior.map(|p| p.has_slots).unwrap_or(false);
    !was_open && fresh.has_slots
}

pub struct ChangeDetector {
    store: Arc<dyn SnapshotStore>,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    /// Compares `fresh` with the stored snapshot, then records it.
    ///
    /// The snapshot is written on every call so `last_checked` keeps
    /// advancing. An event is returned only once the write went through;
    /// a write rejected as out of order never produces one.
    pub async fn process(
        &self,
        target: &CheckTarget,
        fresh: &AvailabilityResult,
        checked_at: DateTime<Utc>,
    ) -> Result<Option<NotificationEvent>> {
        let (category, location) = (target.category.key.as_str(), target.location.name.as_str());

        let prior = self.store.get_snapshot(category, location).await?;
        let notify = should_notify(prior.as_ref(), fresh);

        let applied = self
            .store
            .put_snapshot(category, location, fresh.has_slots, fresh.slots_count, checked_at)
            .await?;

        tracing::debug!(
            key = %target,
            prior_has_slots = prior.as_ref().map(|p| p.has_slots),
            has_slots = fresh.has_slots,
            slots_count = fresh.slots_count,
            applied,
            "Snapshot recorded"
        );

        if notify && applied {
            Ok(Some(NotificationEvent::opened(target, fresh, checked_at)))
        } else {
            Ok(None)
        }
    }
}
