use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a single target ended within a cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetOutcome {
    /// Snapshot written, with or without availability.
    Checked { has_slots: bool, notified: bool },
    /// Site refused every attempt; no snapshot written.
    Blocked,
    /// Retries exhausted or a hard failure; diagnostics captured.
    Failed,
    /// Not attempted (shutdown or unavailable session).
    Skipped,
}

impl TargetOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TargetOutcome::Checked { .. } => "checked",
            TargetOutcome::Blocked => "blocked",
            TargetOutcome::Failed => "failed",
            TargetOutcome::Skipped => "skipped",
        }
    }
}

/// Per-cycle bookkeeping; logged, never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CrawlCycleResult {
    pub cycle: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub targets_total: usize,
    pub succeeded: usize,
    pub with_slots: usize,
    pub failed: usize,
    pub blocked: usize,
    pub skipped: usize,
    pub extraction_mismatches: usize,
    pub attempts: usize,
    pub notifications_emitted: usize,
    /// Openings recorded in the store whose event never reached the queue.
    pub notifications_failed: usize,
    pub restarts_triggered: usize,
    pub session_unavailable: bool,
    pub aborted: bool,
}

impl CrawlCycleResult {
    pub fn new(cycle: u64, targets_total: usize) -> Self {
        Self {
            cycle,
            started_at: Some(Utc::now()),
            targets_total,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: TargetOutcome) {
        match outcome {
            TargetOutcome::Checked { has_slots, notified } => {
                self.succeeded += 1;
                if has_slots {
                    self.with_slots += 1;
                }
                if notified {
                    self.notifications_emitted += 1;
                }
            }
            TargetOutcome::Blocked => self.blocked += 1,
            TargetOutcome::Failed => self.failed += 1,
            TargetOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Folds a worker's partial result into the cycle total.
    pub fn merge(&mut self, other: &CrawlCycleResult) {
        self.succeeded += other.succeeded;
        self.with_slots += other.with_slots;
        self.failed += other.failed;
        self.blocked += other.blocked;
        self.skipped += other.skipped;
        self.extraction_mismatches += other.extraction_mismatches;
        self.attempts += other.attempts;
        self.notifications_emitted += other.notifications_emitted;
        self.notifications_failed += other.notifications_failed;
        self.restarts_triggered += other.restarts_triggered;
        self.session_unavailable |= other.session_unavailable;
        self.aborted |= other.aborted;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> i64 {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0),
            _ => 0,
        }
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.blocked + self.skipped
    }
}
