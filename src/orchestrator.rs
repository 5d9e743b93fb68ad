//! The crawl control loop.
//!
//! Each cycle takes a batch of check targets, splits it into at most
//! `crawler.concurrency` lanes (one page each, whole categories per lane so
//! navigation can be reused), runs every target through the retry policy and
//! records the outcome. Per-target failures stay inside the cycle; only a
//! browser that cannot be started aborts it.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

use crate::catalog;
use crate::config::{AppConfig, CrawlerConfig, NavigationConfig, SiteConfig};
use crate::diagnostics::DiagnosticsRecorder;
use crate::extractor::Extractor;
use crate::models::{AvailabilityResult, CheckTarget, CrawlCycleResult, NotificationEvent, TargetOutcome};
use crate::navigator::{NavOutcome, Navigator};
use crate::notifications::NotificationSink;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::session::{PageLease, SessionManager};
use crate::storage::SnapshotStore;
use crate::trigger::ChangeDetector;
use crate::utils::error::{AppError, ErrorClass, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub cycles_run: u64,
    pub targets_succeeded: u64,
    pub targets_failed: u64,
    pub targets_blocked: u64,
    pub targets_skipped: u64,
    pub extraction_mismatches: u64,
    pub notifications_emitted: u64,
    pub notifications_failed: u64,
    pub restarts_triggered: u64,
    pub consecutive_session_failures: u32,
    pub last_cycle: Option<CrawlCycleResult>,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
}

impl OrchestratorStats {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            cycles_run: 0,
            targets_succeeded: 0,
            targets_failed: 0,
            targets_blocked: 0,
            targets_skipped: 0,
            extraction_mismatches: 0,
            notifications_emitted: 0,
            notifications_failed: 0,
            restarts_triggered: 0,
            consecutive_session_failures: 0,
            last_cycle: None,
            started_at,
            uptime_seconds: 0,
        }
    }

    fn record(&mut self, result: &CrawlCycleResult) {
        self.cycles_run += 1;
        self.targets_succeeded += result.succeeded as u64;
        self.targets_failed += result.failed as u64;
        self.targets_blocked += result.blocked as u64;
        self.targets_skipped += result.skipped as u64;
        self.extraction_mismatches += result.extraction_mismatches as u64;
        self.notifications_emitted += result.notifications_emitted as u64;
        self.notifications_failed += result.notifications_failed as u64;
        self.restarts_triggered += result.restarts_triggered as u64;
        if result.session_unavailable {
            self.consecutive_session_failures += 1;
        } else {
            self.consecutive_session_failures = 0;
        }
        self.last_cycle = Some(result.clone());
    }
}

/// Page plus the state machine driving it, held by one lane across targets.
struct Worker {
    lease: PageLease,
    navigator: Navigator,
}

/// Resolves once shutdown is requested; never resolves if the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Splits a batch into lanes, keeping each category's targets together and in order.
pub fn partition(batch: Vec<CheckTarget>, lanes: usize) -> Vec<Vec<CheckTarget>> {
    let lanes = lanes.max(1);
    let mut groups: Vec<Vec<CheckTarget>> = Vec::new();
    for target in batch {
        match groups.last_mut() {
            Some(group) if group[0].category.key == target.category.key => group.push(target),
            _ => groups.push(vec![target]),
        }
    }

    let mut out: Vec<Vec<CheckTarget>> = vec![Vec::new(); lanes];
    for (index, group) in groups.into_iter().enumerate() {
        out[index % lanes].extend(group);
    }
    out.retain(|lane| !lane.is_empty());
    out
}

pub struct Orchestrator {
    session: Arc<SessionManager>,
    detector: ChangeDetector,
    sink: Arc<dyn NotificationSink>,
    extractor: Arc<Extractor>,
    policy: RetryPolicy,
    diagnostics: Option<DiagnosticsRecorder>,
    site: Arc<SiteConfig>,
    navigation: NavigationConfig,
    crawler: CrawlerConfig,
    targets: Vec<CheckTarget>,
    cursor: AtomicUsize,
    cycle_counter: AtomicU64,
    stats: RwLock<OrchestratorStats>,
}

impl Orchestrator {
    pub fn new(
        config: &AppConfig,
        session: Arc<SessionManager>,
        store: Arc<dyn SnapshotStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let categories = catalog::select_categories(&config.crawler.categories)?;
        let locations = catalog::select_locations(&config.crawler.locations)?;
        let targets = catalog::enumerate_targets(&categories, &locations);

        Ok(Self {
            session,
            detector: ChangeDetector::new(store),
            sink,
            extractor: Arc::new(Extractor::new(&config.site)?),
            policy: RetryPolicy::new(config.retry.clone()),
            diagnostics: DiagnosticsRecorder::from_config(&config.diagnostics),
            site: Arc::new(config.site.clone()),
            navigation: config.navigation.clone(),
            crawler: config.crawler.clone(),
            targets,
            cursor: AtomicUsize::new(0),
            cycle_counter: AtomicU64::new(0),
            stats: RwLock::new(OrchestratorStats::new(Utc::now())),
        })
    }

    pub fn targets(&self) -> &[CheckTarget] {
        &self.targets
    }

    pub async fn stats(&self) -> OrchestratorStats {
        let mut stats = self.stats.read().await.clone();
        stats.uptime_seconds = Utc::now().signed_duration_since(stats.started_at).num_seconds().max(0) as u64;
        stats
    }

    /// Crawls until shutdown is signalled.
    ///
    /// Returns an error only after `max_failed_session_cycles` consecutive
    /// cycles could not obtain a browser.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(
            targets = self.targets.len(),
            concurrency = self.crawler.concurrency,
            interval_secs = self.crawler.cycle_interval_secs,
            "Crawl orchestrator started"
        );

        let outcome = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            let result = self.run_cycle(&shutdown).await;
            let mut pause = Duration::from_secs(self.crawler.cycle_interval_secs);

            if result.session_unavailable {
                let failures = self.stats.read().await.consecutive_session_failures;
                if failures >= self.crawler.max_failed_session_cycles {
                    tracing::error!(failures, "Browser could not be started for too many consecutive cycles");
                    break Err(AppError::SessionUnavailable(format!(
                        "no working browser for {} consecutive cycles",
                        failures
                    )));
                }
                pause += Duration::from_secs(self.crawler.session_cooldown_secs);
                tracing::warn!(failures, cooldown_secs = pause.as_secs(), "Browser unavailable, cooling down");
            }

            if result.aborted {
                break Ok(());
            }

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = wait_for_shutdown(&mut shutdown) => break Ok(()),
            }
        };

        self.session.shutdown().await;
        tracing::info!("Crawl orchestrator stopped");
        outcome
    }

    /// One pass over the next batch of targets.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> CrawlCycleResult {
        let cycle = self.cycle_counter.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(diagnostics) = &self.diagnostics {
            if let Err(e) = diagnostics.prune_expired().await {
                tracing::warn!(error = %e, "Failed to prune diagnostics");
            }
        }

        let batch = self.next_batch();
        let mut result = CrawlCycleResult::new(cycle, batch.len());
        tracing::info!(cycle, targets = batch.len(), "Starting crawl cycle");

        let lanes = partition(batch, self.crawler.concurrency);
        let abort = AtomicBool::new(false);
        let partials = join_all(
            lanes
                .into_iter()
                .enumerate()
                .map(|(lane, targets)| self.run_lane(lane, targets, shutdown.clone(), &abort)),
        )
        .await;

        for partial in &partials {
            result.merge(partial);
        }

        if self.session.mark_cycle_completed().await {
            result.restarts_triggered += 1;
        }
        result.finish();

        metrics::histogram!("slot_watcher_cycle_duration_seconds").record(result.duration_ms() as f64 / 1000.0);
        tracing::info!(
            cycle,
            succeeded = result.succeeded,
            with_slots = result.with_slots,
            failed = result.failed,
            blocked = result.blocked,
            skipped = result.skipped,
            mismatches = result.extraction_mismatches,
            notifications = result.notifications_emitted,
            notifications_failed = result.notifications_failed,
            restarts = result.restarts_triggered,
            duration_ms = result.duration_ms(),
            "Crawl cycle finished"
        );

        self.stats.write().await.record(&result);
        result
    }

    /// Next window of targets; the full list unless a per-cycle cap is set.
    fn next_batch(&self) -> Vec<CheckTarget> {
        let total = self.targets.len();
        let size = match self.crawler.max_targets_per_cycle {
            Some(max) if max < total => max,
            _ => return self.targets.clone(),
        };

        let start = self.cursor.load(Ordering::SeqCst) % total;
        self.cursor.store((start + size) % total, Ordering::SeqCst);
        (0..size).map(|i| self.targets[(start + i) % total].clone()).collect()
    }

    async fn run_lane(
        &self,
        lane: usize,
        targets: Vec<CheckTarget>,
        mut shutdown: watch::Receiver<bool>,
        abort: &AtomicBool,
    ) -> CrawlCycleResult {
        let mut partial = CrawlCycleResult::default();
        let mut worker: Option<Worker> = None;
        let delay = Duration::from_millis(self.crawler.inter_target_delay_ms);

        for (index, target) in targets.iter().enumerate() {
            let stopping = *shutdown.borrow();
            if stopping || abort.load(Ordering::SeqCst) {
                partial.aborted |= stopping;
                for _ in index..targets.len() {
                    partial.record(TargetOutcome::Skipped);
                }
                break;
            }

            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let outcome = match self.process_target(target, &mut worker, &mut partial, &mut shutdown).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(lane, key = %target, error = %e, "Browser session unavailable, aborting cycle");
                    abort.store(true, Ordering::SeqCst);
                    partial.session_unavailable = true;
                    TargetOutcome::Skipped
                }
            };

            metrics::counter!("slot_watcher_targets_total", "outcome" => outcome.label()).increment(1);
            partial.record(outcome);
        }

        partial
    }

    /// Runs one target through the retry policy.
    ///
    /// Only `SessionUnavailable` escapes as an error; everything else ends in an outcome.
    async fn process_target(
        &self,
        target: &CheckTarget,
        worker: &mut Option<Worker>,
        partial: &mut CrawlCycleResult,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<TargetOutcome> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            partial.attempts += 1;

            let err = match self.attempt(target, worker).await {
                Ok((fresh, event)) => {
                    let notified = match event {
                        Some(event) => {
                            let queued = self.emit(event).await;
                            if !queued {
                                partial.notifications_failed += 1;
                            }
                            queued
                        }
                        None => false,
                    };
                    tracing::debug!(key = %target, attempt, has_slots = fresh.has_slots, slots_count = fresh.slots_count, "Target checked");
                    return Ok(TargetOutcome::Checked {
                        has_slots: fresh.has_slots,
                        notified,
                    });
                }
                Err(e @ AppError::SessionUnavailable(_)) => return Err(e),
                Err(e) => e,
            };

            let class = err.class();
            match self.policy.decide(class, attempt) {
                RetryDecision::Retry { delay, restart_session } => {
                    tracing::warn!(
                        key = %target,
                        attempt,
                        class = %class,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Target attempt failed, retrying"
                    );
                    if restart_session {
                        self.restart_session(worker, &err, partial).await;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = wait_for_shutdown(shutdown) => {
                            partial.aborted = true;
                            return Ok(TargetOutcome::Skipped);
                        }
                    }
                }
                RetryDecision::GiveUp => {
                    if class == ErrorClass::Mismatch {
                        partial.extraction_mismatches += 1;
                        tracing::error!(
                            key = %target,
                            error = %err,
                            "Page content no longer matches the extractor; site layout may have changed"
                        );
                    } else {
                        tracing::warn!(key = %target, attempts = attempt, class = %class, error = %err, "Giving up on target for this cycle");
                    }

                    self.capture_diagnostics(target, &err, worker.as_ref(), class).await;
                    if class == ErrorClass::Session {
                        self.restart_session(worker, &err, partial).await;
                    }

                    return Ok(if class == ErrorClass::Blocked {
                        TargetOutcome::Blocked
                    } else {
                        TargetOutcome::Failed
                    });
                }
            }
        }
    }

    /// acquire, navigate, extract, diff and persist
    async fn attempt(
        &self,
        target: &CheckTarget,
        worker: &mut Option<Worker>,
    ) -> Result<(AvailabilityResult, Option<NotificationEvent>)> {
        if let Some(current) = worker.as_ref() {
            if !self.session.is_current(current.lease.generation()).await {
                *worker = None;
            }
        }

        if worker.is_none() {
            let lease = self.session.acquire_page().await?;
            let navigator = Navigator::new(
                lease.page(),
                self.site.clone(),
                self.navigation.clone(),
                self.extractor.clone(),
            );
            *worker = Some(Worker { lease, navigator });
        }
        let Some(worker) = worker.as_mut() else {
            return Err(AppError::Internal("worker slot empty after acquire".to_string()));
        };

        let fresh = match worker.navigator.visit(target).await? {
            NavOutcome::Slots(days) => self.extractor.summarize(days),
            NavOutcome::NoSlots => AvailabilityResult::none(),
            NavOutcome::Blocked(reason) => return Err(AppError::Blocked { reason }),
        };

        let event = self.detector.process(target, &fresh, Utc::now()).await?;
        Ok((fresh, event))
    }

    /// The snapshot is already committed when this runs, so a failed emit
    /// leaves the full event in the error log and nowhere else.
    async fn emit(&self, event: NotificationEvent) -> bool {
        let (category, location) = event.key();
        match self.sink.emit(event.clone()).await {
            Ok(()) => {
                metrics::counter!("slot_watcher_notifications_total").increment(1);
                tracing::info!(%category, %location, "Availability opened, notification queued");
                true
            }
            Err(e) => {
                metrics::counter!("slot_watcher_notifications_failed_total").increment(1);
                let payload = serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event));
                tracing::error!(
                    %category,
                    %location,
                    error = %e,
                    %payload,
                    "Availability opened but notification was not queued"
                );
                false
            }
        }
    }

    async fn restart_session(&self, worker: &mut Option<Worker>, err: &AppError, partial: &mut CrawlCycleResult) {
        if let Some(stale) = worker.take() {
            if self.session.invalidate(stale.lease.generation(), &err.to_string()).await {
                partial.restarts_triggered += 1;
            }
        }
    }

    async fn capture_diagnostics(&self, target: &CheckTarget, err: &AppError, worker: Option<&Worker>, class: ErrorClass) {
        let Some(diagnostics) = &self.diagnostics else {
            return;
        };

        // A lost session has no page worth asking
        let page = worker.filter(|_| class != ErrorClass::Session).map(|w| w.lease.page());
        if let Err(e) = diagnostics.capture(target, err, page.as_deref()).await {
            tracing::warn!(key = %target, error = %e, "Failed to capture diagnostics");
        }
    }
}
