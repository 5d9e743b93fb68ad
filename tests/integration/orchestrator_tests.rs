use slot_watcher::storage::SnapshotStore;
use std::time::Duration;

use super::navigator_tests::cary_site;
use super::*;

fn slots_site() -> FakeSite {
    cary_site().with_calendar("Boone", vec![FakeMonth::new("March", 2026, vec![(9, vec!["1:00 PM"])])])
}

#[tokio::test(start_paused = true)]
async fn test_cycle_persists_snapshots_and_notifies_on_opening() -> anyhow::Result<()> {
    let config = test_config(&["id_card"], &["Cary", "Wilson"]);
    let mut h = Harness::new(&config, cary_site());

    let result = h.orchestrator.run_cycle(&h.shutdown_rx).await;
    assert_eq!(result.targets_total, 2);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.with_slots, 1);
    assert_eq!(result.notifications_emitted, 1);

    let events = h.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key(), ("id_card".to_string(), "Cary".to_string()));
    assert!(!events[0].previous_has_slots);
    assert_eq!(events[0].slots_count, 3);

    let cary = h.store.get_snapshot("id_card", "Cary").await?.expect("Cary snapshot");
    assert!(cary.has_slots);
    assert_eq!(cary.slots_count, 3);
    assert!(cary.opened_at.is_some());
    let wilson = h.store.get_snapshot("id_card", "Wilson").await?.expect("Wilson snapshot");
    assert!(!wilson.has_slots);
    assert_eq!(wilson.slots_count, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_notification_only_on_false_to_true_edge() -> anyhow::Result<()> {
    let config = test_config(&["id_card"], &["Cary"]);
    let mut h = Harness::new(&config, cary_site());

    h.orchestrator.run_cycle(&h.shutdown_rx).await;
    assert_eq!(h.drain_events().len(), 1);

    // Still open: no repeat
    let result = h.orchestrator.run_cycle(&h.shutdown_rx).await;
    assert_eq!(result.notifications_emitted, 0);
    assert!(h.drain_events().is_empty());

    // Closes: recorded, silent
    h.site.set_offices("ID Card", &["Boone"]);
    let result = h.orchestrator.run_cycle(&h.shutdown_rx).await;
    assert_eq!(result.succeeded, 1);
    assert!(h.drain_events().is_empty());
    assert!(!h.store.get_snapshot("id_card", "Cary").await?.unwrap().has_slots);

    // Reopens: notified again
    h.site.set_offices("ID Card", &["Cary", "Boone"]);
    let result = h.orchestrator.run_cycle(&h.shutdown_rx).await;
    assert_eq!(result.notifications_emitted, 1);
    assert_eq!(h.drain_events().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_are_retried_up_to_bound() -> anyhow::Result<()> {
    let config = test_config(&["id_card"], &["Cary", "Boone"]);
    let mut h = Harness::new(&config, slots_site().with_behavior("Cary", Behavior::Hang));

    let result = h.orchestrator.run_cycle(&h.shutdown_rx).await;

    assert_eq!(h.site.location_clicks("Cary"), 3);
    assert_eq!(result.failed, 1);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.attempts, 4);
    assert!(h.store.get_snapshot("id_card", "Cary").await?.is_none());
    assert!(h.store.get_snapshot("id_card", "Boone").await?.unwrap().has_slots);

    let events = h.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].location, "Boone");
    Ok(())
}

#[tokio::test]
async fn test_extraction_mismatch_is_not_retried_and_stays_isolated() -> anyhow::Result<()> {
    let config = test_config(&["id_card"], &["Cary", "Boone"]);
    let h = Harness::new(&config, slots_site().with_behavior("Cary", Behavior::Broken));

    let result = h.orchestrator.run_cycle(&h.shutdown_rx).await;

    assert_eq!(h.site.location_clicks("Cary"), 1);
    assert_eq!(result.extraction_mismatches, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.succeeded, 1);
    assert!(h.store.get_snapshot("id_card", "Cary").await?.is_none());
    assert!(h.store.get_snapshot("id_card", "Boone").await?.is_some());

    let stats = h.orchestrator.stats().await;
    assert_eq!(stats.extraction_mismatches, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_blocked_target_backs_off_without_snapshot() -> anyhow::Result<()> {
    let config = test_config(&["id_card"], &["Cary"]);
    let h = Harness::new(&config, cary_site().with_behavior("Cary", Behavior::Blocked));

    let result = h.orchestrator.run_cycle(&h.shutdown_rx).await;

    assert_eq!(result.blocked, 1);
    assert_eq!(result.attempts, 2);
    assert_eq!(h.site.location_clicks("Cary"), 2);
    assert!(h.store.list_snapshots().await?.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lost_session_is_relaunched_and_target_retried() -> anyhow::Result<()> {
    let config = test_config(&["id_card"], &["Cary", "Boone"]);
    let h = Harness::new(&config, slots_site().with_behavior("Cary", Behavior::CrashOnce));

    let result = h.orchestrator.run_cycle(&h.shutdown_rx).await;

    assert_eq!(result.succeeded, 2);
    assert_eq!(result.restarts_triggered, 1);
    assert_eq!(h.launcher.launches(), 2);
    assert!(h.store.get_snapshot("id_card", "Cary").await?.unwrap().has_slots);
    assert_eq!(h.site.pages_open(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_browser_restarts_after_configured_cycles() -> anyhow::Result<()> {
    let mut config = test_config(&["id_card"], &["Cary"]);
    config.browser.restart_after_cycles = 2;
    let h = Harness::new(&config, cary_site());

    let first = h.orchestrator.run_cycle(&h.shutdown_rx).await;
    let second = h.orchestrator.run_cycle(&h.shutdown_rx).await;
    assert_eq!(first.restarts_triggered, 0);
    assert_eq!(second.restarts_triggered, 1);
    assert_eq!(h.launcher.launches(), 1);

    h.orchestrator.run_cycle(&h.shutdown_rx).await;
    assert_eq!(h.launcher.launches(), 2);
    assert_eq!(h.session.status().await.generation, 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_browser_skips_cycle() -> anyhow::Result<()> {
    let config = test_config(&["id_card"], &["Cary", "Boone"]);
    let h = Harness::new(&config, cary_site());
    h.launcher.set_failing(true);

    let result = h.orchestrator.run_cycle(&h.shutdown_rx).await;

    assert!(result.session_unavailable);
    assert_eq!(result.skipped, 2);
    assert_eq!(result.succeeded, 0);
    assert!(h.store.list_snapshots().await?.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_run_gives_up_after_consecutive_session_failures() -> anyhow::Result<()> {
    let config = test_config(&["id_card"], &["Cary"]);
    let h = Harness::new(&config, cary_site());
    h.launcher.set_failing(true);

    let outcome = h.orchestrator.run(h.shutdown_rx.clone()).await;

    assert!(matches!(outcome, Err(AppError::SessionUnavailable(_))));
    let stats = h.orchestrator.stats().await;
    assert_eq!(stats.cycles_run, 2);
    assert_eq!(stats.consecutive_session_failures, 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_run_returns_immediately_when_already_shut_down() -> anyhow::Result<()> {
    let config = test_config(&["id_card"], &["Cary"]);
    let h = Harness::new(&config, cary_site());
    h.shutdown_tx.send(true)?;

    h.orchestrator.run(h.shutdown_rx.clone()).await?;

    assert_eq!(h.launcher.launches(), 0);
    assert_eq!(h.orchestrator.stats().await.cycles_run, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_backoff_and_skips_rest() -> anyhow::Result<()> {
    let mut config = test_config(&["id_card"], &["Cary", "Boone"]);
    config.retry.timeout.base_delay_ms = 1_000;
    config.retry.timeout.max_delay_ms = 1_000;
    let h = Harness::new(&config, slots_site().with_behavior("Cary", Behavior::Hang));

    let (result, sent) = tokio::join!(h.orchestrator.run_cycle(&h.shutdown_rx), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        h.shutdown_tx.send(true)
    });
    sent?;

    assert!(result.aborted);
    assert_eq!(result.skipped, 2);
    assert_eq!(h.site.location_clicks("Cary"), 1);
    assert_eq!(h.site.location_clicks("Boone"), 0);
    assert!(h.store.list_snapshots().await?.is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_last_backoff_marks_cycle_aborted() -> anyhow::Result<()> {
    let mut config = test_config(&["id_card"], &["Cary"]);
    config.retry.timeout.base_delay_ms = 1_000;
    config.retry.timeout.max_delay_ms = 1_000;
    let h = Harness::new(&config, cary_site().with_behavior("Cary", Behavior::Hang));

    let (result, sent) = tokio::join!(h.orchestrator.run_cycle(&h.shutdown_rx), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        h.shutdown_tx.send(true)
    });
    sent?;

    assert!(result.aborted);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.failed, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_closed_queue_counts_lost_notification() -> anyhow::Result<()> {
    let config = test_config(&["id_card"], &["Cary"]);
    let h = Harness::new(&config, cary_site());
    drop(h.events);

    let result = h.orchestrator.run_cycle(&h.shutdown_rx).await;

    assert_eq!(result.succeeded, 1);
    assert_eq!(result.with_slots, 1);
    assert_eq!(result.notifications_emitted, 0);
    assert_eq!(result.notifications_failed, 1);
    assert!(h.store.get_snapshot("id_card", "Cary").await?.expect("Cary snapshot").has_slots);

    let stats = h.orchestrator.stats().await;
    assert_eq!(stats.notifications_failed, 1);
    assert_eq!(stats.notifications_emitted, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rotating_window_covers_every_target() -> anyhow::Result<()> {
    let mut config = test_config(&["id_card"], &["Cary", "Boone", "Wilson"]);
    config.crawler.max_targets_per_cycle = Some(2);
    let site = cary_site();
    site.set_offices("ID Card", &["Cary", "Boone", "Wilson"]);
    let h = Harness::new(&config, site);

    let first = h.orchestrator.run_cycle(&h.shutdown_rx).await;
    assert_eq!(first.targets_total, 2);
    assert!(h.store.get_snapshot("id_card", "Wilson").await?.is_none());

    let second = h.orchestrator.run_cycle(&h.shutdown_rx).await;
    assert_eq!(second.targets_total, 2);
    assert!(h.store.get_snapshot("id_card", "Wilson").await?.is_some());

    assert_eq!(h.site.location_clicks("Cary"), 2);
    assert_eq!(h.site.location_clicks("Boone"), 1);
    assert_eq!(h.site.location_clicks("Wilson"), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lanes_use_their_own_pages() -> anyhow::Result<()> {
    let mut config = test_config(&["id_card", "permits"], &["Cary"]);
    config.crawler.concurrency = 2;
    let mut h = Harness::new(&config, cary_site());

    let result = h.orchestrator.run_cycle(&h.shutdown_rx).await;

    assert_eq!(result.succeeded, 2);
    assert_eq!(h.site.gotos(), 2);
    assert_eq!(h.site.pages_open(), 0);
    assert_eq!(h.launcher.launches(), 1);
    assert_eq!(h.drain_events().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_failures_leave_diagnostics_behind() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = test_config(&["id_card"], &["Cary"]);
    config.diagnostics.enabled = true;
    config.diagnostics.directory = dir.path().to_string_lossy().to_string();
    let h = Harness::new(&config, cary_site().with_behavior("Cary", Behavior::Broken));

    h.orchestrator.run_cycle(&h.shutdown_rx).await;

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir.path())? {
        names.push(entry?.file_name().to_string_lossy().to_string());
    }
    assert!(names.iter().any(|n| n.ends_with(".png")));

    let record = names.iter().find(|n| n.ends_with(".json")).expect("diagnostic record");
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(dir.path().join(record))?)?;
    assert_eq!(json["error_class"], "mismatch");
    assert_eq!(json["target"], "id_card@Cary");
    assert!(json["dom_excerpt"].as_str().unwrap().contains("new-calendar"));
    Ok(())
}
