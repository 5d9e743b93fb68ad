use std::time::Duration;

use slot_watcher::catalog;
use slot_watcher::models::{CheckTarget, DaySlots, Location};
use slot_watcher::navigator::{NavOutcome, NavState};
use slot_watcher::{AppError, ErrorClass};

use super::*;

pub fn target(category: &str, location: &str) -> CheckTarget {
    let category = catalog::find_category(category).expect("category in catalog");
    CheckTarget::new(category, Location::new(location))
}

/// ID Card offered at Cary (two months of openings) and Boone (none).
pub fn cary_site() -> FakeSite {
    FakeSite::new()
        .with_category("ID Card", &["Cary", "Boone"])
        .with_category("Permits", &["Cary"])
        .with_calendar(
            "Cary",
            vec![
                FakeMonth::new("March", 2026, vec![(4, vec!["8:00 AM", "8:15 AM"]), (6, vec![])]),
                FakeMonth::new("April", 2026, vec![(2, vec!["9:30 AM"])]),
            ],
        )
}

#[tokio::test(start_paused = true)]
async fn test_visit_reads_days_across_months() -> anyhow::Result<()> {
    let site = cary_site();
    let mut navigator = navigator_for(site.page());

    let outcome = navigator.visit(&target("id_card", "Cary")).await?;

    assert_eq!(
        outcome,
        NavOutcome::Slots(vec![
            DaySlots {
                date: "March 4, 2026".to_string(),
                times: vec!["8:00 AM".to_string(), "8:15 AM".to_string()],
            },
            DaySlots {
                date: "March 6, 2026".to_string(),
                times: vec![],
            },
            DaySlots {
                date: "April 2, 2026".to_string(),
                times: vec!["9:30 AM".to_string()],
            },
        ])
    );
    assert_eq!(navigator.state(), NavState::SlotsReady);
    assert_eq!(site.gotos(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_next_location_reuses_category_page() -> anyhow::Result<()> {
    let site = cary_site();
    let mut navigator = navigator_for(site.page());

    navigator.visit(&target("id_card", "Cary")).await?;
    let outcome = navigator.visit(&target("id_card", "Boone")).await?;

    assert_eq!(outcome, NavOutcome::Slots(vec![]));
    assert_eq!(site.gotos(), 1);
    assert_eq!(site.category_clicks("ID Card"), 1);
    assert_eq!(site.location_clicks("Boone"), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_category_switch_backs_out_to_list() -> anyhow::Result<()> {
    let site = cary_site();
    let mut navigator = navigator_for(site.page());

    navigator.visit(&target("id_card", "Cary")).await?;
    let outcome = navigator.visit(&target("permits", "Cary")).await?;

    assert!(matches!(outcome, NavOutcome::Slots(days) if days.len() == 3));
    assert_eq!(site.gotos(), 1);
    assert_eq!(site.category_clicks("Permits"), 1);
    assert_eq!(site.location_clicks("Cary"), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_select_category_is_idempotent() -> anyhow::Result<()> {
    let site = cary_site();
    let mut navigator = navigator_for(site.page());
    let id_card = catalog::find_category("id_card").unwrap();

    assert!(navigator.open().await?.is_none());
    assert!(navigator.select_category(&id_card).await?.is_none());
    assert!(navigator.select_category(&id_card).await?.is_none());
    assert!(navigator.open().await?.is_none());

    assert_eq!(navigator.state(), NavState::CategorySelected);
    assert_eq!(site.category_clicks("ID Card"), 1);
    assert_eq!(site.gotos(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_location_not_offered_means_no_slots() -> anyhow::Result<()> {
    let site = cary_site();
    let mut navigator = navigator_for(site.page());

    let outcome = navigator.visit(&target("permits", "Boone")).await?;

    assert_eq!(outcome, NavOutcome::NoSlots);
    assert_eq!(navigator.state(), NavState::CategorySelected);
    assert_eq!(site.location_clicks("Boone"), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_location_tile_must_match_whole_name() -> anyhow::Result<()> {
    let site = FakeSite::new().with_category("ID Card", &["Hendersonville"]).with_calendar(
        "Hendersonville",
        vec![FakeMonth::new("March", 2026, vec![(9, vec!["10:00 AM"])])],
    );
    let mut navigator = navigator_for(site.page());

    let outcome = navigator.visit(&target("id_card", "Henderson")).await?;

    assert_eq!(outcome, NavOutcome::NoSlots);
    assert_eq!(navigator.state(), NavState::CategorySelected);
    assert_eq!(site.location_clicks("Hendersonville"), 0);

    let outcome = navigator.visit(&target("id_card", "Hendersonville")).await?;
    assert!(matches!(outcome, NavOutcome::Slots(days) if days.len() == 1));
    assert_eq!(site.location_clicks("Hendersonville"), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_spinner_to_clear() -> anyhow::Result<()> {
    // hidden for two checks, then shown for three more after every click
    let site = cary_site().with_spinner(2, 3);
    let timing = NavigationConfig {
        spinner_appear_ms: 50,
        ..test_navigation()
    };
    let mut navigator = navigator_with(site.page(), timing);
    let id_card = catalog::find_category("id_card").unwrap();

    assert!(navigator.open().await?.is_none());
    let started = tokio::time::Instant::now();
    let checks_before = site.spinner_checks();
    assert!(navigator.select_category(&id_card).await?.is_none());

    assert_eq!(navigator.state(), NavState::CategorySelected);
    assert_eq!(site.spinner_checks() - checks_before, 6);
    assert!(started.elapsed() >= Duration::from_millis(40));

    let outcome = navigator.visit(&target("id_card", "Cary")).await?;
    assert!(matches!(outcome, NavOutcome::Slots(days) if days.len() == 3));
    assert_eq!(navigator.state(), NavState::SlotsReady);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stuck_spinner_times_out_in_current_state() -> anyhow::Result<()> {
    let site = cary_site().with_stuck_spinner();
    let mut navigator = navigator_for(site.page());

    let err = navigator.visit(&target("id_card", "Cary")).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::NavigationTimeout {
            state: NavState::CategoryList
        }
    ));
    assert_eq!(err.class(), ErrorClass::Timeout);
    assert_eq!(navigator.state(), NavState::Failed);
    assert_eq!(site.category_clicks("ID Card"), 1);
    assert_eq!(site.location_clicks("Cary"), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_timeout_reports_state_and_next_visit_reloads() -> anyhow::Result<()> {
    let site = cary_site().with_behavior("Cary", Behavior::Hang);
    let mut navigator = navigator_for(site.page());

    let err = navigator.visit(&target("id_card", "Cary")).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::NavigationTimeout {
            state: NavState::LocationSelected
        }
    ));
    assert_eq!(err.class(), ErrorClass::Timeout);
    assert_eq!(navigator.state(), NavState::Failed);

    site.set_behavior("Cary", Behavior::Normal);
    let outcome = navigator.visit(&target("id_card", "Cary")).await?;
    assert!(matches!(outcome, NavOutcome::Slots(_)));
    assert_eq!(site.gotos(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_error_page_is_reported_as_blocked() -> anyhow::Result<()> {
    let site = cary_site().with_behavior("Cary", Behavior::Blocked);
    let mut navigator = navigator_for(site.page());

    let outcome = navigator.visit(&target("id_card", "Cary")).await?;

    assert!(matches!(outcome, NavOutcome::Blocked(reason) if reason.contains("encountered an error")));
    assert_eq!(navigator.state(), NavState::Start);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_no_slots_banner_short_circuits() -> anyhow::Result<()> {
    let site = cary_site().with_behavior("Cary", Behavior::NoSlotsBanner);
    let mut navigator = navigator_for(site.page());

    let outcome = navigator.visit(&target("id_card", "Cary")).await?;

    assert_eq!(outcome, NavOutcome::NoSlots);
    assert!(!site.clicks().iter().any(|c| c.contains("selectDay")));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_calendar_is_extraction_mismatch() -> anyhow::Result<()> {
    let site = cary_site().with_behavior("Cary", Behavior::Broken);
    let mut navigator = navigator_for(site.page());

    let err = navigator.visit(&target("id_card", "Cary")).await.unwrap_err();

    assert!(matches!(err, AppError::ExtractionMismatch(_)));
    assert_eq!(err.class(), ErrorClass::Mismatch);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unlisted_category_is_extraction_mismatch() -> anyhow::Result<()> {
    let site = cary_site();
    let mut navigator = navigator_for(site.page());

    let err = navigator.visit(&target("fees", "Cary")).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::Mismatch);
    assert!(err.to_string().contains("Fees"));
    assert_eq!(navigator.state(), NavState::Failed);
    Ok(())
}
