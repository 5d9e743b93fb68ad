//! Finite state machine driving one page through the scheduler UI:
//! home, category list, location list, calendar, time slots.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::browser::{Locator, Page};
use crate::config::{NavigationConfig, SiteConfig};
use crate::extractor::{Extractor, PageBanner};
use crate::models::{Category, CheckTarget, DaySlots, Location};
use crate::utils::error::{AppError, Result};

/// Position of the page inside the scheduler flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavState {
    /// Fresh page or unknown position; the next step reloads the site.
    Start,
    /// Appointment type list is shown.
    CategoryList,
    /// A category was picked and its location list is shown.
    CategorySelected,
    /// A location was picked and the date page is loading.
    LocationSelected,
    /// Date picker rendered.
    CalendarLoaded,
    /// Every reachable day has been read.
    SlotsReady,
    /// Absorbing until `reset`.
    Failed,
}

impl NavState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavState::Start => "start",
            NavState::CategoryList => "category_list",
            NavState::CategorySelected => "category_selected",
            NavState::LocationSelected => "location_selected",
            NavState::CalendarLoaded => "calendar_loaded",
            NavState::SlotsReady => "slots_ready",
            NavState::Failed => "failed",
        }
    }
}

impl fmt::Display for NavState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    Slots(Vec<DaySlots>),
    NoSlots,
    Blocked(String),
}

enum Readiness {
    Ready,
    Banner(PageBanner),
}

impl From<PageBanner> for NavOutcome {
    fn from(banner: PageBanner) -> Self {
        match banner {
            PageBanner::NoSlots => NavOutcome::NoSlots,
            PageBanner::Blocked(reason) => NavOutcome::Blocked(reason),
        }
    }
}

// Bounded so a page whose history went elsewhere is reloaded instead.
const MAX_BACK_STEPS: usize = 3;

pub struct Navigator {
    page: Arc<dyn Page>,
    site: Arc<SiteConfig>,
    timing: NavigationConfig,
    extractor: Arc<Extractor>,
    state: NavState,
    category: Option<String>,
    location: Option<String>,
}

impl Navigator {
    pub fn new(page: Arc<dyn Page>, site: Arc<SiteConfig>, timing: NavigationConfig, extractor: Arc<Extractor>) -> Self {
        Self {
            page,
            site,
            timing,
            extractor,
            state: NavState::Start,
            category: None,
            location: None,
        }
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn page(&self) -> &Arc<dyn Page> {
        &self.page
    }

    pub fn reset(&mut self) {
        self.state = NavState::Start;
        self.category = None;
        self.location = None;
    }

    /// Drives the page to the slot list of `target` and reads it.
    ///
    /// Any error leaves the navigator in `Failed`; the next visit reloads.
    /// Banner outcomes also reload on the next visit.
    pub async fn visit(&mut self, target: &CheckTarget) -> Result<NavOutcome> {
        let outcome = self.drive(target).await;
        if let Err(e) = &outcome {
            tracing::debug!(key = %target, state = %self.state, error = %e, "Navigation failed");
            self.state = NavState::Failed;
        }
        outcome
    }

    // A banner leaves the page somewhere off the normal flow.
    fn settle(&mut self, banner: PageBanner) -> NavOutcome {
        self.reset();
        banner.into()
    }

    async fn drive(&mut self, target: &CheckTarget) -> Result<NavOutcome> {
        self.position_for(target).await?;

        if let Some(banner) = self.open().await? {
            return Ok(self.settle(banner));
        }
        if let Some(banner) = self.select_category(&target.category).await? {
            return Ok(self.settle(banner));
        }
        if !self.location_offered(&target.location).await? {
            tracing::debug!(key = %target, "Location not offered for category");
            return Ok(NavOutcome::NoSlots);
        }
        if let Some(banner) = self.select_location(&target.location).await? {
            return Ok(self.settle(banner));
        }
        if let Some(banner) = self.load_calendar().await? {
            return Ok(self.settle(banner));
        }

        let days = self.collect_slots().await?;
        Ok(NavOutcome::Slots(days))
    }

    /// Backs out of a previous visit as far as the next target needs.
    async fn position_for(&mut self, target: &CheckTarget) -> Result<()> {
        if self.state == NavState::Failed {
            self.reset();
            return Ok(());
        }

        let same_category = self.category.as_deref() == Some(target.category.key.as_str());
        let mut steps = 0;

        loop {
            let wanted = match self.state {
                NavState::Start | NavState::CategoryList => return Ok(()),
                NavState::CategorySelected if same_category => return Ok(()),
                NavState::CategorySelected => NavState::CategoryList,
                NavState::LocationSelected | NavState::CalendarLoaded | NavState::SlotsReady => {
                    NavState::CategorySelected
                }
                NavState::Failed => {
                    self.reset();
                    return Ok(());
                }
            };

            if steps == MAX_BACK_STEPS {
                self.reset();
                return Ok(());
            }
            steps += 1;

            self.page.go_back().await?;
            let marker = match wanted {
                NavState::CategoryList => Locator::text(&self.site.category_page_text),
                _ => Locator::text(&self.site.location_page_text),
            };

            match self.wait_until_visible(&marker, self.timing.step_timeout()).await {
                Ok(Readiness::Ready) => {
                    self.state = wanted;
                    self.location = None;
                    if wanted == NavState::CategoryList {
                        self.category = None;
                    }
                }
                Ok(Readiness::Banner(_)) | Err(AppError::NavigationTimeout { .. }) => {
                    tracing::debug!(wanted = %wanted, "History did not land on expected page, reloading");
                    self.reset();
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Loads the site and presses the start button. No-op past `Start`.
    pub async fn open(&mut self) -> Result<Option<PageBanner>> {
        if self.state != NavState::Start {
            return Ok(None);
        }

        self.page.goto(&self.site.url).await?;
        let timeout = Duration::from_millis(self.timing.page_load_timeout_ms);
        if let Readiness::Banner(banner) = self
            .wait_until_visible(&Locator::text(&self.site.main_page_text), timeout)
            .await?
        {
            return Ok(Some(banner));
        }

        self.page.click(&Locator::css(&self.site.start_button_selector)).await?;
        if let Readiness::Banner(banner) = self
            .wait_until_visible(&Locator::text(&self.site.category_page_text), self.timing.step_timeout())
            .await?
        {
            return Ok(Some(banner));
        }

        self.state = NavState::CategoryList;
        Ok(None)
    }

    /// Picks a category tile. No-op when that category is already selected.
    pub async fn select_category(&mut self, category: &Category) -> Result<Option<PageBanner>> {
        if self.state == NavState::CategorySelected && self.category.as_deref() == Some(category.key.as_str()) {
            return Ok(None);
        }
        self.expect_state(NavState::CategoryList)?;

        let tile = Locator::css(&self.site.category_selector).with_exact_text(&category.name);
        if !self.page.is_visible(&tile).await? {
            return Err(AppError::ExtractionMismatch(format!(
                "category '{}' not listed on appointment type page",
                category.name
            )));
        }

        self.page.click(&tile).await?;
        if let Readiness::Banner(banner) = self
            .wait_until_visible(&Locator::text(&self.site.location_page_text), self.timing.step_timeout())
            .await?
        {
            return Ok(Some(banner));
        }
        self.wait_for_spinner().await?;

        self.state = NavState::CategorySelected;
        self.category = Some(category.key.clone());
        self.location = None;
        Ok(None)
    }

    /// Only offices with openings are rendered as active tiles.
    pub async fn location_offered(&self, location: &Location) -> Result<bool> {
        if self.state != NavState::CategorySelected {
            return Ok(self.location.as_deref() == Some(location.name.as_str()));
        }
        let tile = Locator::css(&self.site.location_selector).with_exact_text(&location.name);
        self.page.is_visible(&tile).await
    }

    /// Picks a location tile. No-op when that location is already selected.
    pub async fn select_location(&mut self, location: &Location) -> Result<Option<PageBanner>> {
        if matches!(self.state, NavState::LocationSelected | NavState::CalendarLoaded | NavState::SlotsReady)
            && self.location.as_deref() == Some(location.name.as_str())
        {
            return Ok(None);
        }
        self.expect_state(NavState::CategorySelected)?;

        let tile = Locator::css(&self.site.location_selector).with_exact_text(&location.name);
        self.page.click(&tile).await?;

        self.state = NavState::LocationSelected;
        self.location = Some(location.name.clone());
        Ok(None)
    }

    /// Waits for the date page and its picker. No-op once loaded.
    pub async fn load_calendar(&mut self) -> Result<Option<PageBanner>> {
        if matches!(self.state, NavState::CalendarLoaded | NavState::SlotsReady) {
            return Ok(None);
        }
        self.expect_state(NavState::LocationSelected)?;

        if let Readiness::Banner(banner) = self
            .wait_until_visible(&Locator::text(&self.site.calendar_page_text), self.timing.step_timeout())
            .await?
        {
            return Ok(Some(banner));
        }
        self.wait_for_spinner().await?;

        let html = self.page.content().await?;
        if let Some(banner) = self.extractor.detect_banner(&html) {
            return Ok(Some(banner));
        }
        self.extractor.read_calendar(&html)?;

        self.state = NavState::CalendarLoaded;
        Ok(None)
    }

    /// Clicks through every active day of up to `months_to_scan` months.
    pub async fn collect_slots(&mut self) -> Result<Vec<DaySlots>> {
        if !matches!(self.state, NavState::CalendarLoaded | NavState::SlotsReady) {
            return Err(AppError::Internal(format!("cannot collect slots in state {}", self.state)));
        }

        let mut days = Vec::new();
        for month_index in 0..self.timing.months_to_scan {
            let view = self.extractor.read_calendar(&self.page.content().await?)?;
            tracing::debug!(month = %view.month, year = %view.year, active_days = view.active_days.len(), "Reading calendar month");

            for (index, day) in view.active_days.iter().enumerate() {
                let cell = Locator::css(&self.site.active_day_selector).nth(index);
                self.page.click(&cell).await?;
                self.wait_for_spinner().await?;

                let times = self.extractor.read_time_slots(&self.page.content().await?);
                days.push(DaySlots {
                    date: view.date_label(*day),
                    times,
                });
            }

            if !view.has_next_month || month_index + 1 == self.timing.months_to_scan {
                break;
            }
            self.page.click(&Locator::css(&self.site.next_month_selector)).await?;
            self.wait_for_spinner().await?;
        }

        self.state = NavState::SlotsReady;
        Ok(days)
    }

    fn expect_state(&self, expected: NavState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AppError::Internal(format!(
                "navigation step requires state {} but page is in {}",
                expected, self.state
            )))
        }
    }

    /// Polls until `marker` is visible or a banner shows up.
    async fn wait_until_visible(&self, marker: &Locator, timeout: Duration) -> Result<Readiness> {
        let deadline = Instant::now() + timeout;
        loop {
            let html = self.page.content().await?;
            if let Some(banner) = self.extractor.detect_banner(&html) {
                return Ok(Readiness::Banner(banner));
            }
            if self.page.is_visible(marker).await? {
                return Ok(Readiness::Ready);
            }
            if Instant::now() >= deadline {
                return Err(AppError::NavigationTimeout { state: self.state });
            }
            sleep(self.timing.poll_interval()).await;
        }
    }

    /// Gives the loading spinner a grace period to appear, then waits for it to go away.
    async fn wait_for_spinner(&self) -> Result<()> {
        let spinner = Locator::css(&self.site.spinner_selector);

        let appear_deadline = Instant::now() + Duration::from_millis(self.timing.spinner_appear_ms);
        loop {
            if self.page.is_visible(&spinner).await? {
                break;
            }
            if Instant::now() >= appear_deadline {
                return Ok(());
            }
            sleep(self.timing.poll_interval()).await;
        }

        let deadline = Instant::now() + Duration::from_millis(self.timing.spinner_timeout_ms);
        loop {
            if !self.page.is_visible(&spinner).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AppError::NavigationTimeout { state: self.state });
            }
            sleep(self.timing.poll_interval()).await;
        }
    }
}
