//! Ownership of the browser process.
//!
//! Callers never see the browser itself: they borrow pages through
//! [`SessionManager::acquire_page`] and report trouble with
//! [`SessionManager::invalidate`]. Restarts happen lazily on the next
//! acquisition.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::browser::{BrowserHandle, BrowserLauncher, Page};
use crate::utils::error::{AppError, Result};

/// A page borrowed from the current browser. Closing happens on drop.
pub struct PageLease {
    page: Arc<dyn Page>,
    generation: u64,
}

impl PageLease {
    pub fn page(&self) -> Arc<dyn Page> {
        self.page.clone()
    }

    /// Browser generation the page belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        self.page.close();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub active: bool,
    pub generation: u64,
    pub cycles_since_launch: u32,
    pub restart_pending: bool,
    pub launches: u64,
    pub launched_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct SessionState {
    browser: Option<Arc<dyn BrowserHandle>>,
    generation: u64,
    cycles_since_launch: u32,
    restart_pending: bool,
    launches: u64,
    launched_at: Option<DateTime<Utc>>,
}

pub struct SessionManager {
    launcher: Arc<dyn BrowserLauncher>,
    restart_after_cycles: u32,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, restart_after_cycles: u32) -> Self {
        Self {
            launcher,
            restart_after_cycles: restart_after_cycles.max(1),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Hands out a fresh page, launching or relaunching the browser first when needed.
    pub async fn acquire_page(&self) -> Result<PageLease> {
        let mut state = self.state.lock().await;

        let healthy = match &state.browser {
            Some(browser) => !state.restart_pending && browser.is_alive().await,
            None => false,
        };
        if !healthy {
            self.relaunch(&mut state).await?;
        }

        let Some(browser) = state.browser.clone() else {
            return Err(AppError::SessionUnavailable("no browser after launch".to_string()));
        };

        match browser.new_page().await {
            Ok(page) => Ok(PageLease {
                page,
                generation: state.generation,
            }),
            Err(e) => {
                // A browser that cannot open tabs is not worth keeping
                tracing::warn!(error = %e, generation = state.generation, "Failed to open page, relaunching browser");
                self.relaunch(&mut state).await?;
                let browser = state
                    .browser
                    .clone()
                    .ok_or_else(|| AppError::SessionUnavailable("no browser after launch".to_string()))?;
                let page = browser
                    .new_page()
                    .await
                    .map_err(|e| AppError::SessionUnavailable(format!("Fresh browser could not open a page: {}", e)))?;
                Ok(PageLease {
                    page,
                    generation: state.generation,
                })
            }
        }
    }

    async fn relaunch(&self, state: &mut SessionState) -> Result<()> {
        if let Some(old) = state.browser.take() {
            tracing::info!(generation = state.generation, "Tearing down browser session");
            old.close().await;
        }

        let browser = self.launcher.launch().await.map_err(|e| match e {
            AppError::SessionUnavailable(_) => e,
            other => AppError::SessionUnavailable(other.to_string()),
        })?;

        state.browser = Some(browser);
        state.generation += 1;
        state.cycles_since_launch = 0;
        state.restart_pending = false;
        state.launches += 1;
        state.launched_at = Some(Utc::now());

        metrics::counter!("slot_watcher_browser_launches_total").increment(1);
        tracing::info!(generation = state.generation, launches = state.launches, "Browser session started");
        Ok(())
    }

    /// Counts a finished cycle; returns true when a restart has been scheduled.
    pub async fn mark_cycle_completed(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.browser.is_none() {
            return false;
        }

        state.cycles_since_launch += 1;
        if state.cycles_since_launch >= self.restart_after_cycles && !state.restart_pending {
            state.restart_pending = true;
            tracing::info!(
                cycles = state.cycles_since_launch,
                threshold = self.restart_after_cycles,
                "Scheduling periodic browser restart"
            );
            return true;
        }
        false
    }

    /// Forces teardown before the next acquisition.
    ///
    /// Reports from pages of an older generation are ignored; that browser is already gone.
    pub async fn invalidate(&self, generation: u64, reason: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.generation != generation || state.browser.is_none() {
            return false;
        }
        if !state.restart_pending {
            tracing::warn!(generation, reason, "Browser session invalidated");
        }
        state.restart_pending = true;
        true
    }

    pub async fn is_current(&self, generation: u64) -> bool {
        let state = self.state.lock().await;
        state.generation == generation && !state.restart_pending && state.browser.is_some()
    }

    pub async fn status(&self) -> SessionStatus {
        let state = self.state.lock().await;
        SessionStatus {
            active: state.browser.is_some(),
            generation: state.generation,
            cycles_since_launch: state.cycles_since_launch,
            restart_pending: state.restart_pending,
            launches: state.launches,
            launched_at: state.launched_at,
        }
    }

    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(browser) = state.browser.take() {
            browser.close().await;
            tracing::info!(generation = state.generation, "Browser session closed");
        }
        state.restart_pending = false;
    }
}
