use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BrowserHandle, BrowserLauncher, Locator, Page};
use crate::config::{BrowserConfig, NavigationConfig};
use crate::utils::error::{AppError, Result};

static CHROME_ARGS: [&str; 7] = [
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
];

/// Runs a blocking CDP call off the async worker threads.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Browser task failed: {}", e)))?
}

#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    chrome_path: Option<PathBuf>,
    headless: bool,
    user_agent: Option<String>,
    idle_timeout: Duration,
    page_load_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(browser: &BrowserConfig, navigation: &NavigationConfig) -> Self {
        Self {
            chrome_path: browser.chrome_path.as_ref().map(PathBuf::from),
            headless: browser.headless,
            user_agent: browser.user_agent.clone(),
            idle_timeout: Duration::from_secs(browser.idle_timeout_secs),
            page_load_timeout: Duration::from_millis(navigation.page_load_timeout_ms),
        }
    }

    fn launch_blocking(&self) -> Result<Browser> {
        let mut options = LaunchOptions::default_builder()
            .headless(self.headless)
            .sandbox(false) // Often needed in containerized environments
            .args(CHROME_ARGS.iter().map(OsStr::new).collect())
            .build()
            .map_err(|e| AppError::SessionUnavailable(format!("Failed to create launch options: {}", e)))?;

        options.idle_browser_timeout = self.idle_timeout;
        if let Some(path) = &self.chrome_path {
            options.path = Some(path.clone());
        }

        Browser::new(options).map_err(|e| AppError::SessionUnavailable(format!("Failed to launch browser: {}", e)))
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>> {
        let launcher = self.clone();
        let browser = blocking(move || launcher.launch_blocking()).await?;

        tracing::info!(headless = self.headless, "Launched headless Chrome");

        Ok(Arc::new(ChromeBrowser {
            browser: Mutex::new(Some(browser)),
            user_agent: self.user_agent.clone(),
            page_load_timeout: self.page_load_timeout,
        }))
    }
}

pub struct ChromeBrowser {
    browser: Mutex<Option<Browser>>,
    user_agent: Option<String>,
    page_load_timeout: Duration,
}

impl ChromeBrowser {
    fn current(&self) -> Option<Browser> {
        self.browser.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl BrowserHandle for ChromeBrowser {
    async fn new_page(&self) -> Result<Arc<dyn Page>> {
        let browser = self
            .current()
            .ok_or_else(|| AppError::browser("browser has been closed"))?;
        let user_agent = self.user_agent.clone();
        let timeout = self.page_load_timeout;

        let tab = blocking(move || {
            let tab = browser
                .new_tab()
                .map_err(|e| AppError::browser(format!("Failed to create tab: {}", e)))?;
            tab.set_default_timeout(timeout);
            if let Some(user_agent) = user_agent {
                tab.set_user_agent(&user_agent, None, None)
                    .map_err(|e| AppError::browser(format!("Failed to set user agent: {}", e)))?;
            }
            Ok(tab)
        })
        .await?;

        Ok(Arc::new(ChromePage { tab }))
    }

    async fn is_alive(&self) -> bool {
        let Some(browser) = self.current() else {
            return false;
        };
        blocking(move || {
            browser
                .get_version()
                .map(|_| ())
                .map_err(|e| AppError::browser(e.to_string()))
        })
        .await
        .is_ok()
    }

    async fn close(&self) {
        let taken = self.browser.lock().ok().and_then(|mut guard| guard.take());
        if let Some(browser) = taken {
            // Dropping the last handle kills the Chrome process
            let _ = tokio::task::spawn_blocking(move || drop(browser)).await;
        }
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    async fn evaluate_bool(&self, script: String) -> Result<bool> {
        let tab = self.tab.clone();
        blocking(move || {
            let result = tab
                .evaluate(&script, false)
                .map_err(|e| AppError::browser(format!("Script evaluation failed: {}", e)))?;
            Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
        })
        .await
    }
}

#[async_trait]
impl Page for ChromePage {
    async fn goto(&self, url: &str) -> Result<()> {
        let tab = self.tab.clone();
        let url = url.to_string();
        blocking(move || {
            tab.navigate_to(&url)
                .map_err(|e| AppError::browser(format!("Navigation failed: {}", e)))?;
            tab.wait_until_navigated()
                .map_err(|e| AppError::browser(format!("Page load failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn go_back(&self) -> Result<()> {
        let tab = self.tab.clone();
        blocking(move || {
            tab.evaluate("history.back()", false)
                .map_err(|e| AppError::browser(format!("History navigation failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let script = format!(
            r#"(() => {{
    const el = {};
    if (!el) return false;
    el.scrollIntoView({{ block: 'center' }});
    el.click();
    return true;
}})()"#,
            locator.to_js()
        );

        if self.evaluate_bool(script).await? {
            Ok(())
        } else {
            Err(AppError::ElementNotFound {
                selector: locator.to_string(),
            })
        }
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool> {
        let script = format!(
            r#"(() => {{
    const el = {};
    if (!el) return false;
    const style = window.getComputedStyle(el);
    if (style.visibility === 'hidden' || style.display === 'none') return false;
    return !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
}})()"#,
            locator.to_js()
        );
        self.evaluate_bool(script).await
    }

    async fn content(&self) -> Result<String> {
        let tab = self.tab.clone();
        blocking(move || {
            tab.get_content()
                .map_err(|e| AppError::browser(format!("Failed to get page content: {}", e)))
        })
        .await
    }

    async fn url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let tab = self.tab.clone();
        blocking(move || {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(|e| AppError::browser(format!("Screenshot capture failed: {}", e)))
        })
        .await
    }

    fn close(&self) {
        let tab = self.tab.clone();
        let close = move || {
            if let Err(e) = tab.close(false) {
                tracing::debug!(error = %e, "Failed to close tab");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(close);
            }
            Err(_) => close(),
        }
    }
}
