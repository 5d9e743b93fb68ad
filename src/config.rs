use config::{Config, ConfigError, Environment, File};
use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use url::Url;

use crate::catalog;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub database: DatabaseConfig,
    pub browser: BrowserConfig,
    pub navigation: NavigationConfig,
    pub crawler: CrawlerConfig,
    pub retry: RetrySettings,
    pub diagnostics: DiagnosticsConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Selectors, readiness texts and banner patterns of the scheduling site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub url: String,
    pub main_page_text: String,
    pub category_page_text: String,
    pub location_page_text: String,
    pub calendar_page_text: String,
    pub start_button_selector: String,
    pub category_selector: String,
    pub location_selector: String,
    pub spinner_selector: String,
    pub calendar_selector: String,
    pub month_selector: String,
    pub year_selector: String,
    pub active_day_selector: String,
    pub next_month_selector: String,
    pub time_select_selector: String,
    pub blocked_patterns: Vec<String>,
    pub no_slots_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub user_agent: Option<String>,
    pub restart_after_cycles: u32,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub poll_interval_ms: u64,
    pub step_timeout_ms: u64,
    pub page_load_timeout_ms: u64,
    pub spinner_appear_ms: u64,
    pub spinner_timeout_ms: u64,
    pub months_to_scan: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub cycle_interval_secs: u64,
    pub concurrency: usize,
    pub max_targets_per_cycle: Option<usize>,
    pub categories: Vec<String>,
    pub locations: Vec<String>,
    pub session_cooldown_secs: u64,
    pub max_failed_session_cycles: u32,
    pub inter_target_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassRetry {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub timeout: ClassRetry,
    pub blocked: ClassRetry,
    pub session: ClassRetry,
    pub transient: ClassRetry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub directory: String,
    pub dom_excerpt_bytes: usize,
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub queue_capacity: usize,
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
    pub webhook_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<String>,
    pub file_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: "https://skiptheline.ncdot.gov/Webapp/Appointment/Index/a7ade79b-996d-4971-8766-97feb75254de"
                .to_string(),
            main_page_text: "Welcome to the NCDMV Driver Service Appointment Scheduler".to_string(),
            category_page_text: "Please select an appointment type".to_string(),
            location_page_text: "Select a Location".to_string(),
            calendar_page_text: "Choose a Date".to_string(),
            start_button_selector: "#cmdMakeAppt".to_string(),
            category_selector: ".QflowObjectItem".to_string(),
            location_selector: ".QflowObjectItem.Active-Unit".to_string(),
            spinner_selector: r#"img[src*="search-loading.gif"]"#.to_string(),
            calendar_selector: ".ui-datepicker-inline.ui-datepicker".to_string(),
            month_selector: ".ui-datepicker-month".to_string(),
            year_selector: ".ui-datepicker-year".to_string(),
            active_day_selector: "td[data-handler='selectDay']".to_string(),
            next_month_selector: "a.ui-datepicker-next:not(.ui-state-disabled)".to_string(),
            time_select_selector: "select".to_string(),
            blocked_patterns: vec![
                "(?i)unfortunately, we have encountered an error".to_string(),
                "(?i)access denied".to_string(),
                "(?i)too many requests".to_string(),
                "(?i)temporarily unavailable".to_string(),
                "(?i)under maintenance".to_string(),
            ],
            no_slots_patterns: vec![
                "(?i)no appointments? (are )?available".to_string(),
                "(?i)no available (appointments|times)".to_string(),
            ],
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/slot_watcher.db".to_string(),
            max_connections: 4,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            user_agent: None,
            restart_after_cycles: 2,
            idle_timeout_secs: 600,
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            step_timeout_ms: 15_000,
            page_load_timeout_ms: 60_000,
            spinner_appear_ms: 1_000,
            spinner_timeout_ms: 20_000,
            months_to_scan: 2,
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 2,
            concurrency: 1,
            max_targets_per_cycle: None,
            categories: Vec::new(),
            locations: Vec::new(),
            session_cooldown_secs: 5,
            max_failed_session_cycles: 10,
            inter_target_delay_ms: 0,
        }
    }
}

impl Default for ClassRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: ClassRetry::default(),
            blocked: ClassRetry {
                max_attempts: 2,
                base_delay_ms: 60_000,
                multiplier: 2.0,
                max_delay_ms: 300_000,
            },
            session: ClassRetry {
                max_attempts: 2,
                base_delay_ms: 5_000,
                multiplier: 1.0,
                max_delay_ms: 5_000,
            },
            transient: ClassRetry {
                max_attempts: 3,
                base_delay_ms: 1_000,
                multiplier: 2.0,
                max_delay_ms: 10_000,
            },
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "data/diagnostics".to_string(),
            dom_excerpt_bytes: 16 * 1024,
            retention_days: 7,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            webhook_url: None,
            webhook_timeout_secs: 10,
            webhook_attempts: 3,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "slot_watcher=info".to_string(),
            directory: None,
            file_prefix: "slot_watcher.log".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Layered load: compiled defaults, `config/*` files, an explicit file, then env vars.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        let s = builder
            .add_source(
                Environment::with_prefix("SLOT_WATCHER")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("crawler.categories")
                    .with_list_parse_key("crawler.locations"),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.site.url).is_err() {
            return Err(ConfigError::Message("Invalid site URL format".into()));
        }

        for selector in self.site.selectors() {
            if Selector::parse(selector).is_err() {
                return Err(ConfigError::Message(format!("Invalid CSS selector in site config: {}", selector)));
            }
        }

        for pattern in self.site.blocked_patterns.iter().chain(&self.site.no_slots_patterns) {
            if Regex::new(pattern).is_err() {
                return Err(ConfigError::Message(format!("Invalid banner pattern: {}", pattern)));
            }
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.browser.restart_after_cycles == 0 {
            return Err(ConfigError::Message("Browser restart_after_cycles must be greater than 0".into()));
        }

        let nav = &self.navigation;
        if nav.poll_interval_ms == 0 {
            return Err(ConfigError::Message("Navigation poll_interval_ms must be greater than 0".into()));
        }
        if nav.poll_interval_ms >= nav.step_timeout_ms {
            return Err(ConfigError::Message("Navigation poll_interval_ms must be below step_timeout_ms".into()));
        }
        if nav.months_to_scan == 0 {
            return Err(ConfigError::Message("Navigation months_to_scan must be greater than 0".into()));
        }

        if !(1..=3).contains(&self.crawler.concurrency) {
            return Err(ConfigError::Message("Crawler concurrency must be between 1 and 3".into()));
        }
        if self.crawler.max_targets_per_cycle == Some(0) {
            return Err(ConfigError::Message("Crawler max_targets_per_cycle must be greater than 0".into()));
        }
        catalog::select_categories(&self.crawler.categories).map_err(|e| ConfigError::Message(e.to_string()))?;
        catalog::select_locations(&self.crawler.locations).map_err(|e| ConfigError::Message(e.to_string()))?;

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message("Retry max_attempts must be greater than 0".into()));
        }
        for (name, class) in [
            ("timeout", &self.retry.timeout),
            ("blocked", &self.retry.blocked),
            ("session", &self.retry.session),
            ("transient", &self.retry.transient),
        ] {
            if class.max_attempts == 0 {
                return Err(ConfigError::Message(format!("Retry {} max_attempts must be greater than 0", name)));
            }
            if class.multiplier < 1.0 {
                return Err(ConfigError::Message(format!("Retry {} multiplier must be at least 1.0", name)));
            }
        }

        if self.notifications.queue_capacity == 0 {
            return Err(ConfigError::Message("Notifications queue_capacity must be greater than 0".into()));
        }
        if let Some(webhook) = &self.notifications.webhook_url {
            if Url::parse(webhook).is_err() {
                return Err(ConfigError::Message("Invalid notifications webhook_url".into()));
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }
}

impl SiteConfig {
    pub fn selectors(&self) -> [&str; 10] {
        [
            self.start_button_selector.as_str(),
            self.category_selector.as_str(),
            self.location_selector.as_str(),
            self.spinner_selector.as_str(),
            self.calendar_selector.as_str(),
            self.month_selector.as_str(),
            self.year_selector.as_str(),
            self.active_day_selector.as_str(),
            self.next_month_selector.as_str(),
            self.time_select_selector.as_str(),
        ]
    }
}

impl NavigationConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn step_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.step_timeout_ms)
    }
}
