//! Reads availability out of rendered scheduler pages.
//!
//! Everything here is a pure function of an HTML snapshot, so the same
//! extractor is shared by every worker.

use regex::RegexSet;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::config::SiteConfig;
use crate::models::{AvailabilityResult, DaySlots};
use crate::utils::error::{AppError, Result};

/// Month grid currently shown by the date picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarView {
    pub month: String,
    pub year: String,
    pub active_days: Vec<u32>,
    pub has_next_month: bool,
}

impl CalendarView {
    /// Display date used in slot summaries, e.g. "March 4, 2026".
    pub fn date_label(&self, day: u32) -> String {
        format!("{} {}, {}", self.month, day, self.year)
    }
}

/// Site-rendered message that ends a navigation without data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageBanner {
    NoSlots,
    Blocked(String),
}

pub struct Extractor {
    calendar: Selector,
    month: Selector,
    year: Selector,
    active_day: Selector,
    next_month: Selector,
    time_select: Selector,
    option: Selector,
    body: Selector,
    blocked: RegexSet,
    no_slots: RegexSet,
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::Validation(format!("Invalid CSS selector '{}': {:?}", selector, e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Extractor {
    pub fn new(site: &SiteConfig) -> Result<Self> {
        let blocked = RegexSet::new(&site.blocked_patterns)
            .map_err(|e| AppError::Validation(format!("Invalid blocked pattern: {}", e)))?;
        let no_slots = RegexSet::new(&site.no_slots_patterns)
            .map_err(|e| AppError::Validation(format!("Invalid no-slots pattern: {}", e)))?;

        Ok(Self {
            calendar: parse_selector(&site.calendar_selector)?,
            month: parse_selector(&site.month_selector)?,
            year: parse_selector(&site.year_selector)?,
            active_day: parse_selector(&site.active_day_selector)?,
            next_month: parse_selector(&site.next_month_selector)?,
            time_select: parse_selector(&site.time_select_selector)?,
            option: parse_selector("option")?,
            body: parse_selector("body")?,
            blocked,
            no_slots,
        })
    }

    /// Reads the date picker; a missing widget or header means the layout changed.
    pub fn read_calendar(&self, html: &str) -> Result<CalendarView> {
        let document = Html::parse_document(html);

        let calendar = document
            .select(&self.calendar)
            .next()
            .ok_or_else(|| AppError::ExtractionMismatch("calendar widget not found".to_string()))?;

        let month = calendar
            .select(&self.month)
            .next()
            .map(element_text)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| AppError::ExtractionMismatch("calendar month header not found".to_string()))?;
        let year = calendar
            .select(&self.year)
            .next()
            .map(element_text)
            .filter(|y| !y.is_empty())
            .ok_or_else(|| AppError::ExtractionMismatch("calendar year header not found".to_string()))?;

        let active_days = calendar
            .select(&self.active_day)
            .map(|cell| {
                let text = element_text(cell);
                text.parse::<u32>()
                    .ok()
                    .filter(|day| (1..=31).contains(day))
                    .ok_or_else(|| AppError::ExtractionMismatch(format!("unexpected day cell '{}'", text)))
            })
            .collect::<Result<Vec<_>>>()?;

        let has_next_month = document.select(&self.next_month).next().is_some();

        Ok(CalendarView {
            month,
            year,
            active_days,
            has_next_month,
        })
    }

    /// Bookable times offered for the selected day, blanks and placeholders skipped.
    pub fn read_time_slots(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);

        document
            .select(&self.time_select)
            .flat_map(|select| select.select(&self.option).collect::<Vec<_>>())
            .map(element_text)
            .filter(|text| !text.is_empty() && text != "-")
            .collect()
    }

    /// Visible page text with scripts and styles left out.
    pub fn visible_text(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        let Some(body) = document.select(&self.body).next() else {
            return String::new();
        };

        let mut parts = Vec::new();
        for node in body.descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let hidden = node
                .parent()
                .and_then(|parent| parent.value().as_element().map(|e| matches!(e.name(), "script" | "style" | "noscript")))
                .unwrap_or(false);
            if !hidden && !text.trim().is_empty() {
                parts.push(text.trim().to_string());
            }
        }
        parts.join(" ")
    }

    /// Blocked banners win over no-slot banners when both are present.
    pub fn detect_banner(&self, html: &str) -> Option<PageBanner> {
        let text = self.visible_text(html);

        if let Some(index) = self.blocked.matches(&text).iter().next() {
            return Some(PageBanner::Blocked(self.blocked.patterns()[index].clone()));
        }
        if self.no_slots.is_match(&text) {
            return Some(PageBanner::NoSlots);
        }
        None
    }

    pub fn summarize(&self, days: Vec<DaySlots>) -> AvailabilityResult {
        AvailabilityResult::from_days(days)
    }
}
