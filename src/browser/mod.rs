//! Browser abstraction used by the session manager and the navigator.
//!
//! The crawler never touches a concrete driver directly: it talks to a
//! [`BrowserLauncher`] that produces [`BrowserHandle`]s, which in turn hand
//! out [`Page`]s. The headless Chrome implementation lives in [`chrome`].

pub mod chrome;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::utils::error::Result;

pub use chrome::{ChromeBrowser, ChromeLauncher, ChromePage};

/// Element query: an optional CSS selector, an optional contained text and
/// the index among the matches.
///
/// Without a selector the text is matched against the innermost elements
/// that contain it, the way a user would point at a caption. With `exact`
/// set, a selector match must carry the text as its whole trimmed content
/// or as its first line, so "Henderson" does not pick "Hendersonville".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Locator {
    pub css: Option<String>,
    pub text: Option<String>,
    pub exact: bool,
    pub nth: usize,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            css: Some(selector.into()),
            ..Default::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self.exact = false;
        self
    }

    /// Tile captions: the label must equal `text`, not merely contain it.
    pub fn with_exact_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self.exact = true;
        self
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.nth = index;
        self
    }

    /// JavaScript expression evaluating to the located element or `null`.
    pub fn to_js(&self) -> String {
        // serde_json string encoding doubles as JS string-literal escaping
        let quote = |s: &str| serde_json::Value::String(s.to_string()).to_string();
        let text = self.text.as_deref().map(quote).unwrap_or_else(|| "null".to_string());

        match &self.css {
            Some(css) => format!(
                r#"(() => {{
    const text = {text};
    const exact = {exact};
    const matches = el => {{
        const all = (el.textContent || '').trim();
        if (!exact) return all.includes(text);
        const first = (el.innerText || all).split('\n').map(s => s.trim()).find(s => s.length > 0) || '';
        return all === text || first === text;
    }};
    const found = Array.from(document.querySelectorAll({css}))
        .filter(el => text === null || matches(el));
    return found[{nth}] || null;
}})()"#,
                text = text,
                exact = self.exact,
                css = quote(css),
                nth = self.nth
            ),
            None => format!(
                r#"(() => {{
    const text = {text};
    const found = Array.from(document.querySelectorAll('body *'))
        .filter(el => (el.textContent || '').includes(text))
        .filter(el => !Array.from(el.children).some(c => (c.textContent || '').includes(text)));
    return found[{nth}] || null;
}})()"#,
                text = text,
                nth = self.nth
            ),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.css, &self.text) {
            (Some(css), Some(text)) if self.exact => write!(f, "{} text-is \"{}\"", css, text)?,
            (Some(css), Some(text)) => write!(f, "{} has-text \"{}\"", css, text)?,
            (Some(css), None) => write!(f, "{}", css)?,
            (None, Some(text)) => write!(f, "text \"{}\"", text)?,
            (None, None) => write!(f, "<empty>")?,
        }
        if self.nth > 0 {
            write!(f, " >> nth={}", self.nth)?;
        }
        Ok(())
    }
}

/// A single tab. At most one navigation is in flight per page.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn go_back(&self) -> Result<()>;

    /// Clicks the located element; `ElementNotFound` when nothing matches.
    async fn click(&self, locator: &Locator) -> Result<()>;

    async fn is_visible(&self, locator: &Locator) -> Result<bool>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String>;

    async fn url(&self) -> Result<String>;

    /// PNG bytes of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Best-effort close; never fails.
    fn close(&self);
}

/// One running browser process.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn Page>>;

    async fn is_alive(&self) -> bool;

    async fn close(&self);
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>>;
}
