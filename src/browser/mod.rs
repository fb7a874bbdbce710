//! Page-session drivers.
//!
//! A [`Browser`] hands out [`PageSession`]s; one session drives one source
//! run from seed page to the last pagination action. Opening a session is
//! the "driver acquisition" step the orchestrator retries.
//!
//! | Driver | Backend | Script execution |
//! |--------|---------|------------------|
//! | [`HttpBrowser`] | `reqwest` | no: scrolling never loads more, clicks follow anchor hrefs |
//! | `ChromeBrowser` | `chromiumoxide` (feature `browser`) | yes |

mod http;

#[cfg(feature = "browser")]
mod chrome;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ScrapeConfig;

pub use http::HttpBrowser;

#[cfg(feature = "browser")]
pub use chrome::ChromeBrowser;

/// Factory for page sessions.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Short driver name for logs (`"http"`, `"chrome"`).
    fn name(&self) -> &str;

    /// Start a fresh session. May fail transiently (browser launch, network).
    async fn open_session(&self) -> Result<Box<dyn PageSession>>;
}

/// One live page, navigated and scrolled by the pagination controller.
#[async_trait]
pub trait PageSession: Send {
    /// Navigate to `url`, replacing the current document.
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Current document HTML.
    async fn content(&mut self) -> Result<String>;

    /// Current document height, used to detect whether a scroll loaded anything.
    async fn page_height(&mut self) -> Result<u64>;

    /// Scroll to the bottom of the document.
    async fn scroll_to_bottom(&mut self) -> Result<()>;

    /// Activate the first control matching `selector`.
    ///
    /// Returns `false` when no such control exists or it cannot be
    /// interacted with (hidden, disabled, no target).
    async fn click(&mut self, selector: &str) -> Result<bool>;

    /// Release the session. Sessions are not reused after `close`.
    async fn close(&mut self) -> Result<()>;
}

/// Build the configured driver.
pub fn create_browser(config: &ScrapeConfig) -> Result<Arc<dyn Browser>> {
    match config.driver.as_str() {
        "http" => Ok(Arc::new(HttpBrowser::new(config)?)),
        #[cfg(feature = "browser")]
        "chrome" => Ok(Arc::new(ChromeBrowser::new(config))),
        #[cfg(not(feature = "browser"))]
        "chrome" => bail!("The chrome driver requires --features browser"),
        other => bail!("Unknown scrape driver: {}", other),
    }
}
