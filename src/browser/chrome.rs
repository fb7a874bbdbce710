//! Headless Chromium sessions via `chromiumoxide`.
//!
//! Each session launches its own browser process, mirroring one
//! webdriver per source run. The CDP handler is polled on a spawned task
//! until the browser closes.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Browser, PageSession};
use crate::config::ScrapeConfig;

pub struct ChromeBrowser {
    user_agent: String,
    request_timeout: Duration,
}

impl ChromeBrowser {
    pub fn new(config: &ScrapeConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    fn name(&self) -> &str {
        "chrome"
    }

    async fn open_session(&self) -> Result<Box<dyn PageSession>> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .request_timeout(self.request_timeout)
            .build()
            .map_err(|e| anyhow!("Invalid browser config: {}", e))?;

        let (browser, mut handler) = CdpBrowser::launch(config).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler stopped");
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        page.set_user_agent(self.user_agent.as_str()).await?;

        Ok(Box::new(ChromeSession {
            browser,
            page,
            handler_task,
        }))
    }
}

struct ChromeSession {
    browser: CdpBrowser,
    page: Page,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn page_height(&mut self) -> Result<u64> {
        let height: f64 = self
            .page
            .evaluate("document.body.scrollHeight")
            .await?
            .into_value()?;
        Ok(height.max(0.0) as u64)
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        let quoted = serde_json::to_string(selector)?;
        let script = format!(
            "(() => {{ const el = document.querySelector({quoted}); \
             if (!el || el.disabled || el.offsetParent === null) return false; \
             el.scrollIntoView({{block: 'center'}}); el.click(); return true; }})()"
        );
        let clicked: bool = self.page.evaluate(script).await?.into_value()?;
        Ok(clicked)
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Failed to close browser cleanly");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }
}
