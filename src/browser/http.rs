//! Static-HTML page sessions over `reqwest`.
//!
//! No JavaScript runs, so listing pages that render client-side yield
//! whatever the server sends. Height is the document length; scrolling
//! never changes it, which stops infinite-scroll sources after one
//! evaluation. `click` treats the control as a "load more" link: its
//! `href` is fetched and appended to the current document.

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{Browser, PageSession};
use crate::config::ScrapeConfig;

pub struct HttpBrowser {
    client: reqwest::Client,
}

impl HttpBrowser {
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.5"),
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .gzip(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    fn name(&self) -> &str {
        "http"
    }

    async fn open_session(&self) -> Result<Box<dyn PageSession>> {
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            current: None,
            document: String::new(),
            followed: HashSet::new(),
        }))
    }
}

struct HttpSession {
    client: reqwest::Client,
    current: Option<Url>,
    document: String,
    followed: HashSet<String>,
}

impl HttpSession {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("HTTP request failed: {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, url);
        }

        response
            .text()
            .await
            .context("Failed to read response body")
    }

    /// First matching control whose target has not been followed yet.
    fn next_target(&self, selector: &str) -> Result<Option<Url>> {
        let selector = Selector::parse(selector)
            .map_err(|e| anyhow::anyhow!("Invalid selector '{}': {}", selector, e))?;
        let Some(base) = self.current.as_ref() else {
            return Ok(None);
        };

        let document = Html::parse_document(&self.document);
        let target = document
            .select(&selector)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| base.join(href).ok())
            .find(|url| !self.followed.contains(url.as_str()));
        Ok(target)
    }
}

#[async_trait]
impl PageSession for HttpSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        let parsed = Url::parse(url).with_context(|| format!("Invalid page URL: {url}"))?;
        self.document = self.fetch(url).await?;
        self.followed.clear();
        self.followed.insert(parsed.to_string());
        self.current = Some(parsed);
        Ok(())
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.document.clone())
    }

    async fn page_height(&mut self) -> Result<u64> {
        Ok(self.document.len() as u64)
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        let Some(target) = self.next_target(selector)? else {
            return Ok(false);
        };

        debug!(url = %target, "Following load-more link");
        let more = self.fetch(target.as_str()).await?;
        self.document.push('\n');
        self.document.push_str(&more);
        self.followed.insert(target.to_string());
        self.current = Some(target);
        Ok(true)
    }

    async fn close(&mut self) -> Result<()> {
        self.document.clear();
        self.current = None;
        Ok(())
    }
}
