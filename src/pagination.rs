//! Pagination controller.
//!
//! Drives a [`PageSession`] through a listing until a stop condition holds.
//! Each style cycles `Loading → Evaluating → {Loading, Done}`:
//!
//! | Style | Loading action | Stops when |
//! |-------|----------------|------------|
//! | infinite scroll | scroll to bottom | height unchanged, or scroll ceiling |
//! | numbered pages | open page *n* | page yields zero posts, or page ceiling |
//! | click-to-load | click the control | control absent/not interactable, or click ceiling |
//!
//! The ceiling is a hard bound: no listing, however it behaves, causes more
//! than `ceiling` actions.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::browser::PageSession;

/// How a source's listing loads more posts, with its hard ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum PaginationStyle {
    InfiniteScroll {
        seed_url: String,
        max_scrolls: u32,
    },
    /// `page_url` contains a `{page}` placeholder (1-based).
    NumberedPages {
        page_url: String,
        /// Page 1 when it does not follow the template (e.g. `/articles/`).
        #[serde(default)]
        first_page_url: Option<String>,
        max_pages: u32,
    },
    ClickToLoad {
        seed_url: String,
        /// CSS selector for the "load more" control.
        control: String,
        max_clicks: u32,
    },
}

impl PaginationStyle {
    pub fn kind(&self) -> &'static str {
        match self {
            PaginationStyle::InfiniteScroll { .. } => "infinite-scroll",
            PaginationStyle::NumberedPages { .. } => "numbered-pages",
            PaginationStyle::ClickToLoad { .. } => "click-to-load",
        }
    }

    pub fn ceiling(&self) -> u32 {
        match self {
            PaginationStyle::InfiniteScroll { max_scrolls, .. } => *max_scrolls,
            PaginationStyle::NumberedPages { max_pages, .. } => *max_pages,
            PaginationStyle::ClickToLoad { max_clicks, .. } => *max_clicks,
        }
    }

    pub fn set_ceiling(&mut self, ceiling: u32) {
        match self {
            PaginationStyle::InfiniteScroll { max_scrolls, .. } => *max_scrolls = ceiling,
            PaginationStyle::NumberedPages { max_pages, .. } => *max_pages = ceiling,
            PaginationStyle::ClickToLoad { max_clicks, .. } => *max_clicks = ceiling,
        }
    }

    /// URL of the first listing page.
    pub fn seed_url(&self) -> String {
        match self {
            PaginationStyle::InfiniteScroll { seed_url, .. }
            | PaginationStyle::ClickToLoad { seed_url, .. } => seed_url.clone(),
            PaginationStyle::NumberedPages { .. } => self.page_url(1),
        }
    }

    /// URL of listing page `n` (1-based). Only numbered pages vary by `n`.
    pub fn page_url(&self, n: u32) -> String {
        match self {
            PaginationStyle::NumberedPages {
                page_url,
                first_page_url,
                ..
            } => match (n, first_page_url) {
                (1, Some(first)) => first.clone(),
                _ => page_url.replace("{page}", &n.to_string()),
            },
            _ => self.seed_url(),
        }
    }
}

/// Why the controller stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A scroll did not change the page height.
    NoNewContent,
    /// A numbered page yielded zero posts.
    EmptyPage,
    /// The load-more control was absent or not interactable.
    ControlMissing,
    /// The ceiling was reached.
    CeilingReached,
    /// A page load, scroll, or click after the first page failed; what
    /// already loaded is kept.
    FetchFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaginationState {
    Loading,
    Evaluating,
    Done(StopReason),
}

/// Pages collected by one controller run.
#[derive(Debug, Clone)]
pub struct PaginationRun {
    /// Raw page documents, in load order.
    pub pages: Vec<String>,
    /// Scrolls, page loads, or clicks performed.
    pub actions: u32,
    pub stop: StopReason,
}

pub struct PaginationController<'a> {
    style: &'a PaginationStyle,
    pacing: Duration,
}

impl<'a> PaginationController<'a> {
    pub fn new(style: &'a PaginationStyle, pacing: Duration) -> Self {
        Self { style, pacing }
    }

    /// Run the listing to completion.
    ///
    /// `count_posts` reports how many post fragments a page document holds;
    /// numbered-page listings stop on the first page where it returns zero.
    /// A failure to load the first page is returned as an error; any later
    /// failure stops with [`StopReason::FetchFailed`] and keeps what loaded.
    pub async fn run(
        &self,
        session: &mut dyn PageSession,
        count_posts: &(dyn Fn(&str) -> usize + Send + Sync),
    ) -> Result<PaginationRun> {
        let run = match self.style {
            PaginationStyle::InfiniteScroll {
                seed_url,
                max_scrolls,
            } => self.infinite_scroll(session, seed_url, *max_scrolls).await?,
            PaginationStyle::NumberedPages { max_pages, .. } => {
                self.numbered_pages(session, *max_pages, count_posts).await?
            }
            PaginationStyle::ClickToLoad {
                seed_url,
                control,
                max_clicks,
            } => {
                self.click_to_load(session, seed_url, control, *max_clicks)
                    .await?
            }
        };

        debug!(
            style = self.style.kind(),
            pages = run.pages.len(),
            actions = run.actions,
            stop = ?run.stop,
            "Pagination finished"
        );
        Ok(run)
    }

    async fn pause(&self) {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }

    async fn infinite_scroll(
        &self,
        session: &mut dyn PageSession,
        seed_url: &str,
        ceiling: u32,
    ) -> Result<PaginationRun> {
        session.goto(seed_url).await?;
        self.pause().await;

        let mut last_height = session.page_height().await?;
        let mut scrolls = 0;
        let mut state = initial_state(ceiling);

        let stop = loop {
            state = match state {
                PaginationState::Loading => match session.scroll_to_bottom().await {
                    Ok(()) => {
                        self.pause().await;
                        scrolls += 1;
                        PaginationState::Evaluating
                    }
                    Err(e) => {
                        warn!(scrolls, error = %e, "Scroll failed, keeping loaded posts");
                        PaginationState::Done(StopReason::FetchFailed)
                    }
                },
                PaginationState::Evaluating => match session.page_height().await {
                    Ok(height) => {
                        debug!(scrolls, last_height, height, "Evaluated scroll");
                        if height == last_height {
                            PaginationState::Done(StopReason::NoNewContent)
                        } else if scrolls >= ceiling {
                            PaginationState::Done(StopReason::CeilingReached)
                        } else {
                            last_height = height;
                            PaginationState::Loading
                        }
                    }
                    Err(e) => {
                        warn!(scrolls, error = %e, "Page height unavailable, keeping loaded posts");
                        PaginationState::Done(StopReason::FetchFailed)
                    }
                },
                PaginationState::Done(reason) => break reason,
            };
        };

        Ok(PaginationRun {
            pages: vec![session.content().await?],
            actions: scrolls,
            stop,
        })
    }

    async fn numbered_pages(
        &self,
        session: &mut dyn PageSession,
        ceiling: u32,
        count_posts: &(dyn Fn(&str) -> usize + Send + Sync),
    ) -> Result<PaginationRun> {
        let mut pages = Vec::new();
        let mut loaded = 0;
        let mut current = String::new();
        let mut state = initial_state(ceiling);

        let stop = loop {
            state = match state {
                PaginationState::Loading => {
                    if loaded > 0 {
                        self.pause().await;
                    }
                    let url = self.style.page_url(loaded + 1);
                    let fetched = match session.goto(&url).await {
                        Ok(()) => session.content().await,
                        Err(e) => Err(e),
                    };
                    loaded += 1;
                    match fetched {
                        Ok(html) => {
                            current = html;
                            PaginationState::Evaluating
                        }
                        // Losing page 1 means the listing is unreachable.
                        Err(e) if loaded == 1 => return Err(e),
                        Err(e) => {
                            warn!(url = %url, error = %e, "Listing page failed, keeping earlier pages");
                            PaginationState::Done(StopReason::FetchFailed)
                        }
                    }
                }
                PaginationState::Evaluating => {
                    let posts = count_posts(&current);
                    debug!(page = loaded, posts, "Evaluated page");
                    if posts == 0 {
                        PaginationState::Done(StopReason::EmptyPage)
                    } else {
                        pages.push(std::mem::take(&mut current));
                        if loaded >= ceiling {
                            PaginationState::Done(StopReason::CeilingReached)
                        } else {
                            PaginationState::Loading
                        }
                    }
                }
                PaginationState::Done(reason) => break reason,
            };
        };

        Ok(PaginationRun {
            pages,
            actions: loaded,
            stop,
        })
    }

    async fn click_to_load(
        &self,
        session: &mut dyn PageSession,
        seed_url: &str,
        control: &str,
        ceiling: u32,
    ) -> Result<PaginationRun> {
        session.goto(seed_url).await?;
        self.pause().await;

        let mut clicks = 0;
        let mut clicked = false;
        let mut state = initial_state(ceiling);

        let stop = loop {
            state = match state {
                PaginationState::Loading => match session.click(control).await {
                    Ok(true) => {
                        clicked = true;
                        clicks += 1;
                        self.pause().await;
                        PaginationState::Evaluating
                    }
                    Ok(false) => {
                        clicked = false;
                        PaginationState::Evaluating
                    }
                    Err(e) => {
                        warn!(clicks, error = %e, "Load-more failed, keeping loaded posts");
                        PaginationState::Done(StopReason::FetchFailed)
                    }
                },
                PaginationState::Evaluating => {
                    debug!(clicks, clicked, "Evaluated load-more click");
                    if !clicked {
                        PaginationState::Done(StopReason::ControlMissing)
                    } else if clicks >= ceiling {
                        PaginationState::Done(StopReason::CeilingReached)
                    } else {
                        PaginationState::Loading
                    }
                }
                PaginationState::Done(reason) => break reason,
            };
        };

        Ok(PaginationRun {
            pages: vec![session.content().await?],
            actions: clicks,
            stop,
        })
    }
}

fn initial_state(ceiling: u32) -> PaginationState {
    if ceiling == 0 {
        PaginationState::Done(StopReason::CeilingReached)
    } else {
        PaginationState::Loading
    }
}
