//! One-direction page buffer for historical log pages.
//!
//! A cache holds at most one staged page and never touches the visible list;
//! the viewer drains it and immediately asks for the next page so one page is
//! always warm ahead of the scroll position.

use std::mem;
use std::time::Duration;

use history_sdk::{HistoryError, PageResponse};
use tracing::{debug, warn};

use crate::fragment::parse_items;
use crate::model::{Direction, LogItem};
use crate::normalize::Normalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

/// A request the runtime should perform on the cache's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub direction: Direction,
    pub url: String,
    pub generation: u64,
}

/// Completion of a [`PageRequest`].
#[derive(Debug)]
pub struct PageEvent {
    pub direction: Direction,
    pub generation: u64,
    pub result: Result<PageResponse, HistoryError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Idle,
    Loading,
    Ready,
    Exhausted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStart {
    Request(PageRequest),
    /// No cursor was ever supplied; the cache counts as loaded with nothing in it.
    Vacuous,
    Busy,
    Exhausted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Loaded,
    Exhausted,
    Retry { after: Duration },
    Failed,
    Stale,
}

/// Work applied to every page before it is staged.
#[derive(Debug, Clone)]
pub struct PagePrep {
    pub normalizer: Normalizer,
    pub client_zone: Option<String>,
    pub search_term: Option<String>,
}

impl PagePrep {
    pub fn new(normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            client_zone: None,
            search_term: None,
        }
    }

    /// True when the server rendered in a zone other than the viewer's.
    pub fn zone_mismatch(&self, server_zone: Option<&str>) -> bool {
        self.client_zone.as_deref() != server_zone
    }

    pub fn prepare(&self, items: Vec<LogItem>, adjust_timezone: bool) -> Vec<LogItem> {
        let mut items = if adjust_timezone {
            self.normalizer.normalize_page(items, None)
        } else {
            items
        };
        if let Some(term) = self.search_term.as_deref() {
            mark_matches(&mut items, term);
        }
        items
    }
}

/// Records case-insensitive occurrences of `term` in each entry body.
pub fn mark_matches(items: &mut [LogItem], term: &str) {
    let needle = term.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return;
    }
    for entry in items.iter_mut().filter_map(LogItem::as_entry_mut) {
        let haystack = entry.body.to_ascii_lowercase();
        entry.matches = haystack
            .match_indices(&needle)
            .map(|(start, found)| start..start + found.len())
            .collect();
    }
}

#[derive(Debug)]
pub struct PageCache {
    direction: Direction,
    cursor: Option<String>,
    state: CacheState,
    staged: Vec<LogItem>,
    exhausted: bool,
    waiting: bool,
    generation: u64,
    attempts: u32,
    retry: RetryPolicy,
}

impl PageCache {
    pub fn new(direction: Direction, cursor: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            direction,
            cursor: cursor.filter(|c| !c.trim().is_empty()),
            state: CacheState::Idle,
            staged: Vec::new(),
            exhausted: false,
            waiting: false,
            generation: 0,
            attempts: 0,
            retry,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.state == CacheState::Loading
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_failed(&self) -> bool {
        self.state == CacheState::Failed
    }

    /// True when nothing but (at most) date markers is staged.
    pub fn is_empty(&self) -> bool {
        !self.staged.iter().any(|item| !item.is_marker())
    }

    /// Nothing staged and nothing left to request.
    pub fn is_drained(&self) -> bool {
        self.is_empty() && !self.is_loading() && (self.exhausted || self.cursor.is_none())
    }

    pub fn staged(&self) -> &[LogItem] {
        &self.staged
    }

    /// Starts loading the page under the current cursor.
    pub fn fetch(&mut self) -> FetchStart {
        match self.state {
            CacheState::Loading => return FetchStart::Busy,
            CacheState::Failed => return FetchStart::Failed,
            _ => {}
        }
        if self.exhausted {
            return FetchStart::Exhausted;
        }
        match &self.cursor {
            Some(url) => {
                self.generation += 1;
                self.attempts = 0;
                self.state = CacheState::Loading;
                debug!(target = "botlog.cache", direction = %self.direction, %url, generation = self.generation, "fetching page");
                FetchStart::Request(PageRequest {
                    direction: self.direction,
                    url: url.clone(),
                    generation: self.generation,
                })
            }
            None => {
                self.state = CacheState::Ready;
                FetchStart::Vacuous
            }
        }
    }

    /// Applies a finished request to the cache.
    pub fn complete(&mut self, event: PageEvent, prep: &PagePrep) -> CacheOutcome {
        if event.generation != self.generation || !self.is_loading() {
            debug!(target = "botlog.cache", direction = %self.direction, generation = event.generation, "dropping stale page");
            return CacheOutcome::Stale;
        }
        match event.result {
            Ok(page) => {
                self.attempts = 0;
                let adjust = prep.zone_mismatch(page.timezone.as_deref());
                let next = match self.direction {
                    Direction::Older => page.prev_page,
                    Direction::Newer => page.next_page,
                };
                self.staged = prep.prepare(parse_items(&page.body), adjust);
                self.cursor = next;
                if self.cursor.is_none() {
                    self.exhausted = true;
                }
                if self.exhausted && self.is_empty() {
                    self.staged.clear();
                    self.state = CacheState::Exhausted;
                    CacheOutcome::Exhausted
                } else {
                    self.state = CacheState::Ready;
                    CacheOutcome::Loaded
                }
            }
            Err(HistoryError::NotFound) => {
                debug!(target = "botlog.cache", direction = %self.direction, "page not found; history exhausted");
                self.cursor = None;
                self.exhausted = true;
                self.state = CacheState::Exhausted;
                CacheOutcome::Exhausted
            }
            Err(err) => {
                self.attempts += 1;
                if self.attempts < self.retry.max_attempts {
                    let after = self.retry.delay_for(self.attempts);
                    warn!(target = "botlog.cache", direction = %self.direction, error = %err, attempt = self.attempts, retry_in_ms = after.as_millis() as u64, "page fetch failed; retrying");
                    CacheOutcome::Retry { after }
                } else {
                    warn!(target = "botlog.cache", direction = %self.direction, error = %err, attempts = self.attempts, "page fetch failed; giving up until the next load");
                    self.state = CacheState::Failed;
                    CacheOutcome::Failed
                }
            }
        }
    }

    /// Re-issues the request for `generation` after a backoff.
    pub fn retry(&mut self, generation: u64) -> Option<PageRequest> {
        if generation != self.generation || !self.is_loading() {
            return None;
        }
        self.cursor.as_ref().map(|url| PageRequest {
            direction: self.direction,
            url: url.clone(),
            generation,
        })
    }

    /// Leaves the failed state and starts a fresh attempt sequence.
    pub fn rearm(&mut self) -> FetchStart {
        if self.state == CacheState::Failed {
            self.state = CacheState::Idle;
            self.attempts = 0;
        }
        self.fetch()
    }

    pub fn take_staged(&mut self) -> Vec<LogItem> {
        if self.state == CacheState::Ready {
            self.state = if self.exhausted {
                CacheState::Exhausted
            } else {
                CacheState::Idle
            };
        }
        mem::take(&mut self.staged)
    }

    /// Clears the staging area and loads the next page.
    pub fn refetch(&mut self) -> FetchStart {
        self.staged.clear();
        if self.state == CacheState::Ready {
            self.state = CacheState::Idle;
        }
        self.fetch()
    }

    /// Registers a one-shot interest in the next completion.
    pub fn wait_for_load(&mut self) {
        self.waiting = true;
    }

    pub fn take_waiter(&mut self) -> bool {
        mem::take(&mut self.waiting)
    }
}
