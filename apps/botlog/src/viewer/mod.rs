//! The log viewer controller.
//!
//! Owns the visible list, both page caches and the push-stream state. Every
//! operation runs to completion and hands back the [`Effect`]s the runtime has
//! to carry out; nothing in here performs I/O.

mod scroll;
mod signals;

use std::mem;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, trace};

pub use scroll::{FixedHeights, Measure, ScrollPolicy, ScrollState};
pub use signals::{
    ViewerSignal, APPENDED_TOPIC, AT_BOTTOM_TOPIC, DATE_CHANGE_TOPIC, PAGE_LOADED_TOPIC,
};

use crate::cache::{
    CacheOutcome, FetchStart, PageCache, PageEvent, PagePrep, PageRequest, RetryPolicy,
};
use crate::filter::StatusFilter;
use crate::fragment::{parse_items, ShellPage};
use crate::model::{DateMarker, Direction, LogEntry, LogItem};
use crate::normalize::{marker_between, Normalizer};
use crate::prefs::Preferences;

/// Animation length for the auto-scroll after a streamed entry.
pub const STREAM_SCROLL_TRANSITION: Duration = Duration::from_millis(50);

/// Work the controller asks its runtime to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Fetch(PageRequest),
    OpenStream {
        url: String,
    },
    /// The model already moved to `offset`; front ends animate over `transition`.
    ScrollTo {
        offset: u32,
        transition: Duration,
    },
    Retry {
        direction: Direction,
        generation: u64,
        after: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTrigger {
    /// The scroll position reached an edge.
    Scroll,
    /// A cache we were waiting on finished.
    Loaded,
}

#[derive(Debug, Clone)]
pub struct ViewerSetup {
    /// Key under which per-page preferences are stored.
    pub page_key: String,
    pub normalizer: Normalizer,
    pub client_zone: Option<String>,
    pub policy: ScrollPolicy,
    pub retry: RetryPolicy,
    pub viewport: u32,
}

impl ViewerSetup {
    pub fn new(page_key: impl Into<String>, normalizer: Normalizer) -> Self {
        Self {
            page_key: page_key.into(),
            normalizer,
            client_zone: None,
            policy: ScrollPolicy::default(),
            retry: RetryPolicy::default(),
            viewport: 0,
        }
    }
}

pub struct LogViewer<M = FixedHeights> {
    items: Vec<LogItem>,
    older: PageCache,
    newer: PageCache,
    prep: PagePrep,
    filter: StatusFilter,
    prefs: Preferences,
    page_key: String,
    policy: ScrollPolicy,
    measure: M,
    scroll: ScrollState,
    loading_older: bool,
    loading_newer: bool,
    stream_url: Option<String>,
    stream_open: bool,
    current: bool,
    adjust_initial: bool,
    shell_prepared: bool,
    top_date: Option<NaiveDate>,
    signals: Vec<ViewerSignal>,
}

impl<M: Measure> LogViewer<M> {
    pub fn new(shell: ShellPage, setup: ViewerSetup, prefs: Preferences, measure: M) -> Self {
        let filter = StatusFilter::load(&prefs, &setup.page_key);
        let mut prep = PagePrep::new(setup.normalizer);
        prep.client_zone = setup.client_zone;
        prep.search_term = shell.search_term;
        let adjust_initial = shell.server_timezone.is_none()
            || prep.zone_mismatch(shell.server_timezone.as_deref());
        Self {
            items: shell.items,
            older: PageCache::new(Direction::Older, shell.previous, setup.retry),
            newer: PageCache::new(Direction::Newer, shell.next, setup.retry),
            prep,
            filter,
            prefs,
            page_key: setup.page_key,
            policy: setup.policy,
            measure,
            scroll: ScrollState {
                offset: 0,
                viewport: setup.viewport,
                content: 0,
            },
            loading_older: false,
            loading_newer: false,
            stream_url: shell.source,
            stream_open: false,
            current: shell.current,
            adjust_initial,
            shell_prepared: false,
            top_date: None,
            signals: Vec::new(),
        }
    }

    pub fn items(&self) -> &[LogItem] {
        &self.items
    }

    pub fn scroll(&self) -> ScrollState {
        self.scroll
    }

    pub fn cache(&self, direction: Direction) -> &PageCache {
        match direction {
            Direction::Older => &self.older,
            Direction::Newer => &self.newer,
        }
    }

    fn cache_mut(&mut self, direction: Direction) -> &mut PageCache {
        match direction {
            Direction::Older => &mut self.older,
            Direction::Newer => &mut self.newer,
        }
    }

    pub fn is_loading(&self, direction: Direction) -> bool {
        match direction {
            Direction::Older => self.loading_older,
            Direction::Newer => self.loading_newer,
        }
    }

    fn set_loading(&mut self, direction: Direction, loading: bool) {
        match direction {
            Direction::Older => self.loading_older = loading,
            Direction::Newer => self.loading_newer = loading,
        }
    }

    pub fn stream_open(&self) -> bool {
        self.stream_open
    }

    pub fn is_current(&self) -> bool {
        self.current
    }

    pub fn only_chat(&self) -> bool {
        self.filter.only_chat()
    }

    pub fn search_term(&self) -> Option<&str> {
        self.prep.search_term.as_deref()
    }

    pub fn top_date(&self) -> Option<NaiveDate> {
        self.top_date
    }

    pub fn is_at_bottom(&self) -> bool {
        self.scroll.at_bottom(self.policy.edge)
    }

    /// Signals raised since the last drain, oldest first.
    pub fn drain_signals(&mut self) -> Vec<ViewerSignal> {
        mem::take(&mut self.signals)
    }

    /// Prepares the server-rendered entries, warms both caches and runs the
    /// first scroll check.
    pub fn start(&mut self) -> Vec<Effect> {
        self.prepare_shell();

        let mut effects = Vec::new();
        for direction in [Direction::Older, Direction::Newer] {
            if let FetchStart::Request(request) = self.cache_mut(direction).fetch() {
                effects.push(Effect::Fetch(request));
            }
        }
        if self.current {
            effects.extend(self.open_stream());
            self.scroll.offset = self.scroll.max_offset();
            effects.push(Effect::ScrollTo {
                offset: self.scroll.offset,
                transition: Duration::ZERO,
            });
        }
        self.track_top_date();
        effects.extend(self.scroll_check());
        effects
    }

    /// Subscribes to the push stream without loading any history.
    pub fn follow_live(&mut self) -> Vec<Effect> {
        self.prepare_shell();
        let effects = self.open_stream();
        self.track_top_date();
        effects
    }

    /// Normalizes and filters the server-rendered entries. Runs once.
    fn prepare_shell(&mut self) {
        if self.shell_prepared {
            return;
        }
        self.shell_prepared = true;
        let items = mem::take(&mut self.items);
        let mut items = self.prep.prepare(items, self.adjust_initial);
        self.filter.apply(&mut items);
        self.items = items;
        self.relayout();
    }

    pub fn set_viewport(&mut self, viewport: u32) -> Vec<Effect> {
        self.scroll.viewport = viewport;
        self.scroll.clamp();
        self.track_top_date();
        self.scroll_check()
    }

    pub fn on_scroll(&mut self, offset: u32) -> Vec<Effect> {
        self.scroll.offset = offset;
        self.scroll.clamp();
        self.track_top_date();
        self.scroll_check()
    }

    pub fn scroll_by(&mut self, delta: i64) -> Vec<Effect> {
        let target = (i64::from(self.scroll.offset) + delta).clamp(0, i64::from(self.scroll.max_offset()));
        self.on_scroll(target as u32)
    }

    /// Starts a load when the offset sits near an edge and that direction is idle.
    pub fn scroll_check(&mut self) -> Vec<Effect> {
        let Some(mut direction) = self.policy.classify(&self.scroll) else {
            return Vec::new();
        };
        if direction == Direction::Older
            && self.older.is_drained()
            && self.policy.near(&self.scroll, Direction::Newer)
        {
            direction = Direction::Newer;
        }
        if self.is_loading(direction) {
            return Vec::new();
        }
        trace!(target = "botlog.viewer", %direction, offset = self.scroll.offset, "edge reached");
        self.set_loading(direction, true);
        self.page_load(direction, LoadTrigger::Scroll)
    }

    pub fn page_load(&mut self, direction: Direction, trigger: LoadTrigger) -> Vec<Effect> {
        if self.cache(direction).is_loading() {
            self.cache_mut(direction).wait_for_load();
            return Vec::new();
        }

        if self.cache(direction).is_failed() {
            if trigger == LoadTrigger::Loaded {
                self.set_loading(direction, false);
                return Vec::new();
            }
            return match self.cache_mut(direction).rearm() {
                FetchStart::Request(request) => {
                    debug!(target = "botlog.viewer", %direction, "re-arming failed cache");
                    self.cache_mut(direction).wait_for_load();
                    vec![Effect::Fetch(request)]
                }
                _ => {
                    self.set_loading(direction, false);
                    Vec::new()
                }
            };
        }

        if self.cache(direction).is_exhausted() && self.cache(direction).is_empty() {
            self.set_loading(direction, false);
            return match direction {
                Direction::Newer => self.open_stream(),
                Direction::Older => Vec::new(),
            };
        }

        let staged = self.cache_mut(direction).take_staged();
        let (inserted, mut effects) = self.insert_cache(direction, staged);
        if let FetchStart::Request(request) = self.cache_mut(direction).refetch() {
            effects.push(Effect::Fetch(request));
        }
        self.set_loading(direction, false);
        if inserted > 0 {
            effects.extend(self.scroll_check());
        }
        effects
    }

    /// Splices a drained page into the visible list. Returns how many entries
    /// went in.
    pub fn insert_cache(&mut self, direction: Direction, staged: Vec<LogItem>) -> (usize, Vec<Effect>) {
        let count = staged.iter().filter(|item| !item.is_marker()).count();
        if count == 0 {
            return (0, Vec::new());
        }
        let mut staged = staged;
        self.filter.apply(&mut staged);

        let mut effects = Vec::new();
        match direction {
            Direction::Older => {
                let has_marker = staged.last().is_some_and(LogItem::is_marker)
                    || self.items.first().is_some_and(LogItem::is_marker);
                let marker = match (last_entry(&staged), first_entry_mut(&mut self.items)) {
                    (Some(first), Some(second)) => check_page_split(first, second),
                    _ => None,
                };
                if let Some(marker) = marker.filter(|_| !has_marker) {
                    staged.push(LogItem::Marker(marker));
                }

                let before = self.scroll.content;
                self.items.splice(0..0, staged);
                self.relayout();
                let grown = self.scroll.content.saturating_sub(before);
                self.scroll.offset = self.scroll.offset.saturating_add(grown);
                self.scroll.clamp();
                effects.push(Effect::ScrollTo {
                    offset: self.scroll.offset,
                    transition: Duration::ZERO,
                });
            }
            Direction::Newer => {
                self.append(staged);
            }
        }
        debug!(target = "botlog.viewer", %direction, count, "page inserted");
        self.signals.push(ViewerSignal::PageLoaded { direction, count });
        self.track_top_date();
        (count, effects)
    }

    /// Routes a finished page request to its cache.
    pub fn on_page(&mut self, event: PageEvent) -> Vec<Effect> {
        let direction = event.direction;
        let (cache, prep) = match direction {
            Direction::Older => (&mut self.older, &self.prep),
            Direction::Newer => (&mut self.newer, &self.prep),
        };
        match cache.complete(event, prep) {
            CacheOutcome::Stale => Vec::new(),
            CacheOutcome::Retry { after } => vec![Effect::Retry {
                direction,
                generation: cache.generation(),
                after,
            }],
            CacheOutcome::Loaded | CacheOutcome::Exhausted | CacheOutcome::Failed => {
                if cache.take_waiter() {
                    self.page_load(direction, LoadTrigger::Loaded)
                } else {
                    Vec::new()
                }
            }
        }
    }

    pub fn on_retry(&mut self, direction: Direction, generation: u64) -> Vec<Effect> {
        self.cache_mut(direction)
            .retry(generation)
            .map(Effect::Fetch)
            .into_iter()
            .collect()
    }

    /// Subscribes to the push stream. Only the first call opens it.
    pub fn open_stream(&mut self) -> Vec<Effect> {
        self.signals.push(ViewerSignal::AtBottom);
        if self.stream_open {
            return Vec::new();
        }
        let Some(url) = self.stream_url.clone() else {
            debug!(target = "botlog.viewer", "no push stream for this page");
            return Vec::new();
        };
        self.stream_open = true;
        info!(target = "botlog.viewer", %url, "opening push stream");
        vec![Effect::OpenStream { url }]
    }

    /// Appends entries pushed by the server.
    pub fn on_stream_log(&mut self, html: &str) -> Vec<Effect> {
        let incoming = parse_items(html);
        if !incoming.iter().any(|item| !item.is_marker()) {
            return Vec::new();
        }
        let was_at_bottom = self.is_at_bottom();
        let prev = last_entry(&self.items).map(LogEntry::date);
        let mut batch = self.prep.normalizer.normalize_page(incoming, prev);
        self.filter.apply(&mut batch);
        let start = self.append(batch);
        self.signals
            .push(ViewerSignal::Appended(self.items[start..].to_vec()));

        let mut effects = Vec::new();
        if was_at_bottom {
            self.scroll.offset = self.scroll.max_offset();
            effects.push(Effect::ScrollTo {
                offset: self.scroll.offset,
                transition: STREAM_SCROLL_TRANSITION,
            });
        }
        self.track_top_date();
        effects
    }

    /// Appends after the last item, joining across the seam. Returns the index
    /// the batch starts at.
    fn append(&mut self, mut batch: Vec<LogItem>) -> usize {
        let has_marker = self.items.last().is_some_and(LogItem::is_marker)
            || batch.first().is_some_and(LogItem::is_marker);
        let marker = match (last_entry(&self.items), first_entry_mut(&mut batch)) {
            (Some(first), Some(second)) => check_page_split(first, second),
            _ => None,
        };
        if let Some(marker) = marker.filter(|_| !has_marker) {
            batch.insert(0, LogItem::Marker(marker));
        }
        let start = self.items.len();
        self.items.extend(batch);
        self.relayout();
        start
    }

    /// Marks the entry with `id` and centers the viewport on it.
    pub fn highlight(&mut self, id: &str) -> Vec<Effect> {
        let mut top = 0u32;
        let mut found = None;
        for item in &mut self.items {
            let height = self.measure.height(item);
            if let LogItem::Entry(entry) = item {
                entry.highlighted = entry.id.as_deref() == Some(id);
                if entry.highlighted {
                    found = Some((top, height));
                }
            }
            top += height;
        }
        let Some((top, height)) = found else {
            debug!(target = "botlog.viewer", id, "highlighted entry is not loaded");
            return Vec::new();
        };

        self.scroll.offset = (top + height / 2).saturating_sub(self.scroll.viewport / 2);
        self.scroll.clamp();
        let mut effects = vec![Effect::ScrollTo {
            offset: self.scroll.offset,
            transition: Duration::ZERO,
        }];
        self.track_top_date();
        effects.extend(self.scroll_check());
        effects
    }

    /// Flips "only chat" for this page and reapplies it.
    pub fn toggle_filter(&mut self) -> bool {
        let only_chat = self.filter.toggle(&mut self.prefs, &self.page_key);
        self.filter.apply(&mut self.items);
        self.relayout();
        self.track_top_date();
        only_chat
    }

    /// Offset of the date marker for `flat`, if it is loaded.
    pub fn marker_offset(&self, flat: u32) -> Option<u32> {
        let mut top = 0;
        for item in &self.items {
            if matches!(item, LogItem::Marker(marker) if marker.flat == flat) {
                return Some(top);
            }
            top += self.measure.height(item);
        }
        None
    }

    fn relayout(&mut self) {
        self.scroll.content = self.items.iter().map(|item| self.measure.height(item)).sum();
        self.scroll.clamp();
    }

    fn track_top_date(&mut self) {
        let mut top = 0;
        let mut date = None;
        for item in &self.items {
            let height = self.measure.height(item);
            if let LogItem::Entry(entry) = item {
                if height > 0 && top + height > self.scroll.offset {
                    date = Some(entry.date());
                    break;
                }
            }
            top += height;
        }
        if let Some(date) = date.filter(|date| self.top_date != Some(*date)) {
            self.top_date = Some(date);
            self.signals.push(ViewerSignal::DateChanged(date));
        }
    }
}

/// Joins two adjacent segments: hides a repeated chat author on the newer side
/// and returns the date marker that belongs between them, if any.
pub fn check_page_split(first: &LogEntry, second: &mut LogEntry) -> Option<DateMarker> {
    if first.nick == second.nick && first.kind.is_message() && second.kind.is_message() {
        second.actor_hidden = true;
    }
    marker_between(Some(first.date()), second.date())
}

fn last_entry(items: &[LogItem]) -> Option<&LogEntry> {
    items.iter().rev().find_map(LogItem::as_entry)
}

fn first_entry_mut(items: &mut [LogItem]) -> Option<&mut LogEntry> {
    items.iter_mut().find_map(LogItem::as_entry_mut)
}

#[cfg(test)]
mod tests;
