//! Side index of dates that follows the viewer's position.

use std::ops::Range;

use tracing::trace;
use url::form_urlencoded;

/// Number of most recent years shown before "older" is expanded.
pub const VISIBLE_YEARS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineLink {
    /// YYYYMMDD
    pub date: u32,
    pub href: String,
    pub label: String,
    /// The link for the live log.
    pub current: bool,
}

impl TimelineLink {
    pub fn year(&self) -> u32 {
        self.date / 10_000
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearGroup {
    pub year: u32,
    pub expanded: bool,
    pub visible: bool,
    links: Range<usize>,
}

impl YearGroup {
    /// Indices into [`Timeline::links`] covered by this year.
    pub fn link_range(&self) -> Range<usize> {
        self.links.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpTarget {
    /// The date is already in the log at this offset.
    Loaded(u32),
    /// The date has to be opened as its own page.
    Navigate(String),
}

#[derive(Debug, Clone)]
pub struct Timeline {
    links: Vec<TimelineLink>,
    groups: Vec<YearGroup>,
    active: Option<usize>,
    pinned_current: bool,
}

impl Timeline {
    pub fn new(mut links: Vec<TimelineLink>, client_zone: Option<&str>, is_current: bool) -> Self {
        if let Some(zone) = client_zone {
            for link in links.iter_mut().filter(|link| !link.current) {
                link.href = with_timezone(&link.href, zone);
            }
        }
        links.sort_by_key(|link| link.date);

        let mut groups: Vec<YearGroup> = Vec::new();
        for (idx, link) in links.iter().enumerate() {
            match groups.last_mut() {
                Some(group) if group.year == link.year() => group.links.end = idx + 1,
                _ => groups.push(YearGroup {
                    year: link.year(),
                    expanded: false,
                    visible: false,
                    links: idx..idx + 1,
                }),
            }
        }
        let first_visible = groups.len().saturating_sub(VISIBLE_YEARS);
        for group in &mut groups[first_visible..] {
            group.visible = true;
        }
        if let Some(latest) = groups.last_mut() {
            latest.expanded = true;
        }

        Self {
            links,
            groups,
            active: None,
            pinned_current: is_current,
        }
    }

    pub fn links(&self) -> &[TimelineLink] {
        &self.links
    }

    pub fn groups(&self) -> &[YearGroup] {
        &self.groups
    }

    pub fn group_links(&self, group: &YearGroup) -> &[TimelineLink] {
        &self.links[group.links.clone()]
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active(&self) -> Option<&TimelineLink> {
        self.active.map(|idx| &self.links[idx])
    }

    pub fn has_hidden_years(&self) -> bool {
        self.groups.iter().any(|group| !group.visible)
    }

    /// Activates the last link dated on or before `flat`. Falls back to the
    /// current link when every link is later, or while pinned to the live edge.
    pub fn on_date_changed(&mut self, flat: u32, at_bottom: bool) -> Option<usize> {
        if !at_bottom {
            self.pinned_current = false;
        }
        if self.pinned_current {
            return self.activate_current();
        }
        match self.links.partition_point(|link| link.date <= flat).checked_sub(1) {
            Some(idx) => self.activate(idx),
            None => self.activate_current(),
        }
    }

    pub fn on_at_bottom(&mut self) -> Option<usize> {
        self.pinned_current = true;
        self.activate_current()
    }

    fn activate_current(&mut self) -> Option<usize> {
        match self.links.iter().position(|link| link.current) {
            Some(idx) => self.activate(idx),
            None => {
                self.active = None;
                None
            }
        }
    }

    fn activate(&mut self, idx: usize) -> Option<usize> {
        trace!(target = "botlog.timeline", date = self.links[idx].date, "activating link");
        self.active = Some(idx);
        if let Some(group) = self.groups.iter_mut().find(|group| group.links.contains(&idx)) {
            group.visible = true;
            group.expanded = true;
        }
        Some(idx)
    }

    pub fn show_all_years(&mut self) {
        for group in &mut self.groups {
            group.visible = true;
        }
    }

    /// Opens `year` and closes every other open group; toggles it if already open.
    pub fn toggle_group(&mut self, year: u32) {
        for group in &mut self.groups {
            if group.year == year {
                group.expanded = !group.expanded;
            } else {
                group.expanded = false;
            }
        }
    }

    /// Where following link `idx` leads, given a lookup for loaded markers.
    pub fn jump_target(&self, idx: usize, loaded: impl Fn(u32) -> Option<u32>) -> Option<JumpTarget> {
        let link = self.links.get(idx)?;
        Some(match loaded(link.date) {
            Some(offset) => JumpTarget::Loaded(offset),
            None => JumpTarget::Navigate(link.href.clone()),
        })
    }
}

fn with_timezone(href: &str, zone: &str) -> String {
    let zone: String = form_urlencoded::byte_serialize(zone.as_bytes()).collect();
    let separator = if href.contains('?') { '&' } else { '?' };
    format!("{href}{separator}tz={zone}")
}
