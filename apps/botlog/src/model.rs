use std::fmt;
use std::ops::Range;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};

/// Which way through history a page cursor points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Older,
    Newer,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Older => "prev",
            Direction::Newer => "next",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Message,
    Action,
    Join,
    Part,
    Quit,
    Nick,
    Notice,
    Topic,
    Shutdown,
    Away,
    Other(String),
}

impl EntryKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "message" | "privmsg" => EntryKind::Message,
            "action" => EntryKind::Action,
            "join" => EntryKind::Join,
            "part" => EntryKind::Part,
            "quit" => EntryKind::Quit,
            "nick" => EntryKind::Nick,
            "notice" => EntryKind::Notice,
            "topic" => EntryKind::Topic,
            "shutdown" => EntryKind::Shutdown,
            "away" => EntryKind::Away,
            other => EntryKind::Other(other.to_string()),
        }
    }

    /// Join/part/quit lines, the ones the "only chat" preference hides.
    pub fn is_status(&self) -> bool {
        matches!(self, EntryKind::Join | EntryKind::Part | EntryKind::Quit)
    }

    pub fn is_message(&self) -> bool {
        matches!(self, EntryKind::Message)
    }
}

/// One rendered log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub id: Option<String>,
    pub nick: String,
    pub kind: EntryKind,
    pub timestamp: DateTime<FixedOffset>,
    pub time_label: String,
    pub body: String,
    pub image_links: Vec<String>,
    /// Byte ranges of `body` matching the active search term.
    pub matches: Vec<Range<usize>>,
    pub actor_hidden: bool,
    pub filtered: bool,
    pub highlighted: bool,
}

impl LogEntry {
    pub fn new(nick: impl Into<String>, kind: EntryKind, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            id: None,
            nick: nick.into(),
            kind,
            time_label: time_label(&timestamp),
            timestamp,
            body: String::new(),
            image_links: Vec::new(),
            matches: Vec::new(),
            actor_hidden: false,
            filtered: false,
            highlighted: false,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    pub fn flat_date(&self) -> u32 {
        flat_date(self.date())
    }
}

/// Separator between two entries whose calendar dates differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMarker {
    pub flat: u32,
    pub label: String,
}

impl DateMarker {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            flat: flat_date(date),
            label: format!(
                "{} {}, {}",
                date.format("%B"),
                ordinal(date.day()),
                date.year()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogItem {
    Entry(LogEntry),
    Marker(DateMarker),
}

impl LogItem {
    pub fn as_entry(&self) -> Option<&LogEntry> {
        match self {
            LogItem::Entry(entry) => Some(entry),
            LogItem::Marker(_) => None,
        }
    }

    pub fn as_entry_mut(&mut self) -> Option<&mut LogEntry> {
        match self {
            LogItem::Entry(entry) => Some(entry),
            LogItem::Marker(_) => None,
        }
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, LogItem::Marker(_))
    }
}

/// YYYYMMDD as an integer, the key used by markers and the timeline.
pub fn flat_date(date: NaiveDate) -> u32 {
    date.year().max(0) as u32 * 10_000 + date.month() * 100 + date.day()
}

pub fn date_from_flat(flat: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt((flat / 10_000) as i32, (flat / 100) % 100, flat % 100)
}

/// "3:05 pm"
pub fn time_label<Tz: chrono::TimeZone>(timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    timestamp.format("%-I:%M %P").to_string()
}

/// "March 1st 2021", used for the sticky date header.
pub fn header_label(date: NaiveDate) -> String {
    format!(
        "{} {} {}",
        date.format("%B"),
        ordinal(date.day()),
        date.year()
    )
}

fn ordinal(day: u32) -> String {
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{day}{suffix}")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_and_restores_dates() {
        let date = NaiveDate::from_ymd_opt(2021, 2, 15).unwrap();
        assert_eq!(flat_date(date), 20210215);
        assert_eq!(date_from_flat(20210215), Some(date));
        assert_eq!(date_from_flat(20211341), None);
    }

    #[test]
    fn marker_labels_use_ordinals() {
        let marker = DateMarker::for_date(NaiveDate::from_ymd_opt(2021, 3, 1).unwrap());
        assert_eq!(marker.flat, 20210301);
        assert_eq!(marker.label, "March 1st, 2021");
        assert_eq!(
            header_label(NaiveDate::from_ymd_opt(2020, 12, 12).unwrap()),
            "December 12th 2020"
        );
        assert_eq!(ordinal(22), "22nd");
        assert_eq!(ordinal(113), "113th");
    }

    #[test]
    fn status_kinds() {
        assert!(EntryKind::parse("JOIN").is_status());
        assert!(EntryKind::parse("part").is_status());
        assert!(EntryKind::parse("quit").is_status());
        assert!(!EntryKind::parse("nick").is_status());
        assert_eq!(EntryKind::parse("privmsg"), EntryKind::Message);
        assert_eq!(
            EntryKind::parse("kick"),
            EntryKind::Other("kick".to_string())
        );
    }

    #[test]
    fn time_labels_are_short() {
        let ts = DateTime::parse_from_rfc3339("2021-03-01T15:05:00+00:00").unwrap();
        assert_eq!(time_label(&ts), "3:05 pm");
    }
}
