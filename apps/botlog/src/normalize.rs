use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Offset};
use thiserror::Error;
use tracing::trace;

use crate::model::{time_label, DateMarker, LogItem};

/// The zone timestamps are displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerZone {
    /// Whatever the machine running the viewer is set to.
    Local,
    Fixed(FixedOffset),
}

impl ViewerZone {
    pub fn convert(&self, timestamp: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        match self {
            ViewerZone::Local => {
                let local = timestamp.with_timezone(&Local);
                local.with_timezone(&local.offset().fix())
            }
            ViewerZone::Fixed(offset) => timestamp.with_timezone(offset),
        }
    }

    /// Zone name as the server spells it, when there is one.
    pub fn name(&self) -> Option<String> {
        match self {
            ViewerZone::Fixed(offset) if offset.local_minus_utc() == 0 => Some("UTC".to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognised timezone '{0}' (expected local, UTC or an offset like +09:00)")]
pub struct ZoneParseError(String);

impl FromStr for ViewerZone {
    type Err = ZoneParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("local") {
            return Ok(ViewerZone::Local);
        }
        if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
            return Ok(ViewerZone::Fixed(FixedOffset::east_opt(0).ok_or_else(|| ZoneParseError(raw.into()))?));
        }
        let (sign, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (1, &trimmed[1..]),
            Some(b'-') => (-1, &trimmed[1..]),
            _ => return Err(ZoneParseError(raw.to_string())),
        };
        let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "00"));
        let hours = offset_field(hours, 23).ok_or_else(|| ZoneParseError(raw.to_string()))?;
        let minutes = offset_field(minutes, 59).ok_or_else(|| ZoneParseError(raw.to_string()))?;
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(ViewerZone::Fixed)
            .ok_or_else(|| ZoneParseError(raw.to_string()))
    }
}

/// One or two ASCII digits no greater than `max`.
fn offset_field(raw: &str, max: i32) -> Option<i32> {
    if raw.is_empty() || raw.len() > 2 || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok().filter(|value| *value <= max)
}

/// Rewrites timestamps into the viewer's zone and places date markers.
#[derive(Debug, Clone)]
pub struct Normalizer {
    zone: ViewerZone,
}

impl Normalizer {
    pub fn new(zone: ViewerZone) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> ViewerZone {
        self.zone
    }

    /// Normalizes one page of items in document order.
    ///
    /// Markers already present are dropped and recomputed from the converted
    /// timestamps, so running this twice over the same page yields the same
    /// items. `prev` is the date of the entry right before the page, if the
    /// caller wants a marker at the page's leading edge; pass `None` when that
    /// boundary is handled elsewhere.
    pub fn normalize_page(&self, items: Vec<LogItem>, prev: Option<NaiveDate>) -> Vec<LogItem> {
        let mut out = Vec::with_capacity(items.len());
        let mut prev = prev;
        for item in items {
            let LogItem::Entry(mut entry) = item else {
                continue;
            };
            entry.timestamp = self.zone.convert(entry.timestamp);
            entry.time_label = time_label(&entry.timestamp);
            let date = entry.date();
            if let Some(marker) = marker_between(prev, date) {
                trace!(target = "botlog.normalize", flat = marker.flat, "inserting date marker");
                out.push(LogItem::Marker(marker));
            }
            prev = Some(date);
            out.push(LogItem::Entry(entry));
        }
        out
    }
}

/// A marker for `current` when it falls on a different calendar date than `prev`.
pub fn marker_between(prev: Option<NaiveDate>, current: NaiveDate) -> Option<DateMarker> {
    match prev {
        Some(prev) if prev != current => Some(DateMarker::for_date(current)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{at, message};

    fn utc() -> Normalizer {
        Normalizer::new(ViewerZone::Fixed(FixedOffset::east_opt(0).unwrap()))
    }

    fn markers(items: &[LogItem]) -> Vec<u32> {
        items
            .iter()
            .filter_map(|item| match item {
                LogItem::Marker(marker) => Some(marker.flat),
                LogItem::Entry(_) => None,
            })
            .collect()
    }

    #[test]
    fn same_day_entries_get_no_markers() {
        let items = vec![
            message("ann", "2021-03-01T08:00:00+00:00"),
            message("bob", "2021-03-01T12:00:00+00:00"),
            message("ann", "2021-03-01T23:59:00+00:00"),
        ];
        let out = utc().normalize_page(items, None);
        assert!(markers(&out).is_empty());
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn one_marker_per_date_boundary() {
        let items = vec![
            message("ann", "2021-03-01T23:00:00+00:00"),
            message("bob", "2021-03-02T01:00:00+00:00"),
            message("ann", "2021-03-02T02:00:00+00:00"),
            message("bob", "2021-03-04T09:00:00+00:00"),
        ];
        let out = utc().normalize_page(items, None);
        assert_eq!(markers(&out), vec![20210302, 20210304]);
        assert!(out[1].is_marker());
        assert!(out[4].is_marker());
    }

    #[test]
    fn converting_zone_moves_entries_across_midnight() {
        let tokyo = Normalizer::new(ViewerZone::Fixed(FixedOffset::east_opt(9 * 3600).unwrap()));
        let items = vec![
            message("ann", "2021-03-01T10:00:00+00:00"),
            message("bob", "2021-03-01T16:00:00+00:00"),
        ];
        let out = tokyo.normalize_page(items, None);
        assert_eq!(markers(&out), vec![20210302]);
        let bob = out[2].as_entry().expect("entry");
        assert_eq!(bob.time_label, "1:00 am");
        assert_eq!(bob.timestamp, at("2021-03-02T01:00:00+09:00"));
    }

    #[test]
    fn renormalizing_is_idempotent() {
        let items = vec![
            message("ann", "2021-03-01T23:00:00+00:00"),
            message("bob", "2021-03-02T01:00:00+00:00"),
        ];
        let normalizer = utc();
        let once = normalizer.normalize_page(items, None);
        let twice = normalizer.normalize_page(once.clone(), None);
        assert_eq!(once, twice);
    }

    #[test]
    fn parses_zone_spellings() {
        assert_eq!("local".parse(), Ok(ViewerZone::Local));
        assert_eq!(
            "UTC".parse::<ViewerZone>().map(|zone| zone.name()),
            Ok(Some("UTC".to_string()))
        );
        assert_eq!(
            "+09:00".parse(),
            Ok(ViewerZone::Fixed(FixedOffset::east_opt(9 * 3600).unwrap()))
        );
        assert_eq!(
            "-05".parse(),
            Ok(ViewerZone::Fixed(FixedOffset::west_opt(5 * 3600).unwrap()))
        );
        assert!("Mars/Olympus".parse::<ViewerZone>().is_err());
        assert!("+25:00".parse::<ViewerZone>().is_err());
        assert!("+1000000".parse::<ViewerZone>().is_err());
        assert!("+-05:00".parse::<ViewerZone>().is_err());
        assert!("+05:+3".parse::<ViewerZone>().is_err());
        assert!("+05:60".parse::<ViewerZone>().is_err());
        assert!("+".parse::<ViewerZone>().is_err());
    }

    #[test]
    fn leading_marker_uses_previous_date() {
        let prev = at("2021-02-28T22:00:00+00:00").date_naive();
        let out = utc().normalize_page(vec![message("ann", "2021-03-01T00:30:00+00:00")], Some(prev));
        assert_eq!(markers(&out), vec![20210301]);
        assert!(out[0].is_marker());
    }
}
