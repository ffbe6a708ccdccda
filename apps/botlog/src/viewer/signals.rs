use chrono::NaiveDate;
use signal_bus::Signal;

use crate::model::{Direction, LogItem};

pub const DATE_CHANGE_TOPIC: &str = "date:change";
pub const AT_BOTTOM_TOPIC: &str = "at-bottom";
pub const PAGE_LOADED_TOPIC: &str = "page:loaded";
pub const APPENDED_TOPIC: &str = "log:appended";

/// Notifications the viewer emits for other views.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerSignal {
    /// The topmost visible entry moved to another calendar date.
    DateChanged(NaiveDate),
    /// The viewer reached the live edge.
    AtBottom,
    PageLoaded { direction: Direction, count: usize },
    /// Entries that arrived over the push stream.
    Appended(Vec<LogItem>),
}

impl Signal for ViewerSignal {
    fn topic(&self) -> &'static str {
        match self {
            ViewerSignal::DateChanged(_) => DATE_CHANGE_TOPIC,
            ViewerSignal::AtBottom => AT_BOTTOM_TOPIC,
            ViewerSignal::PageLoaded { .. } => PAGE_LOADED_TOPIC,
            ViewerSignal::Appended(_) => APPENDED_TOPIC,
        }
    }
}
