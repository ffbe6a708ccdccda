use crate::model::LogItem;
use crate::prefs::Preferences;

pub const ONLY_CHAT_PREF: &str = "only_chat";

/// Hides join/part/quit lines when "only chat" is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFilter {
    only_chat: bool,
}

impl Default for StatusFilter {
    fn default() -> Self {
        Self { only_chat: true }
    }
}

impl StatusFilter {
    pub fn new(only_chat: bool) -> Self {
        Self { only_chat }
    }

    pub fn load(prefs: &Preferences, page: &str) -> Self {
        Self::new(prefs.get_bool(page, ONLY_CHAT_PREF, true))
    }

    pub fn only_chat(&self) -> bool {
        self.only_chat
    }

    /// Flips the preference and persists it for `page`.
    pub fn toggle(&mut self, prefs: &mut Preferences, page: &str) -> bool {
        self.only_chat = !self.only_chat;
        prefs.set_bool(page, ONLY_CHAT_PREF, self.only_chat);
        self.only_chat
    }

    pub fn apply(&self, items: &mut [LogItem]) {
        for entry in items.iter_mut().filter_map(LogItem::as_entry_mut) {
            entry.filtered = self.only_chat && entry.kind.is_status();
        }
    }
}
