use crate::model::{Direction, LogItem};

/// Height of a rendered item in the viewer's units (pixels, rows).
pub trait Measure {
    fn height(&self, item: &LogItem) -> u32;
}

/// Every entry and every marker has a constant height; filtered entries take none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeights {
    pub entry: u32,
    pub marker: u32,
}

impl Default for FixedHeights {
    fn default() -> Self {
        Self { entry: 20, marker: 40 }
    }
}

impl FixedHeights {
    /// One row per line, markers included.
    pub fn rows() -> Self {
        Self { entry: 1, marker: 1 }
    }
}

impl Measure for FixedHeights {
    fn height(&self, item: &LogItem) -> u32 {
        match item {
            LogItem::Entry(entry) if entry.filtered => 0,
            LogItem::Entry(_) => self.entry,
            LogItem::Marker(_) => self.marker,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollState {
    pub offset: u32,
    pub viewport: u32,
    pub content: u32,
}

impl ScrollState {
    pub fn max_offset(&self) -> u32 {
        self.content.saturating_sub(self.viewport)
    }

    pub fn at_bottom(&self, edge: u32) -> bool {
        self.offset.saturating_add(edge) > self.max_offset()
    }

    pub fn clamp(&mut self) {
        self.offset = self.offset.min(self.max_offset());
    }
}

/// Edge distance that triggers a load and the band in which nothing does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollPolicy {
    pub edge: u32,
    pub band: u32,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self { edge: 50, band: 350 }
    }
}

impl ScrollPolicy {
    /// Same thresholds scaled to terminal rows.
    pub fn rows() -> Self {
        Self { edge: 2, band: 12 }
    }

    pub fn in_band(&self, state: &ScrollState) -> bool {
        state.offset > self.band && state.offset.saturating_add(self.band) < state.max_offset()
    }

    pub fn near(&self, state: &ScrollState, direction: Direction) -> bool {
        match direction {
            Direction::Older => state.offset < self.edge,
            Direction::Newer => state.at_bottom(self.edge),
        }
    }

    /// Which edge, if any, the offset is close enough to for a load. The top wins
    /// when both are.
    pub fn classify(&self, state: &ScrollState) -> Option<Direction> {
        if self.in_band(state) {
            return None;
        }
        [Direction::Older, Direction::Newer]
            .into_iter()
            .find(|direction| self.near(state, *direction))
    }
}
