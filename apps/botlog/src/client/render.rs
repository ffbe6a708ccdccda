//! Turns view-model items into terminal lines.
//!
//! Every visible item is exactly one row, matching [`FixedHeights::rows`], so a
//! scroll offset is also the number of visible items above the viewport.
//!
//! [`FixedHeights::rows`]: crate::viewer::FixedHeights::rows

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::model::{DateMarker, EntryKind, LogEntry, LogItem};

const NICK_WIDTH: usize = 14;

/// Lines for rows `offset..offset + rows` of the visible list.
pub fn visible_lines(items: &[LogItem], offset: u32, rows: u16) -> Vec<Line<'static>> {
    items
        .iter()
        .filter(|item| !is_hidden(item))
        .skip(offset as usize)
        .take(rows as usize)
        .map(item_line)
        .collect()
}

fn is_hidden(item: &LogItem) -> bool {
    item.as_entry().is_some_and(|entry| entry.filtered)
}

pub fn item_line(item: &LogItem) -> Line<'static> {
    match item {
        LogItem::Entry(entry) => entry_line(entry),
        LogItem::Marker(marker) => marker_line(marker),
    }
}

fn marker_line(marker: &DateMarker) -> Line<'static> {
    Line::from(Span::styled(
        format!("── {} ──", marker.label),
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    ))
    .centered()
}

fn entry_line(entry: &LogEntry) -> Line<'static> {
    let base = if entry.highlighted {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };
    let mut spans = vec![Span::styled(
        format!("{} ", entry.time_label),
        base.fg(Color::DarkGray),
    )];

    match &entry.kind {
        EntryKind::Message | EntryKind::Notice => {
            let nick = if entry.actor_hidden {
                String::new()
            } else {
                entry.nick.clone()
            };
            spans.push(Span::styled(
                format!("{nick:>NICK_WIDTH$} │ "),
                base.fg(nick_color(&entry.nick)).add_modifier(Modifier::BOLD),
            ));
            spans.extend(body_spans(entry, base));
        }
        EntryKind::Action => {
            spans.push(Span::styled(
                format!("{:>NICK_WIDTH$} │ ", "*"),
                base.fg(Color::DarkGray),
            ));
            spans.push(Span::styled(
                format!("{} ", entry.nick),
                base.fg(nick_color(&entry.nick)).add_modifier(Modifier::ITALIC),
            ));
            spans.extend(body_spans(entry, base.add_modifier(Modifier::ITALIC)));
        }
        _ => {
            let dim = base.fg(Color::DarkGray);
            spans.push(Span::styled(format!("{:>NICK_WIDTH$} │ ", "--"), dim));
            spans.push(Span::styled(status_text(entry), dim));
        }
    }

    if !entry.image_links.is_empty() {
        spans.push(Span::styled(
            format!(" [{} image{}]", entry.image_links.len(), if entry.image_links.len() == 1 { "" } else { "s" }),
            base.fg(Color::Cyan),
        ));
    }
    Line::from(spans)
}

/// Splits the body so search matches are emphasized.
fn body_spans(entry: &LogEntry, base: Style) -> Vec<Span<'static>> {
    let body = entry.body.as_str();
    let emphasis = base.fg(Color::Black).bg(Color::Yellow);
    let mut spans = Vec::new();
    let mut cursor = 0;
    for range in &entry.matches {
        let (Some(before), Some(hit)) = (body.get(cursor..range.start), body.get(range.clone())) else {
            continue;
        };
        if !before.is_empty() {
            spans.push(Span::styled(before.to_string(), base));
        }
        spans.push(Span::styled(hit.to_string(), emphasis));
        cursor = range.end;
    }
    if let Some(rest) = body.get(cursor..) {
        if !rest.is_empty() {
            spans.push(Span::styled(rest.to_string(), base));
        }
    }
    spans
}

fn status_text(entry: &LogEntry) -> String {
    let verb = match &entry.kind {
        EntryKind::Join => "joined",
        EntryKind::Part => "left",
        EntryKind::Quit => "quit",
        EntryKind::Nick => "is now known as",
        EntryKind::Topic => "changed the topic to",
        EntryKind::Away => "is away",
        EntryKind::Shutdown => "shut down",
        _ => "",
    };
    [entry.nick.as_str(), verb, entry.body.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One plain-text line per item, for non-interactive output.
pub fn plain_line(item: &LogItem) -> String {
    match item {
        LogItem::Marker(marker) => format!("-- {} --", marker.label),
        LogItem::Entry(entry) => match &entry.kind {
            EntryKind::Message | EntryKind::Notice => {
                format!("{} <{}> {}", entry.time_label, entry.nick, entry.body)
            }
            EntryKind::Action => format!("{} * {} {}", entry.time_label, entry.nick, entry.body),
            _ => format!("{} -- {}", entry.time_label, status_text(entry)),
        },
    }
}

fn nick_color(nick: &str) -> Color {
    const PALETTE: [Color; 6] = [
        Color::Green,
        Color::Blue,
        Color::Magenta,
        Color::Cyan,
        Color::LightRed,
        Color::LightGreen,
    ];
    let hash = nick
        .bytes()
        .fold(0usize, |acc, byte| acc.wrapping_mul(31).wrapping_add(byte as usize));
    PALETTE[hash % PALETTE.len()]
}
