//! Interactive log browser.
//!
//! One task owns the runtime, the timeline and the terminal; it waits on
//! keyboard input, runtime progress and the viewer's date signals, and redraws
//! after each wake.

use std::io;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind};
use ratatui::layout::{Constraint, Direction as Axis, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;
use signal_bus::Bus;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use super::render::visible_lines;
use super::{spawn_input, TerminalGuard};
use crate::model::{flat_date, header_label, Direction};
use crate::runtime::{ViewerCommand, ViewerRuntime};
use crate::timeline::{JumpTarget, Timeline};
use crate::viewer::{ViewerSignal, AT_BOTTOM_TOPIC, DATE_CHANGE_TOPIC};

const TIMELINE_WIDTH: u16 = 22;
const MOUSE_STEP: i64 = 3;

/// How the browser was left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewExit {
    Quit,
    /// Open another page of the same log.
    Navigate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineRow {
    Year { year: u32, expanded: bool },
    Link(usize),
    OlderYears,
}

/// Rows of the timeline panel, newest year first.
pub fn timeline_rows(timeline: &Timeline) -> Vec<TimelineRow> {
    let mut rows = Vec::new();
    for group in timeline.groups().iter().rev().filter(|group| group.visible) {
        rows.push(TimelineRow::Year {
            year: group.year,
            expanded: group.expanded,
        });
        if group.expanded {
            rows.extend(group.link_range().rev().map(TimelineRow::Link));
        }
    }
    if timeline.has_hidden_years() {
        rows.push(TimelineRow::OlderYears);
    }
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Log,
    Timeline,
}

enum Wake {
    Input(Option<Event>),
    Runtime,
    Signal(ViewerSignal),
}

pub struct ViewApp {
    runtime: ViewerRuntime,
    timeline: Timeline,
    title: String,
    date_header: Option<String>,
    panel_open: bool,
    focus: Focus,
    cursor: usize,
    status: Option<String>,
    rows: u16,
}

impl ViewApp {
    pub fn new(runtime: ViewerRuntime, timeline: Timeline, title: impl Into<String>) -> Self {
        let panel_open = !timeline.links().is_empty();
        Self {
            runtime,
            timeline,
            title: title.into(),
            date_header: None,
            panel_open,
            focus: Focus::Log,
            cursor: 0,
            status: None,
            rows: 0,
        }
    }

    pub async fn run(mut self, guard: &mut TerminalGuard, highlight: Option<String>) -> io::Result<ViewExit> {
        let mut input = spawn_input();
        let mut dates = self.runtime.bus().subscribe(DATE_CHANGE_TOPIC);
        let mut bottom = self.runtime.bus().subscribe(AT_BOTTOM_TOPIC);

        let size = guard.terminal().size()?;
        self.rows = log_rows(size.height);
        self.runtime.command(ViewerCommand::Resize(u32::from(self.rows)));
        self.runtime.start();
        if let Some(id) = highlight {
            self.runtime.command(ViewerCommand::Highlight(id));
        }

        loop {
            guard.terminal().draw(|frame| self.draw(frame))?;
            let wake = next_wake(&mut input, &mut self.runtime, &mut dates, &mut bottom).await;
            match wake {
                Wake::Input(None) => return Ok(ViewExit::Quit),
                Wake::Input(Some(event)) => {
                    if let Some(exit) = self.on_event(event) {
                        return Ok(exit);
                    }
                }
                Wake::Runtime => {}
                Wake::Signal(signal) => self.on_signal(signal),
            }
        }
    }

    fn on_signal(&mut self, signal: ViewerSignal) {
        match signal {
            ViewerSignal::DateChanged(date) => {
                self.date_header = Some(header_label(date));
                let at_bottom = self.runtime.viewer().is_at_bottom();
                self.timeline.on_date_changed(flat_date(date), at_bottom);
            }
            ViewerSignal::AtBottom => {
                self.timeline.on_at_bottom();
            }
            _ => {}
        }
    }

    fn on_event(&mut self, event: Event) -> Option<ViewExit> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.on_key(key),
            Event::Mouse(mouse) => {
                match mouse.kind {
                    MouseEventKind::ScrollUp => self.runtime.command(ViewerCommand::ScrollBy(-MOUSE_STEP)),
                    MouseEventKind::ScrollDown => self.runtime.command(ViewerCommand::ScrollBy(MOUSE_STEP)),
                    _ => {}
                }
                None
            }
            Event::Resize(_, height) => {
                self.rows = log_rows(height);
                self.runtime.command(ViewerCommand::Resize(u32::from(self.rows)));
                None
            }
            _ => None,
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Option<ViewExit> {
        if key.code == KeyCode::Char('q')
            || key.code == KeyCode::Esc
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
        {
            return Some(ViewExit::Quit);
        }
        match key.code {
            KeyCode::Char('t') => {
                self.panel_open = !self.panel_open;
                if !self.panel_open {
                    self.focus = Focus::Log;
                }
                return None;
            }
            KeyCode::Tab if self.panel_open => {
                self.focus = match self.focus {
                    Focus::Log => Focus::Timeline,
                    Focus::Timeline => Focus::Log,
                };
                return None;
            }
            KeyCode::Char('f') => {
                self.runtime.command(ViewerCommand::ToggleFilter);
                self.status = Some(if self.runtime.viewer().only_chat() {
                    "hiding joins, parts and quits".into()
                } else {
                    "showing every line".into()
                });
                return None;
            }
            _ => {}
        }
        match self.focus {
            Focus::Log => {
                self.on_log_key(key.code);
                None
            }
            Focus::Timeline => self.on_timeline_key(key.code),
        }
    }

    fn on_log_key(&mut self, code: KeyCode) {
        let page = i64::from(self.rows.saturating_sub(1).max(1));
        let command = match code {
            KeyCode::Up | KeyCode::Char('k') => ViewerCommand::ScrollBy(-1),
            KeyCode::Down | KeyCode::Char('j') => ViewerCommand::ScrollBy(1),
            KeyCode::PageUp => ViewerCommand::ScrollBy(-page),
            KeyCode::PageDown | KeyCode::Char(' ') => ViewerCommand::ScrollBy(page),
            KeyCode::Home | KeyCode::Char('g') => ViewerCommand::ScrollTo(0),
            KeyCode::End | KeyCode::Char('G') => ViewerCommand::ScrollTo(u32::MAX),
            _ => return,
        };
        self.status = None;
        self.runtime.command(command);
    }

    fn on_timeline_key(&mut self, code: KeyCode) -> Option<ViewExit> {
        let rows = timeline_rows(&self.timeline);
        match code {
            KeyCode::Up | KeyCode::Char('k') => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                self.cursor = (self.cursor + 1).min(rows.len().saturating_sub(1));
            }
            KeyCode::Enter => match rows.get(self.cursor).copied() {
                Some(TimelineRow::Year { year, .. }) => self.timeline.toggle_group(year),
                Some(TimelineRow::OlderYears) => self.timeline.show_all_years(),
                Some(TimelineRow::Link(idx)) => return self.jump(idx),
                None => {}
            },
            _ => {}
        }
        None
    }

    fn jump(&mut self, idx: usize) -> Option<ViewExit> {
        let viewer = self.runtime.viewer();
        match self.timeline.jump_target(idx, |flat| viewer.marker_offset(flat))? {
            JumpTarget::Loaded(offset) => {
                debug!(target = "botlog.view", offset, "jumping to loaded date");
                self.focus = Focus::Log;
                self.runtime.command(ViewerCommand::ScrollTo(offset));
                None
            }
            JumpTarget::Navigate(href) => {
                info!(target = "botlog.view", %href, "opening another page");
                Some(ViewExit::Navigate(href))
            }
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        let [header, body, footer] = Layout::default()
            .direction(Axis::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(1), Constraint::Length(1)])
            .areas(frame.area());

        frame.render_widget(Paragraph::new(self.header_line()), header);

        let (log_area, panel_area) = if self.panel_open {
            let [log, panel] = Layout::default()
                .direction(Axis::Horizontal)
                .constraints([Constraint::Min(10), Constraint::Length(TIMELINE_WIDTH)])
                .areas(body);
            (log, Some(panel))
        } else {
            (body, None)
        };

        let viewer = self.runtime.viewer();
        let lines = visible_lines(viewer.items(), viewer.scroll().offset, log_area.height);
        frame.render_widget(Paragraph::new(lines), log_area);

        if let Some(area) = panel_area {
            self.draw_timeline(frame, area);
        }

        let hint = self.status.clone().unwrap_or_else(|| {
            "q quit  ↑↓/PgUp/PgDn scroll  End live  f filter  t timeline  Tab focus".to_string()
        });
        frame.render_widget(
            Paragraph::new(Span::styled(hint, Style::default().fg(Color::DarkGray))),
            footer,
        );
    }

    fn header_line(&self) -> Line<'static> {
        let viewer = self.runtime.viewer();
        let mut spans = vec![Span::styled(
            self.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )];
        if let Some(date) = &self.date_header {
            spans.push(Span::raw(format!("  {date}")));
        }
        if viewer.is_loading(Direction::Older) {
            spans.push(Span::styled("  ↑ loading", Style::default().fg(Color::Yellow)));
        }
        if viewer.is_loading(Direction::Newer) {
            spans.push(Span::styled("  ↓ loading", Style::default().fg(Color::Yellow)));
        }
        if self.runtime.streaming() {
            spans.push(Span::styled("  ● live", Style::default().fg(Color::Green)));
        }
        if viewer.only_chat() {
            spans.push(Span::styled("  [chat only]", Style::default().fg(Color::Cyan)));
        }
        if let Some(term) = viewer.search_term() {
            spans.push(Span::styled(
                format!("  search: {term}"),
                Style::default().fg(Color::Black).bg(Color::Yellow),
            ));
        }
        Line::from(spans)
    }

    fn draw_timeline(&mut self, frame: &mut Frame, area: Rect) {
        let rows = timeline_rows(&self.timeline);
        self.cursor = self.cursor.min(rows.len().saturating_sub(1));
        let active = self.timeline.active_index();
        let links = self.timeline.links();
        let items: Vec<ListItem> = rows
            .iter()
            .map(|row| match row {
                TimelineRow::Year { year, expanded } => ListItem::new(format!(
                    "{} {year}",
                    if *expanded { "▾" } else { "▸" }
                ))
                .style(Style::default().add_modifier(Modifier::BOLD)),
                TimelineRow::Link(idx) => {
                    let style = if Some(*idx) == active {
                        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
                    } else {
                        Style::default()
                    };
                    ListItem::new(format!("  {}", links[*idx].label)).style(style)
                }
                TimelineRow::OlderYears => {
                    ListItem::new("  older…").style(Style::default().fg(Color::DarkGray))
                }
            })
            .collect();

        let border = if self.focus == Focus::Timeline {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let list = List::new(items)
            .block(Block::default().borders(Borders::LEFT).border_style(border))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        let mut state = ListState::default();
        if self.focus == Focus::Timeline {
            state.select(Some(self.cursor));
        }
        frame.render_stateful_widget(list, area, &mut state);
    }
}

fn log_rows(height: u16) -> u16 {
    height.saturating_sub(2).max(1)
}

async fn next_wake(
    input: &mut mpsc::UnboundedReceiver<Event>,
    runtime: &mut ViewerRuntime,
    dates: &mut broadcast::Receiver<ViewerSignal>,
    bottom: &mut broadcast::Receiver<ViewerSignal>,
) -> Wake {
    tokio::select! {
        event = input.recv() => Wake::Input(event),
        _ = runtime.step() => Wake::Runtime,
        Ok(signal) = dates.recv() => Wake::Signal(signal),
        Ok(signal) = bottom.recv() => Wake::Signal(signal),
    }
}
