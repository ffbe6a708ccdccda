//! World map of the location feed.

use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{Event, KeyCode, KeyEventKind};
use history_sdk::PushEvent;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Style};
use ratatui::text::Span;
use ratatui::widgets::canvas::{Canvas, Circle, Map, MapResolution};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use tokio::sync::mpsc;
use tracing::warn;

use super::{spawn_input, TerminalGuard};
use crate::globe::{Globe, PulseFrame};

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

enum Wake {
    Input(Option<Event>),
    Push(Option<PushEvent>),
    Tick,
}

pub async fn run(guard: &mut TerminalGuard, mut feed: mpsc::Receiver<PushEvent>) -> io::Result<()> {
    let mut input = spawn_input();
    let mut globe = Globe::new();
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    let mut feed_open = true;

    loop {
        let now = Instant::now();
        globe.prune(now);
        guard.terminal().draw(|frame| draw(frame, &globe, now, feed_open))?;

        let wake = tokio::select! {
            event = input.recv() => Wake::Input(event),
            event = feed.recv(), if feed_open => Wake::Push(event),
            _ = ticker.tick() => Wake::Tick,
        };
        match wake {
            Wake::Input(None) => return Ok(()),
            Wake::Input(Some(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    return Ok(());
                }
            }
            Wake::Input(Some(_)) | Wake::Tick => {}
            Wake::Push(Some(PushEvent::Location { lat, lon })) => globe.add(lat, lon, Instant::now()),
            Wake::Push(Some(_)) => {}
            Wake::Push(None) => {
                warn!(target = "botlog.globe", "location feed closed");
                feed_open = false;
            }
        }
    }
}

fn draw(frame: &mut Frame, globe: &Globe, now: Instant, feed_open: bool) {
    let [map_area, footer] = Layout::default()
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .areas(frame.area());

    let canvas = Canvas::default()
        .block(Block::default().borders(Borders::ALL).title("botlog globe"))
        .x_bounds([-180.0, 180.0])
        .y_bounds([-90.0, 90.0])
        .paint(|ctx| {
            ctx.draw(&Map {
                resolution: MapResolution::High,
                color: Color::DarkGray,
            });
            ctx.layer();
            for pulse in globe.pulses() {
                let Some(pulse_frame) = pulse.frame(now) else {
                    continue;
                };
                ctx.draw(&Circle {
                    x: pulse.lon,
                    y: pulse.lat,
                    radius: pulse_frame.radius,
                    color: pulse_color(pulse_frame),
                });
            }
        });
    frame.render_widget(canvas, map_area);

    let state = if feed_open { "live" } else { "feed closed" };
    frame.render_widget(
        Paragraph::new(Span::styled(
            format!("{} pings  {} on screen  {state}  q quit", globe.seen(), globe.len()),
            Style::default().fg(Color::DarkGray),
        )),
        footer,
    );
}

/// Terminal cells have no alpha; opacity picks a progressively dimmer color.
fn pulse_color(frame: PulseFrame) -> Color {
    if frame.opacity > 0.66 {
        Color::LightRed
    } else if frame.opacity > 0.33 {
        Color::Red
    } else {
        Color::DarkGray
    }
}
