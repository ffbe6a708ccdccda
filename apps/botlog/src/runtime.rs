//! Drives a [`LogViewer`] against real page and push sources.
//!
//! The viewer is only touched from the task that calls [`ViewerRuntime::step`]
//! and [`ViewerRuntime::command`]; requests and timers run as spawned tasks and
//! report back over channels.

use std::future;
use std::sync::Arc;

use history_sdk::{PageSource, PushEvent, PushSource};
use signal_bus::{Bus, LocalBus};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::cache::PageEvent;
use crate::model::Direction;
use crate::viewer::{Effect, FixedHeights, LogViewer, Measure, ViewerSignal};

/// Input from whatever front end owns the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerCommand {
    ScrollTo(u32),
    ScrollBy(i64),
    Resize(u32),
    Highlight(String),
    ToggleFilter,
    /// Subscribe to the push stream without loading history.
    FollowLive,
}

enum Wake {
    Page(PageEvent),
    Retry(Direction, u64),
    Push(Option<PushEvent>),
}

pub struct ViewerRuntime<M = FixedHeights> {
    viewer: LogViewer<M>,
    pages: Arc<dyn PageSource>,
    push: Arc<dyn PushSource>,
    bus: Arc<LocalBus<ViewerSignal>>,
    page_tx: mpsc::UnboundedSender<PageEvent>,
    page_rx: mpsc::UnboundedReceiver<PageEvent>,
    retry_tx: mpsc::UnboundedSender<(Direction, u64)>,
    retry_rx: mpsc::UnboundedReceiver<(Direction, u64)>,
    stream: Option<mpsc::Receiver<PushEvent>>,
    in_flight: usize,
}

impl<M: Measure> ViewerRuntime<M> {
    pub fn new(
        viewer: LogViewer<M>,
        pages: Arc<dyn PageSource>,
        push: Arc<dyn PushSource>,
        bus: Arc<LocalBus<ViewerSignal>>,
    ) -> Self {
        let (page_tx, page_rx) = mpsc::unbounded_channel();
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        Self {
            viewer,
            pages,
            push,
            bus,
            page_tx,
            page_rx,
            retry_tx,
            retry_rx,
            stream: None,
            in_flight: 0,
        }
    }

    pub fn viewer(&self) -> &LogViewer<M> {
        &self.viewer
    }

    pub fn bus(&self) -> &Arc<LocalBus<ViewerSignal>> {
        &self.bus
    }

    /// Requests or retry timers still outstanding.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn start(&mut self) {
        let effects = self.viewer.start();
        self.execute(effects);
    }

    pub fn command(&mut self, command: ViewerCommand) {
        let effects = match command {
            ViewerCommand::ScrollTo(offset) => self.viewer.on_scroll(offset),
            ViewerCommand::ScrollBy(delta) => self.viewer.scroll_by(delta),
            ViewerCommand::Resize(viewport) => self.viewer.set_viewport(viewport),
            ViewerCommand::Highlight(id) => self.viewer.highlight(&id),
            ViewerCommand::ToggleFilter => {
                let only_chat = self.viewer.toggle_filter();
                debug!(target = "botlog.runtime", only_chat, "filter toggled");
                Vec::new()
            }
            ViewerCommand::FollowLive => self.viewer.follow_live(),
        };
        self.execute(effects);
    }

    /// Waits for the next page, retry timer or pushed event and applies it.
    /// Cancel safe.
    pub async fn step(&mut self) {
        let wake = tokio::select! {
            Some(event) = self.page_rx.recv() => Wake::Page(event),
            Some((direction, generation)) = self.retry_rx.recv() => Wake::Retry(direction, generation),
            event = next_push(&mut self.stream) => Wake::Push(event),
        };

        let effects = match wake {
            Wake::Page(event) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.viewer.on_page(event)
            }
            Wake::Retry(direction, generation) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.viewer.on_retry(direction, generation)
            }
            Wake::Push(Some(PushEvent::Log { html, .. })) => self.viewer.on_stream_log(&html),
            Wake::Push(Some(other)) => {
                trace!(target = "botlog.runtime", event = ?other, "ignoring push event");
                Vec::new()
            }
            Wake::Push(None) => {
                warn!(target = "botlog.runtime", "push stream ended");
                self.stream = None;
                Vec::new()
            }
        };
        self.execute(effects);
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Fetch(request) => {
                    self.in_flight += 1;
                    let pages = Arc::clone(&self.pages);
                    let tx = self.page_tx.clone();
                    tokio::spawn(async move {
                        let result = pages.fetch_page(&request.url).await;
                        let _ = tx.send(PageEvent {
                            direction: request.direction,
                            generation: request.generation,
                            result,
                        });
                    });
                }
                Effect::Retry {
                    direction,
                    generation,
                    after,
                } => {
                    self.in_flight += 1;
                    let tx = self.retry_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send((direction, generation));
                    });
                }
                Effect::OpenStream { url } => match self.push.open(&url) {
                    Ok(rx) => self.stream = Some(rx),
                    Err(err) => {
                        warn!(target = "botlog.runtime", %url, error = %err, "failed to open push stream");
                    }
                },
                Effect::ScrollTo { offset, transition } => {
                    trace!(target = "botlog.runtime", offset, transition_ms = transition.as_millis() as u64, "scroll");
                }
            }
        }
        self.publish_signals();
    }

    fn publish_signals(&mut self) {
        for signal in self.viewer.drain_signals() {
            if let Err(err) = self.bus.publish(signal) {
                warn!(target = "botlog.runtime", error = %err, "dropping viewer signal");
            }
        }
    }
}

async fn next_push(stream: &mut Option<mpsc::Receiver<PushEvent>>) -> Option<PushEvent> {
    match stream {
        Some(rx) => rx.recv().await,
        None => future::pending().await,
    }
}
