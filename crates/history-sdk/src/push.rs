use futures::StreamExt;
use reqwest::StatusCode;
use reqwest_eventsource::{Error as SourceError, Event, EventSource};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{HistoryClient, HistoryError};

const PUSH_BUFFER: usize = 128;

/// A decoded server-push event.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// One or more rendered log lines.
    Log { id: Option<String>, html: String },
    /// A geolocated ping for the map feed.
    Location { lat: f64, lon: f64 },
    Other { event: String, data: String },
}

impl PushEvent {
    pub fn from_parts(event: &str, id: &str, data: String) -> Option<Self> {
        match event {
            "log" => Some(PushEvent::Log {
                id: (!id.is_empty()).then(|| id.to_string()),
                html: data,
            }),
            "loc" => match parse_location(&data) {
                Some((lat, lon)) => Some(PushEvent::Location { lat, lon }),
                None => {
                    warn!(target = "history.push", data = %data, "dropping malformed location event");
                    None
                }
            },
            other => Some(PushEvent::Other {
                event: other.to_string(),
                data,
            }),
        }
    }
}

/// Parses a `[lat, lon]` JSON pair.
pub fn parse_location(data: &str) -> Option<(f64, f64)> {
    let pair: Vec<f64> = serde_json::from_str(data).ok()?;
    match pair.as_slice() {
        [lat, lon] => Some((*lat, *lon)),
        _ => None,
    }
}

/// Opens push streams. The returned receiver closes when the stream is gone for good.
pub trait PushSource: Send + Sync {
    fn open(&self, url: &str) -> Result<mpsc::Receiver<PushEvent>, HistoryError>;
}

impl PushSource for HistoryClient {
    fn open(&self, url: &str) -> Result<mpsc::Receiver<PushEvent>, HistoryError> {
        let url = self.resolve(url)?;
        let mut source = EventSource::new(self.http.get(url.clone()))
            .map_err(|err| HistoryError::Stream(err.to_string()))?;
        let (tx, rx) = mpsc::channel(PUSH_BUFFER);
        tokio::spawn(async move {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {
                        debug!(target = "history.push", %url, "push stream open");
                    }
                    Ok(Event::Message(message)) => {
                        let Some(event) =
                            PushEvent::from_parts(&message.event, &message.id, message.data)
                        else {
                            continue;
                        };
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(SourceError::InvalidStatusCode(status, _))
                        if status == StatusCode::NOT_FOUND =>
                    {
                        warn!(target = "history.push", %url, "push stream not found");
                        break;
                    }
                    Err(err) => {
                        // the event source reconnects on its own
                        warn!(target = "history.push", %url, error = %err, "push stream error");
                    }
                }
            }
            source.close();
            debug!(target = "history.push", %url, "push stream closed");
        });
        Ok(rx)
    }
}
