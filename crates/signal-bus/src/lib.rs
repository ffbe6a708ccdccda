//! Typed publish/subscribe bus used for cross-component notifications.
//!
//! Each message names its own topic, so subscribers only see the signals they
//! asked for and the payload type is fixed per bus.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus channel closed")]
    Closed,
}

pub type BusResult<T> = Result<T, BusError>;

/// A message that can travel on a [`Bus`].
pub trait Signal: Clone + Send + 'static {
    fn topic(&self) -> &'static str;
}

pub trait Bus<M: Signal>: Send + Sync {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<M>;
    fn publish(&self, message: M) -> BusResult<()>;
}

/// In-memory bus with one broadcast channel per topic.
#[derive(Debug)]
pub struct LocalBus<M: Signal> {
    topics: parking_lot::RwLock<HashMap<String, broadcast::Sender<M>>>,
    capacity: usize,
}

impl<M: Signal> Default for LocalBus<M> {
    fn default() -> Self {
        Self::with_capacity(64)
    }
}

impl<M: Signal> LocalBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: parking_lot::RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<M> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        let mut guard = self.topics.write();
        guard
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl<M: Signal> Bus<M> for LocalBus<M> {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<M> {
        self.sender_for(topic).subscribe()
    }

    fn publish(&self, message: M) -> BusResult<()> {
        let sender = self.sender_for(message.topic());
        if sender.receiver_count() == 0 {
            // nobody listening; the signal is simply dropped
            return Ok(());
        }
        sender.send(message).map(|_| ()).map_err(|_| BusError::Closed)
    }
}
