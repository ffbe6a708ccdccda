//! Pulses for the location feed.
//!
//! Each `loc` event becomes a pulse that grows, holds, then fades out and is
//! pruned. The renderer projects `(lat, lon)` onto its map.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const GROW: Duration = Duration::from_millis(100);
pub const HOLD: Duration = Duration::from_millis(100);
pub const FADE: Duration = Duration::from_millis(500);
pub const PEAK_RADIUS: f64 = 4.0;
pub const FINAL_RADIUS: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pulse {
    pub lat: f64,
    pub lon: f64,
    born: Instant,
}

/// Radius and opacity of a pulse at some instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseFrame {
    pub radius: f64,
    pub opacity: f64,
}

impl Pulse {
    pub fn lifetime() -> Duration {
        GROW + HOLD + FADE
    }

    pub fn frame(&self, now: Instant) -> Option<PulseFrame> {
        let age = now.saturating_duration_since(self.born);
        if age < GROW {
            let t = age.as_secs_f64() / GROW.as_secs_f64();
            Some(PulseFrame {
                radius: PEAK_RADIUS * t,
                opacity: 1.0,
            })
        } else if age < GROW + HOLD {
            Some(PulseFrame {
                radius: PEAK_RADIUS,
                opacity: 1.0,
            })
        } else if age < Self::lifetime() {
            let t = (age - GROW - HOLD).as_secs_f64() / FADE.as_secs_f64();
            Some(PulseFrame {
                radius: PEAK_RADIUS + (FINAL_RADIUS - PEAK_RADIUS) * t,
                opacity: 1.0 - t,
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct Globe {
    pulses: VecDeque<Pulse>,
    seen: u64,
}

impl Globe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, lat: f64, lon: f64, now: Instant) {
        self.seen += 1;
        self.pulses.push_back(Pulse { lat, lon, born: now });
    }

    /// Drops pulses that finished fading.
    pub fn prune(&mut self, now: Instant) {
        while self
            .pulses
            .front()
            .is_some_and(|pulse| pulse.frame(now).is_none())
        {
            self.pulses.pop_front();
        }
    }

    pub fn pulses(&self) -> impl Iterator<Item = &Pulse> {
        self.pulses.iter()
    }

    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }

    /// Locations received since start.
    pub fn seen(&self) -> u64 {
        self.seen
    }
}
