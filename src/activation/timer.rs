//! Frame-driven countdowns
//!
//! A [`TimedActivation`] counts down by the delta passed to `tick` and never
//! looks at a wall clock. Cancellation goes through a
//! [`CancellationToken`]; once the token is cancelled the timer never fires,
//! even if the same tick would have expired it.

use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    Pending,
    /// Expired during this tick
    Fired,
    /// Expired on an earlier tick
    Finished,
    Cancelled,
}

#[derive(Debug)]
pub struct TimedActivation {
    duration: f32,
    remaining: f32,
    fired: bool,
    token: CancellationToken,
}

impl TimedActivation {
    pub fn new(duration: f32) -> Self {
        let duration = duration.max(0.0);
        Self {
            duration,
            remaining: duration,
            fired: false,
            token: CancellationToken::new(),
        }
    }

    /// Token that cancels this timer when triggered from anywhere
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    pub fn elapsed(&self) -> f32 {
        self.duration - self.remaining
    }

    /// Restarts from the full duration
    pub fn reset(&mut self) {
        self.remaining = self.duration;
        self.fired = false;
    }

    pub fn tick(&mut self, dt: f32) -> TimerStatus {
        if self.token.is_cancelled() {
            return TimerStatus::Cancelled;
        }
        if self.fired {
            return TimerStatus::Finished;
        }
        self.remaining -= dt.max(0.0);
        if self.remaining <= 0.0 {
            self.remaining = 0.0;
            self.fired = true;
            TimerStatus::Fired
        } else {
            TimerStatus::Pending
        }
    }
}

/// At most one running timer per key
#[derive(Debug)]
pub struct TimerSet<K> {
    timers: BTreeMap<K, TimedActivation>,
}

impl<K> Default for TimerSet<K> {
    fn default() -> Self {
        Self {
            timers: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy + std::fmt::Debug> TimerSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a timer for `key`, cancelling the one already running
    pub fn start(&mut self, key: K, duration: f32) -> CancellationToken {
        let timer = TimedActivation::new(duration);
        let token = timer.token();
        if let Some(previous) = self.timers.insert(key, timer) {
            debug!("Replacing timer for {:?}", key);
            previous.cancel();
        }
        token
    }

    pub fn cancel(&mut self, key: K) -> bool {
        match self.timers.remove(&key) {
            Some(timer) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, key: K) -> bool {
        self.timers
            .get(&key)
            .map(|timer| !timer.is_cancelled())
            .unwrap_or(false)
    }

    pub fn get(&self, key: K) -> Option<&TimedActivation> {
        self.timers.get(&key)
    }

    /// Advances every timer; returns the keys that fired, in key order
    ///
    /// Fired and cancelled timers are removed.
    pub fn tick(&mut self, dt: f32) -> Vec<K> {
        let mut fired = Vec::new();
        self.timers.retain(|key, timer| match timer.tick(dt) {
            TimerStatus::Pending => true,
            TimerStatus::Fired => {
                fired.push(*key);
                false
            }
            TimerStatus::Finished | TimerStatus::Cancelled => false,
        });
        fired
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
