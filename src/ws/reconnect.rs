//! Bounded reconnection after unexpected disconnects.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use backoff::backoff::{Backoff as _, Constant};
use tokio::time::{Sleep, sleep};

use super::config::ReconnectConfig;

/// Outcome of [`ReconnectPolicy::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Schedule {
    /// A reconnect timer is running
    Armed { attempt: u32, delay: Duration },
    /// The retry budget is spent and the socket must close for good
    Exhausted,
}

/// Owns the reconnect timer and the attempt counter of one socket.
pub(crate) struct ReconnectPolicy {
    retry_count: Option<u32>,
    backoff: Constant,
    timer: Option<Pin<Box<Sleep>>>,
    attempts: u32,
    enabled: bool,
}

impl ReconnectPolicy {
    pub(crate) fn new(config: &ReconnectConfig) -> Self {
        Self {
            retry_count: config.retry_count,
            backoff: config.into(),
            timer: None,
            attempts: 0,
            enabled: true,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn enable(&mut self) {
        self.enabled = true;
    }

    /// Suppress automatic reconnection until the next [`enable`](Self::enable).
    pub(crate) fn disable(&mut self) {
        self.enabled = false;
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    /// The connection opened; the next disconnect starts a fresh episode.
    pub(crate) fn reset_attempts(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }

    /// Cancel the pending attempt, if any, and forget the attempt count.
    pub(crate) fn clear(&mut self) {
        self.timer = None;
        self.reset_attempts();
    }

    /// Arm the reconnect timer for the next attempt, replacing any pending one.
    pub(crate) fn schedule(&mut self) -> Schedule {
        self.timer = None;

        if self.retry_count == Some(0) {
            return Schedule::Exhausted;
        }

        self.attempts = self.attempts.saturating_add(1);
        if let Some(limit) = self.retry_count
            && self.attempts > limit
        {
            return Schedule::Exhausted;
        }

        let Some(delay) = self.backoff.next_backoff() else {
            return Schedule::Exhausted;
        };
        self.timer = Some(Box::pin(sleep(delay)));

        Schedule::Armed {
            attempt: self.attempts,
            delay,
        }
    }

    /// Resolves when the pending timer fires. Never resolves while nothing is scheduled.
    pub(crate) async fn expired(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.as_mut().await;
                self.timer = None;
            }
            None => pending().await,
        }
    }
}
