//! Application-level liveness probing.
//!
//! While a connection is open the monitor ticks every `interval`. On each tick the socket sends
//! a probe and, when a timeout policy is configured, arms a per-probe timeout. Expired timeouts
//! count as misses; any inbound frame resets the count. The pool of armed timeouts never grows
//! beyond `timeout_count`, so a silent peer cannot make timers pile up.

use std::future::{pending, poll_fn};
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::time::DelayQueue;

use super::config::HeartbeatConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatEvent {
    /// Time to send a probe
    Probe,
    /// A probe went unanswered for `timeout`
    Miss,
}

pub(crate) struct HeartbeatMonitor {
    interval: Duration,
    policy: Option<(Duration, u32)>,
    ticker: Option<Interval>,
    timeouts: DelayQueue<()>,
    /// Timeouts armed since the last reset, fired ones included
    armed: u32,
    misses: u32,
}

impl HeartbeatMonitor {
    pub(crate) fn new(config: &HeartbeatConfig) -> Self {
        Self {
            interval: config.interval,
            policy: config.timeout_policy(),
            ticker: None,
            timeouts: DelayQueue::new(),
            armed: 0,
            misses: 0,
        }
    }

    /// (Re)start probing. Returns `false` when the heartbeat is disabled.
    pub(crate) fn start(&mut self) -> bool {
        self.stop();
        if self.interval.is_zero() {
            return false;
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
        true
    }

    pub(crate) fn stop(&mut self) {
        self.ticker = None;
        self.reset();
    }

    /// Drop every pending timeout and forget all misses.
    pub(crate) fn reset(&mut self) {
        self.timeouts.clear();
        self.armed = 0;
        self.misses = 0;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    pub(crate) fn misses(&self) -> u32 {
        self.misses
    }

    pub(crate) fn armed(&self) -> u32 {
        self.armed
    }

    /// Arm a timeout for the probe that was just sent, if the policy and the pool allow it.
    pub(crate) fn arm_timeout(&mut self) -> bool {
        let Some((timeout, count)) = self.policy else {
            return false;
        };
        if self.armed >= count {
            return false;
        }

        self.timeouts.insert((), timeout);
        self.armed += 1;
        true
    }

    /// Count a missed probe. Returns `true` once the miss threshold is reached.
    pub(crate) fn record_miss(&mut self) -> bool {
        self.misses = self.misses.saturating_add(1);
        self.policy
            .is_some_and(|(_, count)| self.misses >= count)
    }

    pub(crate) async fn next_event(&mut self) -> HeartbeatEvent {
        let Self {
            ticker, timeouts, ..
        } = self;

        tokio::select! {
            () = tick(ticker) => HeartbeatEvent::Probe,
            () = expired(timeouts) => HeartbeatEvent::Miss,
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending().await,
    }
}

async fn expired(timeouts: &mut DelayQueue<()>) {
    match poll_fn(|cx| timeouts.poll_expired(cx)).await {
        Some(_) => {}
        None => pending().await,
    }
}
