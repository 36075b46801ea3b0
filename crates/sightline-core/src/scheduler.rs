//! Timing primitives for the narration scheduler
//!
//! The pipeline owns three small pieces of timing state: the recurring
//! auto-narration ticker, the one-shot settle timer after a mode switch,
//! and the single-flight gate for auto triggers. Arming always replaces
//! the previous schedule, never stacks a second one.

use std::future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior, Sleep};

/// Recurring auto-narration ticker.
///
/// Fires immediately when armed, then on the fixed period. Ticks missed
/// while the loop is busy are skipped rather than bursted.
#[derive(Default)]
pub struct AutoTicker {
    interval: Option<Interval>,
}

impl AutoTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh schedule, replacing any existing one. Periods are
    /// floored at 1 ms.
    pub fn arm(&mut self, period: Duration) {
        // tokio's interval panics on a zero period.
        let mut ticker = interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(ticker);
    }

    /// Cancel the schedule.
    pub fn disarm(&mut self) {
        self.interval = None;
    }

    pub fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next tick. Pending forever while disarmed, so this can
    /// sit in a `select!` arm unconditionally.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => future::pending::<()>().await,
        }
    }
}

/// One-shot timer for the post-mode-switch narration.
///
/// Re-arming replaces the pending shot. The timer clears itself once it
/// fires.
#[derive(Default)]
pub struct SettleTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl SettleTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a shot after `delay`, replacing any pending one.
    pub fn arm(&mut self, delay: Duration) {
        self.sleep = Some(Box::pin(tokio::time::sleep(delay)));
    }

    /// Drop the pending shot, if any.
    pub fn disarm(&mut self) {
        self.sleep = None;
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Wait until the pending shot fires, then clear it. Pending forever
    /// while disarmed.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => future::pending::<()>().await,
        }
    }
}

/// Single-flight gate for auto-triggered analyses.
#[derive(Debug, Default)]
pub struct FlightGate {
    in_flight: bool,
}

impl FlightGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate. Returns false while a request is already outstanding.
    pub fn try_begin(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Release the gate once the outstanding request completes.
    pub fn clear(&mut self) {
        self.in_flight = false;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_armed_ticker_fires_immediately() {
        let mut ticker = AutoTicker::new();
        ticker.arm(Duration::from_secs(60));
        timeout(Duration::from_millis(50), ticker.tick())
            .await
            .expect("first tick should be immediate");
    }

    #[tokio::test]
    async fn test_disarmed_ticker_never_fires() {
        let mut ticker = AutoTicker::new();
        assert!(timeout(Duration::from_millis(30), ticker.tick())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_zero_period_is_floored_not_fatal() {
        let mut ticker = AutoTicker::new();
        ticker.arm(Duration::ZERO);
        timeout(Duration::from_millis(50), ticker.tick())
            .await
            .expect("first tick should be immediate");
        timeout(Duration::from_millis(50), ticker.tick())
            .await
            .expect("floored period should keep ticking");
    }

    #[tokio::test]
    async fn test_rearm_replaces_the_schedule() {
        let mut ticker = AutoTicker::new();
        ticker.arm(Duration::from_secs(3600));
        ticker.tick().await; // immediate first tick

        ticker.arm(Duration::from_millis(10));
        ticker.tick().await; // immediate again on the fresh schedule
        timeout(Duration::from_millis(100), ticker.tick())
            .await
            .expect("second tick should follow the new period");
    }

    #[tokio::test]
    async fn test_settle_timer_fires_once_and_clears() {
        let mut settle = SettleTimer::new();
        settle.arm(Duration::from_millis(10));
        timeout(Duration::from_millis(100), settle.fired())
            .await
            .expect("settle shot should fire");
        assert!(!settle.is_armed());
        assert!(timeout(Duration::from_millis(30), settle.fired())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_settle_rearm_replaces_pending_shot() {
        let mut settle = SettleTimer::new();
        settle.arm(Duration::from_secs(60));
        settle.arm(Duration::from_millis(10));
        timeout(Duration::from_millis(100), settle.fired())
            .await
            .expect("re-armed shot should fire on the new delay");
    }

    #[test]
    fn test_gate_admits_one_flight() {
        let mut gate = FlightGate::new();
        assert!(gate.try_begin());
        assert!(!gate.try_begin());
        assert!(gate.is_in_flight());
        gate.clear();
        assert!(gate.try_begin());
    }
}
