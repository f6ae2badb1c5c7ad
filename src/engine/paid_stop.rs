// src/engine/paid_stop.rs
//! Paid-stop accrual
//!
//! A ride can pause any number of times; every pause is billable per
//! started minute of the running total. The ledger keeps a monotonic
//! accumulated-seconds counter across cycles and a billed-minutes
//! high-water mark: closing an interval bills
//! `floor(total/60) - floor(previous_total/60)` minutes, so a minute that
//! was already charged is never charged again, no matter how the ride is
//! chopped into stop/resume cycles.
//!
//! Elapsed time comes from monotonic instants captured at start, never
//! from counting timer ticks; the display ticker only reads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

use crate::error::EngineError;
use crate::models::fare::round_cents;

/// Pure accumulation state, separable from the async shell for testing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaidStopLedger {
    accumulated_seconds: u64,
    billed_minutes: u64,
}

/// What one closed stop cycle owes the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReceipt {
    /// Minutes newly crossed this cycle; zero when the cycle stayed inside
    /// an already-billed minute.
    pub minutes_delta: u64,
    /// Charge for the delta at the tariff rate.
    pub amount: Decimal,
    pub total_seconds: u64,
    pub total_minutes: u64,
}

impl PaidStopLedger {
    pub fn accumulated_seconds(&self) -> u64 {
        self.accumulated_seconds
    }

    pub fn billed_minutes(&self) -> u64 {
        self.billed_minutes
    }

    /// Fold one closed interval into the running total and return the
    /// billable minute delta.
    pub fn close_interval(&mut self, elapsed_seconds: u64, rate_per_minute: Decimal) -> StopReceipt {
        self.accumulated_seconds += elapsed_seconds;

        let total_minutes = self.accumulated_seconds / 60;
        let minutes_delta = total_minutes - self.billed_minutes;
        self.billed_minutes = total_minutes;

        StopReceipt {
            minutes_delta,
            amount: round_cents(Decimal::from(minutes_delta) * rate_per_minute),
            total_seconds: self.accumulated_seconds,
            total_minutes,
        }
    }

    /// Reconcile against the server's tally from a full order fetch.
    ///
    /// The server is source of truth for anything a lost persist dropped;
    /// both counters only ever move forward.
    pub fn reconcile(&mut self, server_total_seconds: u64) {
        if server_total_seconds > self.accumulated_seconds {
            self.accumulated_seconds = server_total_seconds;
        }
        let server_minutes = server_total_seconds / 60;
        if server_minutes > self.billed_minutes {
            self.billed_minutes = server_minutes;
        }
    }
}

#[derive(Debug)]
struct RunningStop {
    started_monotonic: Instant,
    started_wall: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    ledger: PaidStopLedger,
    running: Option<RunningStop>,
}

/// Stop/resume lifecycle around the ledger. States: idle, running.
pub struct PaidStopTracker {
    state: Mutex<State>,
    rate_per_minute: Decimal,
}

impl PaidStopTracker {
    pub fn new(rate_per_minute: Decimal) -> Self {
        Self {
            state: Mutex::new(State::default()),
            rate_per_minute,
        }
    }

    /// Start from the server's tally (attaching to an order that already
    /// accrued paid stops, e.g. after an app restart).
    pub fn with_server_tally(rate_per_minute: Decimal, server_total_seconds: u64) -> Self {
        let mut ledger = PaidStopLedger::default();
        ledger.reconcile(server_total_seconds);
        Self {
            state: Mutex::new(State {
                ledger,
                running: None,
            }),
            rate_per_minute,
        }
    }

    /// Begin a paid stop. Errors if one is already running.
    pub async fn start(&self) -> Result<DateTime<Utc>, EngineError> {
        let mut state = self.state.lock().await;
        if state.running.is_some() {
            return Err(EngineError::PaidStopAlreadyRunning);
        }

        let started_wall = Utc::now();
        state.running = Some(RunningStop {
            started_monotonic: Instant::now(),
            started_wall,
        });

        info!("Paid stop started at {}", started_wall);
        Ok(started_wall)
    }

    /// End the running stop: fold the interval and return the receipt the
    /// caller persists. Errors if no stop is running.
    pub async fn stop(&self) -> Result<StopReceipt, EngineError> {
        let mut state = self.state.lock().await;
        let running = state.running.take().ok_or(EngineError::PaidStopNotRunning)?;

        let elapsed_seconds = running.started_monotonic.elapsed().as_secs();
        let receipt = state
            .ledger
            .close_interval(elapsed_seconds, self.rate_per_minute);

        info!(
            "Paid stop ended: +{}s this cycle, {} min newly billed, {}s total",
            elapsed_seconds, receipt.minutes_delta, receipt.total_seconds
        );
        Ok(receipt)
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running.is_some()
    }

    /// Accumulated plus the open interval, for display polls.
    pub async fn display_seconds(&self) -> u64 {
        let state = self.state.lock().await;
        let open = state
            .running
            .as_ref()
            .map(|r| r.started_monotonic.elapsed().as_secs())
            .unwrap_or(0);
        state.ledger.accumulated_seconds() + open
    }

    pub async fn billed_minutes(&self) -> u64 {
        self.state.lock().await.ledger.billed_minutes()
    }

    /// Adopt the server's tally (full order fetch). Skipped while a stop
    /// is running: the open interval is not on the server yet.
    pub async fn reconcile(&self, server_total_seconds: u64) {
        let mut state = self.state.lock().await;
        if state.running.is_none() {
            state.ledger.reconcile(server_total_seconds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const RATE: Decimal = Decimal::from_parts(50, 0, 0, false, 2); // 0.50

    #[test]
    fn test_single_interval_bills_floor_minutes() {
        let mut ledger = PaidStopLedger::default();
        let receipt = ledger.close_interval(150, RATE); // 2.5 min

        assert_eq!(receipt.minutes_delta, 2);
        assert_eq!(receipt.amount, dec!(1.00));
        assert_eq!(receipt.total_seconds, 150);
    }

    #[test]
    fn test_residual_seconds_carry_into_next_cycle() {
        let mut ledger = PaidStopLedger::default();

        // 90s -> 1 minute billed, 30s residue
        let first = ledger.close_interval(90, RATE);
        assert_eq!(first.minutes_delta, 1);

        // +40s -> 130s total = 2 minutes, only 1 newly billed
        let second = ledger.close_interval(40, RATE);
        assert_eq!(second.minutes_delta, 1);
        assert_eq!(second.total_seconds, 130);
        assert_eq!(ledger.billed_minutes(), 2);
    }

    #[test]
    fn test_short_cycle_bills_nothing() {
        let mut ledger = PaidStopLedger::default();
        let receipt = ledger.close_interval(20, RATE);
        assert_eq!(receipt.minutes_delta, 0);
        assert_eq!(receipt.amount, dec!(0));
    }

    #[test]
    fn test_total_billed_equals_floor_of_total() {
        let mut ledger = PaidStopLedger::default();
        let cycles = [45u64, 30, 75, 10, 130];
        let mut billed = 0;
        for secs in cycles {
            billed += ledger.close_interval(secs, RATE).minutes_delta;
        }
        let total: u64 = cycles.iter().sum();
        assert_eq!(billed, total / 60);
        assert_eq!(ledger.billed_minutes(), total / 60);
    }

    #[test]
    fn test_reconcile_only_moves_forward() {
        let mut ledger = PaidStopLedger::default();
        ledger.close_interval(200, RATE);

        ledger.reconcile(100); // stale server view
        assert_eq!(ledger.accumulated_seconds(), 200);

        ledger.reconcile(400); // server knows more
        assert_eq!(ledger.accumulated_seconds(), 400);
        assert_eq!(ledger.billed_minutes(), 6);
    }

    #[tokio::test]
    async fn test_tracker_rejects_double_start() {
        let tracker = PaidStopTracker::new(RATE);
        tracker.start().await.unwrap();
        assert!(matches!(
            tracker.start().await,
            Err(EngineError::PaidStopAlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn test_tracker_rejects_stop_when_idle() {
        let tracker = PaidStopTracker::new(RATE);
        assert!(matches!(
            tracker.stop().await,
            Err(EngineError::PaidStopNotRunning)
        ));
    }

    #[tokio::test]
    async fn test_tracker_stop_after_start() {
        let tracker = PaidStopTracker::new(RATE);
        tracker.start().await.unwrap();
        assert!(tracker.is_running().await);

        let receipt = tracker.stop().await.unwrap();
        assert!(!tracker.is_running().await);
        assert_eq!(receipt.minutes_delta, 0); // sub-second cycle
    }

    #[tokio::test]
    async fn test_reconcile_skipped_while_running() {
        let tracker = PaidStopTracker::new(RATE);
        tracker.start().await.unwrap();
        tracker.reconcile(600).await;
        assert_eq!(tracker.billed_minutes().await, 0);

        tracker.stop().await.unwrap();
        tracker.reconcile(600).await;
        assert_eq!(tracker.billed_minutes().await, 10);
    }
}
