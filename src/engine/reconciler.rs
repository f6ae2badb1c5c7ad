// src/engine/reconciler.rs
//! Ride status reconciler
//!
//! The single merge point for everything that claims to know the ride's
//! state: gateway pushes, REST fetches and local optimistic transitions.
//! The channels are unordered relative to each other, so every input goes
//! through one idempotent merge: drop foreign order ids, map the server
//! vocabulary through the fixed table, never move the derived status
//! backwards, and treat cancellation/payment confirmation as terminal.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::waiting::WaitingClock;
use crate::models::ride::{map_order_status, StatusMapping};
use crate::models::{FareBreakdown, Order, OrderStatus, RideOutcome, RideStatus, Tariff};
use crate::realtime::event::{names, GatewayEvent};

/// Derived state published to the embedding UI on every change.
#[derive(Debug, Clone)]
pub struct RideSnapshot {
    pub order_id: Uuid,
    pub status: RideStatus,
    pub outcome: Option<RideOutcome>,
    pub fare: FareBreakdown,
    pub waiting_seconds: u64,
    pub waiting_server_confirmed: bool,
    pub paid_stop_seconds: u64,
    pub paid_stop_running: bool,
}

/// One-shot side effects for the embedding UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSignal {
    /// First entry into completed/payment_pending. Emitted exactly once
    /// per ride regardless of how many redundant events arrive.
    EnterPaymentFlow,
    /// Terminal: navigate away from the active-ride flow.
    RideCancelled { reason: String },
    /// Terminal: payment confirmed, ride closed.
    RideClosed,
    /// A billing increment could not be persisted; the server will repair
    /// the tally on the next full fetch.
    BillingSyncLost { detail: String },
    PaymentFailed { detail: String },
    SessionExpired,
}

/// Where a status claim came from, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    Gateway,
    Rest,
    Local,
}

impl std::fmt::Display for StatusSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusSource::Gateway => write!(f, "gateway"),
            StatusSource::Rest => write!(f, "rest"),
            StatusSource::Local => write!(f, "local"),
        }
    }
}

struct ReconcilerState {
    order: Order,
    status: RideStatus,
    outcome: Option<RideOutcome>,
    payment_flow_triggered: bool,
    waiting: WaitingClock,
    /// Waiting accrual frozen when the ride starts.
    waiting_final_seconds: Option<u64>,
    paid_stop_seconds: u64,
    paid_stop_billed_minutes: u64,
    paid_stop_running: bool,
}

pub struct RideReconciler {
    order_id: Uuid,
    tariff: Tariff,
    state: RwLock<ReconcilerState>,
    snapshot_tx: watch::Sender<RideSnapshot>,
    signals_tx: mpsc::UnboundedSender<EngineSignal>,
}

impl RideReconciler {
    pub fn new(
        order: Order,
        tariff: Tariff,
    ) -> (
        Self,
        watch::Receiver<RideSnapshot>,
        mpsc::UnboundedReceiver<EngineSignal>,
    ) {
        let status = match map_order_status(order.status) {
            StatusMapping::Ride(status) => status,
            other => {
                warn!(
                    "Tracked order starts in {:?} ({}); defaulting to enroute",
                    other, order.status
                );
                RideStatus::Enroute
            }
        };

        let mut waiting = WaitingClock::new();
        if let Some(arrived_at) = order.arrived_at {
            waiting.confirm(arrived_at);
        }

        let state = ReconcilerState {
            paid_stop_seconds: order.paid_stop_seconds,
            paid_stop_billed_minutes: order.paid_stop_seconds / 60,
            paid_stop_running: false,
            order,
            status,
            outcome: None,
            payment_flow_triggered: false,
            waiting,
            waiting_final_seconds: None,
        };

        let order_id = state.order.id;
        let snapshot = Self::build_snapshot(&tariff, &state, Utc::now());
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot);
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();

        (
            Self {
                order_id,
                tariff,
                state: RwLock::new(state),
                snapshot_tx,
                signals_tx,
            },
            snapshot_rx,
            signals_rx,
        )
    }

    pub fn order_id(&self) -> Uuid {
        self.order_id
    }

    pub fn tariff(&self) -> &Tariff {
        &self.tariff
    }

    pub async fn current_status(&self) -> RideStatus {
        self.state.read().await.status
    }

    pub async fn outcome(&self) -> Option<RideOutcome> {
        self.state.read().await.outcome.clone()
    }

    pub async fn is_terminated(&self) -> bool {
        self.state.read().await.outcome.is_some()
    }

    /// Waiting seconds effective at `now` (frozen once the ride started).
    pub async fn waiting_seconds(&self, now: DateTime<Utc>) -> u64 {
        let state = self.state.read().await;
        Self::effective_waiting_seconds(&state, now)
    }

    /// Merge a full order payload (REST fetch or poll).
    pub async fn apply_order(&self, order: Order, source: StatusSource) {
        if order.id != self.order_id {
            debug!("Ignoring order {} (tracking {})", order.id, self.order_id);
            return;
        }

        let mut state = self.state.write().await;

        if let Some(arrived_at) = order.arrived_at {
            state.waiting.confirm(arrived_at);
        }

        let status = order.status;
        state.order = order;
        self.merge_status(&mut state, status, source);
        self.publish(&state, Utc::now());
    }

    /// Merge a gateway application event.
    pub async fn apply_event(&self, event: &GatewayEvent) {
        if let Some(id) = event.order_id() {
            if id != self.order_id {
                debug!("Ignoring event for order {} (tracking {})", id, self.order_id);
                return;
            }
        }

        let mut state = self.state.write().await;

        match event.event.as_str() {
            names::RIDE_STATUS_UPDATE => {
                let Some(raw) = event.raw_status() else {
                    warn!("ride:status:update without status field");
                    return;
                };
                if let Some(arrived_at) = event.arrived_at() {
                    state.waiting.confirm(arrived_at);
                }
                self.merge_status(&mut state, OrderStatus::parse(raw), StatusSource::Gateway);
            }
            names::RIDE_CANCELLED => {
                let reason = event.reason().unwrap_or("cancelled").to_string();
                self.terminate(&mut state, RideOutcome::Cancelled(reason));
            }
            names::RIDE_ARRIVAL_CONFIRMED => {
                if let Some(arrived_at) = event.arrived_at() {
                    state.waiting.confirm(arrived_at);
                }
                // Confirmation implies the arrived state even if the
                // status event itself was lost.
                self.merge_status(&mut state, OrderStatus::DriverArrived, StatusSource::Gateway);
            }
            other => {
                debug!("Unhandled gateway event: {}", other);
                return;
            }
        }

        self.publish(&state, Utc::now());
    }

    /// Optimistic local transition (driver intent). Returns whether the
    /// target status is in effect afterwards; `false` when the merge
    /// rejected it (terminal ride or regressive target).
    pub async fn advance_local(&self, target: RideStatus) -> bool {
        let mut state = self.state.write().await;
        self.merge_status(&mut state, target.as_order_status(), StatusSource::Local);
        let reached = state.status == target && state.outcome.is_none();
        self.publish(&state, Utc::now());
        reached
    }

    /// Cancellation observed on any channel, or decided locally.
    pub async fn cancel(&self, reason: &str) {
        let mut state = self.state.write().await;
        self.terminate(&mut state, RideOutcome::Cancelled(reason.to_string()));
        self.publish(&state, Utc::now());
    }

    /// Freeze the waiting accrual (ride started). Returns the frozen
    /// seconds; idempotent.
    pub async fn freeze_waiting(&self, now: DateTime<Utc>) -> u64 {
        let mut state = self.state.write().await;
        if let Some(frozen) = state.waiting_final_seconds {
            return frozen;
        }
        let seconds = state.waiting.elapsed_seconds(now);
        state.waiting_final_seconds = Some(seconds);
        self.publish(&state, now);
        seconds
    }

    /// Update the paid-stop display values owned by the tracker.
    pub async fn set_paid_stop(&self, total_seconds: u64, billed_minutes: u64, running: bool) {
        let mut state = self.state.write().await;
        state.paid_stop_seconds = total_seconds;
        state.paid_stop_billed_minutes = billed_minutes;
        state.paid_stop_running = running;
        self.publish(&state, Utc::now());
    }

    /// Recompute time-derived display state (ticker).
    pub async fn tick(&self, now: DateTime<Utc>) {
        let state = self.state.read().await;
        self.publish(&state, now);
    }

    /// Fresh snapshot of the current state.
    pub async fn snapshot(&self) -> RideSnapshot {
        let state = self.state.read().await;
        Self::build_snapshot(&self.tariff, &state, Utc::now())
    }

    pub fn signal(&self, signal: EngineSignal) {
        let _ = self.signals_tx.send(signal);
    }

    // ---- internals ----

    fn merge_status(&self, state: &mut ReconcilerState, status: OrderStatus, source: StatusSource) {
        if let Some(outcome) = &state.outcome {
            debug!(
                "Ride already terminated ({:?}); ignoring {} from {}",
                outcome, status, source
            );
            return;
        }

        match map_order_status(status) {
            StatusMapping::Ride(new_status) => {
                let current = state.status;
                if new_status.rank() < current.rank() {
                    debug!(
                        "Ignoring regressive status {} -> {} from {}",
                        current, new_status, source
                    );
                    return;
                }
                if new_status == current {
                    return;
                }

                info!("Ride {} status: {} -> {} ({})", self.order_id, current, new_status, source);
                state.status = new_status;
                state.order.status = status;
                self.on_entered(state, new_status);
            }
            StatusMapping::Cancelled => {
                let reason = state
                    .order
                    .cancelled_reason
                    .clone()
                    .unwrap_or_else(|| status.as_str().to_string());
                self.terminate(state, RideOutcome::Cancelled(reason));
            }
            StatusMapping::PaymentConfirmed => {
                self.terminate(state, RideOutcome::PaymentConfirmed);
            }
            StatusMapping::Unmapped => {
                warn!(
                    "Unmapped order status '{}' from {}; retaining {}",
                    status, source, state.status
                );
            }
        }
    }

    fn on_entered(&self, state: &mut ReconcilerState, status: RideStatus) {
        match status {
            RideStatus::Arrived => {
                // Local fallback until the server confirms the timestamp.
                state.waiting.start_local(Utc::now());
            }
            RideStatus::InProgress => {
                if state.waiting_final_seconds.is_none() {
                    let seconds = state.waiting.elapsed_seconds(Utc::now());
                    state.waiting_final_seconds = Some(seconds);
                }
            }
            _ => {}
        }

        if status.requires_payment_flow() && !state.payment_flow_triggered {
            state.payment_flow_triggered = true;
            self.signal(EngineSignal::EnterPaymentFlow);
        }
    }

    fn terminate(&self, state: &mut ReconcilerState, outcome: RideOutcome) {
        if state.outcome.is_some() {
            return;
        }

        info!("Ride {} terminated: {:?}", self.order_id, outcome);
        state.outcome = Some(outcome.clone());

        match outcome {
            RideOutcome::Cancelled(reason) => {
                self.signal(EngineSignal::RideCancelled { reason });
            }
            RideOutcome::PaymentConfirmed => {
                self.signal(EngineSignal::RideClosed);
            }
        }
    }

    fn effective_waiting_seconds(state: &ReconcilerState, now: DateTime<Utc>) -> u64 {
        state
            .waiting_final_seconds
            .unwrap_or_else(|| state.waiting.elapsed_seconds(now))
    }

    fn build_snapshot(tariff: &Tariff, state: &ReconcilerState, now: DateTime<Utc>) -> RideSnapshot {
        let waiting_seconds = Self::effective_waiting_seconds(state, now);
        let started_at = state.order.started_at.unwrap_or(now);

        let fare = FareBreakdown::compute(
            tariff,
            &state.order,
            started_at,
            waiting_seconds,
            state.paid_stop_billed_minutes,
        );

        RideSnapshot {
            order_id: state.order.id,
            status: state.status,
            outcome: state.outcome.clone(),
            fare,
            waiting_seconds,
            waiting_server_confirmed: state.waiting.is_server_confirmed(),
            paid_stop_seconds: state.paid_stop_seconds,
            paid_stop_running: state.paid_stop_running,
        }
    }

    fn publish(&self, state: &ReconcilerState, now: DateTime<Utc>) {
        let snapshot = Self::build_snapshot(&self.tariff, state, now);

        if !snapshot.fare.matches_server_total(state.order.total_price) {
            warn!(
                "Server total {:?} disagrees with recomputed {} for order {}; using recomputed",
                state.order.total_price, snapshot.fare.total, self.order_id
            );
        }

        self.snapshot_tx.send_replace(snapshot);
    }
}
