// src/engine/mod.rs
//! Ride engine
//!
//! Wires the reconciler, the accrual trackers, the REST client and the
//! realtime gateway into one facade the embedding UI drives. Driver
//! intents apply an optimistic local transition, persist it over REST and
//! notify the counterpart over the gateway; background tasks keep the
//! derived state reconciled from both channels.

pub mod paid_stop;
pub mod reconciler;
pub mod waiting;

pub use paid_stop::{PaidStopLedger, PaidStopTracker, StopReceipt};
pub use reconciler::{EngineSignal, RideReconciler, RideSnapshot, StatusSource};
pub use waiting::WaitingClock;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::api::types::{PaidStopChargeRequest, PaymentRequest, WaitingFeeRequest};
use crate::api::OrderApi;
use crate::error::EngineError;
use crate::models::{Order, PaymentMethod, RideStatus, Tariff};
use crate::realtime::{driver_room, order_room, GatewayEvent, RealtimeClient};

/// Sub-second display refresh for the waiting / paid-stop counters.
const DISPLAY_TICK: Duration = Duration::from_millis(250);

pub struct RideEngine {
    reconciler: Arc<RideReconciler>,
    paid_stop: Arc<PaidStopTracker>,
    api: Arc<dyn OrderApi>,
    gateway: Arc<RealtimeClient>,
    poll_interval: Duration,
}

impl RideEngine {
    pub fn new(
        order: Order,
        tariff: Tariff,
        api: Arc<dyn OrderApi>,
        gateway: Arc<RealtimeClient>,
        poll_interval: Duration,
    ) -> (
        Arc<Self>,
        watch::Receiver<RideSnapshot>,
        mpsc::UnboundedReceiver<EngineSignal>,
    ) {
        // Adopt whatever the server already billed before we attached.
        let paid_stop = Arc::new(PaidStopTracker::with_server_tally(
            tariff.paid_stop_rate_per_minute,
            order.paid_stop_seconds,
        ));
        let (reconciler, snapshot_rx, signals_rx) = RideReconciler::new(order, tariff);

        let engine = Arc::new(Self {
            reconciler: Arc::new(reconciler),
            paid_stop,
            api,
            gateway,
            poll_interval,
        });

        (engine, snapshot_rx, signals_rx)
    }

    pub fn reconciler(&self) -> &RideReconciler {
        &self.reconciler
    }

    /// Join rooms and spawn the background tasks (gateway loop, event
    /// pump, REST poll fallback, display ticker).
    pub async fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let order_id = self.reconciler.order_id();
        self.gateway.join(&order_room(&order_id)).await;

        let mut handles = Vec::new();

        handles.push(tokio::spawn({
            let gateway = self.gateway.clone();
            async move { gateway.run().await }
        }));

        handles.push(tokio::spawn({
            let engine = self.clone();
            async move { engine.event_pump().await }
        }));

        handles.push(tokio::spawn({
            let engine = self.clone();
            async move { engine.poll_loop().await }
        }));

        handles.push(tokio::spawn({
            let engine = self.clone();
            async move { engine.display_ticker().await }
        }));

        info!("Ride engine started for order {}", order_id);
        handles
    }

    /// Register the driver's own room (cross-ride pushes).
    pub async fn join_driver_room(&self, driver_id: &uuid::Uuid) {
        self.gateway.join(&driver_room(driver_id)).await;
    }

    // ---- driver intents ----

    /// Driver is at the pickup point.
    pub async fn mark_arrived(&self) -> Result<(), EngineError> {
        self.ensure_active().await?;

        if !self.reconciler.advance_local(RideStatus::Arrived).await {
            return Err(EngineError::InvalidTransition("arrived".to_string()));
        }

        self.notify_status(RideStatus::Arrived);
        self.push_status(RideStatus::Arrived).await
    }

    /// Passenger on board: freeze the waiting accrual, persist its fee,
    /// move to in-progress.
    pub async fn start_ride(&self) -> Result<(), EngineError> {
        self.ensure_active().await?;

        let waited_seconds = self.reconciler.freeze_waiting(Utc::now()).await;

        if !self.reconciler.advance_local(RideStatus::InProgress).await {
            return Err(EngineError::InvalidTransition("in_progress".to_string()));
        }

        self.notify_status(RideStatus::InProgress);
        self.push_status(RideStatus::InProgress).await?;

        let tariff = self.reconciler.tariff();
        let amount = tariff.waiting_fee(waited_seconds);
        if amount > rust_decimal::Decimal::ZERO {
            let minutes = waited_seconds.saturating_sub(tariff.waiting_grace_seconds) / 60;
            let request = WaitingFeeRequest { minutes, amount };
            if let Err(e) = self
                .api
                .post_waiting_fee(self.reconciler.order_id(), request)
                .await
            {
                warn!("Failed to persist waiting fee: {}", e);
                self.reconciler.signal(EngineSignal::BillingSyncLost {
                    detail: format!("waiting fee: {}", e),
                });
            }
        }

        Ok(())
    }

    /// Destination reached.
    pub async fn complete_ride(&self) -> Result<(), EngineError> {
        self.ensure_active().await?;

        if self.paid_stop.is_running().await {
            self.end_paid_stop().await?;
        }

        if !self.reconciler.advance_local(RideStatus::Completed).await {
            return Err(EngineError::InvalidTransition("completed".to_string()));
        }

        self.notify_status(RideStatus::Completed);
        self.push_status(RideStatus::Completed).await
    }

    /// Begin a billable pause. Only valid while the ride is in progress.
    pub async fn start_paid_stop(&self) -> Result<(), EngineError> {
        self.ensure_active().await?;
        if self.reconciler.current_status().await != RideStatus::InProgress {
            return Err(EngineError::InvalidTransition(
                "paid stop outside active ride".to_string(),
            ));
        }

        let started_at = self.paid_stop.start().await?;
        self.gateway
            .emit(GatewayEvent::paid_stop_started(self.reconciler.order_id(), started_at));
        self.sync_paid_stop_display().await;
        Ok(())
    }

    /// End the billable pause: bill the minute delta, notify the
    /// counterpart with the delta and running total.
    pub async fn end_paid_stop(&self) -> Result<StopReceipt, EngineError> {
        let receipt = self.paid_stop.stop().await?;
        let order_id = self.reconciler.order_id();

        self.gateway.emit(GatewayEvent::paid_stop_ended(
            order_id,
            receipt.minutes_delta,
            receipt.total_seconds,
        ));

        if receipt.minutes_delta > 0 {
            let request = PaidStopChargeRequest {
                minutes: receipt.minutes_delta,
                amount: receipt.amount,
                total_seconds: receipt.total_seconds,
            };
            if let Err(e) = self.api.post_paid_stop_charge(order_id, request).await {
                // The ledger's high-water mark has already advanced:
                // re-billing locally could double-charge if this request
                // actually landed. The server repairs the tally on the
                // next full fetch.
                warn!("Failed to persist paid-stop charge: {}", e);
                self.reconciler.signal(EngineSignal::BillingSyncLost {
                    detail: format!("paid-stop charge: {}", e),
                });
            }
        }

        self.sync_paid_stop_display().await;
        Ok(receipt)
    }

    /// Submit the payment with the defensively recomputed breakdown.
    pub async fn submit_payment(&self, method: PaymentMethod) -> Result<(), EngineError> {
        let snapshot = self.reconciler.snapshot().await;
        if !snapshot.status.requires_payment_flow() {
            return Err(EngineError::InvalidTransition(
                "payment outside payment flow".to_string(),
            ));
        }

        let request = PaymentRequest {
            method,
            breakdown: snapshot.fare,
        };

        match self
            .api
            .submit_payment(self.reconciler.order_id(), request)
            .await
        {
            Ok(order) => {
                self.reconciler.apply_order(order, StatusSource::Rest).await;
                Ok(())
            }
            Err(e) => {
                error!("Payment submission failed: {}", e);
                self.reconciler.signal(EngineSignal::PaymentFailed {
                    detail: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Driver position push for the counterpart's map.
    pub async fn send_location(&self, latitude: f64, longitude: f64) {
        self.gateway.emit(GatewayEvent::location_update(
            self.reconciler.order_id(),
            latitude,
            longitude,
        ));
    }

    /// Best-effort teardown: a running paid stop must not leave the
    /// counterpart's display hanging.
    pub async fn shutdown(&self) {
        if self.paid_stop.is_running().await {
            let total = self.paid_stop.display_seconds().await;
            self.gateway.emit(GatewayEvent::paid_stop_ended(
                self.reconciler.order_id(),
                0,
                total,
            ));
            warn!("Shutting down with a paid stop running ({}s open)", total);
        }
        self.gateway.shutdown();
    }

    // ---- background tasks ----

    async fn event_pump(self: Arc<Self>) {
        let mut events = self.gateway.subscribe();

        loop {
            match events.recv().await {
                Ok(event) => {
                    self.reconciler.apply_event(&event).await;
                    if self.reconciler.is_terminated().await {
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Event pump lagged, {} event(s) dropped; poll will repair", missed);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    async fn poll_loop(self: Arc<Self>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let order_id = self.reconciler.order_id();

        loop {
            ticker.tick().await;

            if self.reconciler.is_terminated().await {
                return;
            }

            match self.api.fetch_order(order_id).await {
                Ok(order) => {
                    self.paid_stop.reconcile(order.paid_stop_seconds).await;
                    self.reconciler.apply_order(order, StatusSource::Rest).await;
                    self.sync_paid_stop_display().await;
                }
                Err(EngineError::Unauthorized) => {
                    error!("Session rejected during poll");
                    self.reconciler.signal(EngineSignal::SessionExpired);
                    return;
                }
                Err(e) => {
                    warn!("Order poll failed: {}", e);
                }
            }
        }
    }

    async fn display_ticker(self: Arc<Self>) {
        let mut ticker = interval(DISPLAY_TICK);

        loop {
            ticker.tick().await;

            if self.reconciler.is_terminated().await {
                return;
            }

            let status = self.reconciler.current_status().await;
            if self.paid_stop.is_running().await {
                self.sync_paid_stop_display().await;
            } else if status == RideStatus::Arrived {
                self.reconciler.tick(Utc::now()).await;
            }
        }
    }

    // ---- helpers ----

    async fn ensure_active(&self) -> Result<(), EngineError> {
        match self.reconciler.outcome().await {
            Some(outcome) => Err(EngineError::RideTerminated(format!("{:?}", outcome))),
            None => Ok(()),
        }
    }

    fn notify_status(&self, status: RideStatus) {
        self.gateway.emit(GatewayEvent::status_update(
            self.reconciler.order_id(),
            status.as_order_status().as_str(),
        ));
    }

    async fn push_status(&self, status: RideStatus) -> Result<(), EngineError> {
        match self
            .api
            .update_status(self.reconciler.order_id(), status.as_order_status())
            .await
        {
            Ok(order) => {
                self.reconciler.apply_order(order, StatusSource::Rest).await;
                Ok(())
            }
            Err(EngineError::Unauthorized) => {
                self.reconciler.signal(EngineSignal::SessionExpired);
                Err(EngineError::Unauthorized)
            }
            Err(e) => {
                // Optimistic state stands; the poll reconciles against the
                // server's view.
                warn!("Status push failed ({}); relying on poll", e);
                Err(e)
            }
        }
    }

    async fn sync_paid_stop_display(&self) {
        self.reconciler
            .set_paid_stop(
                self.paid_stop.display_seconds().await,
                self.paid_stop.billed_minutes().await,
                self.paid_stop.is_running().await,
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockOrderApi;
    use crate::config::RealtimeServer;
    use crate::models::order::{Address, OrderStatus};
    use crate::models::Order;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn test_order(status: OrderStatus) -> Order {
        Order {
            id: Uuid::new_v4(),
            status,
            driver_id: Some(Uuid::new_v4()),
            passenger_name: "Ana".to_string(),
            passenger_phone: None,
            passenger_count: 1,
            pickup: Address {
                label: "A".to_string(),
                latitude: 0.0,
                longitude: 0.0,
            },
            destination: Address {
                label: "B".to_string(),
                latitude: 1.0,
                longitude: 1.0,
            },
            stops: vec![],
            distance_km: dec!(8),
            base_fare: None,
            rate_per_km_day: None,
            rate_per_km_night: None,
            supplements: Decimal::ZERO,
            waiting_fee: Decimal::ZERO,
            paid_stop_fee: Decimal::ZERO,
            paid_stop_seconds: 0,
            total_price: None,
            is_advance_booking: false,
            scheduled_at: None,
            arrived_at: None,
            started_at: None,
            completed_at: None,
            cancelled_reason: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn offline_gateway() -> Arc<RealtimeClient> {
        RealtimeClient::new(
            RealtimeServer {
                host: "127.0.0.1".to_string(),
                port: 1,
                tls: false,
            },
            "token".to_string(),
        )
    }

    fn engine_with(
        order: Order,
        api: MockOrderApi,
    ) -> (
        Arc<RideEngine>,
        watch::Receiver<RideSnapshot>,
        mpsc::UnboundedReceiver<EngineSignal>,
    ) {
        RideEngine::new(
            order,
            Tariff::default(),
            Arc::new(api),
            offline_gateway(),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_mark_arrived_pushes_and_merges() {
        let order = test_order(OrderStatus::DriverEnroute);
        let order_id = order.id;

        let mut api = MockOrderApi::new();
        let mut server_copy = order.clone();
        api.expect_update_status()
            .withf(move |id, status| *id == order_id && *status == OrderStatus::DriverArrived)
            .times(1)
            .returning(move |_, _| {
                server_copy.status = OrderStatus::DriverArrived;
                server_copy.arrived_at = Some(chrono::Utc::now());
                Ok(server_copy.clone())
            });

        let (engine, snapshots, _signals) = engine_with(order, api);
        engine.mark_arrived().await.unwrap();

        let snapshot = snapshots.borrow().clone();
        assert_eq!(snapshot.status, RideStatus::Arrived);
        assert!(snapshot.waiting_server_confirmed);
    }

    #[tokio::test]
    async fn test_start_ride_persists_waiting_fee() {
        let mut order = test_order(OrderStatus::DriverArrived);
        // Arrived 10 minutes ago, server-confirmed: 5 billable minutes
        order.arrived_at = Some(chrono::Utc::now() - chrono::Duration::seconds(600));
        let order_id = order.id;

        let mut api = MockOrderApi::new();
        let server_copy = order.clone();
        api.expect_update_status().times(1).returning(move |_, status| {
            let mut o = server_copy.clone();
            o.status = status;
            Ok(o)
        });
        api.expect_post_waiting_fee()
            .withf(move |id, req| {
                *id == order_id && req.minutes == 5 && req.amount == dec!(2.50)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let (engine, snapshots, _signals) = engine_with(order, api);
        engine.start_ride().await.unwrap();

        let snapshot = snapshots.borrow().clone();
        assert_eq!(snapshot.status, RideStatus::InProgress);
        assert_eq!(snapshot.fare.waiting_fee, dec!(2.50));
    }

    #[tokio::test]
    async fn test_paid_stop_cycle_without_billable_minute() {
        let mut order = test_order(OrderStatus::InProgress);
        order.started_at = Some(chrono::Utc::now());

        // Sub-minute cycle: no charge must be posted.
        let api = MockOrderApi::new();
        let (engine, _snapshots, _signals) = engine_with(order, api);

        engine.start_paid_stop().await.unwrap();
        assert!(matches!(
            engine.start_paid_stop().await,
            Err(EngineError::PaidStopAlreadyRunning)
        ));

        let receipt = engine.end_paid_stop().await.unwrap();
        assert_eq!(receipt.minutes_delta, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paid_stop_persist_failure_signals_sync_lost() {
        let mut order = test_order(OrderStatus::InProgress);
        order.started_at = Some(chrono::Utc::now());

        let mut api = MockOrderApi::new();
        api.expect_post_paid_stop_charge()
            .withf(|_, req| req.minutes == 1 && req.total_seconds == 61)
            .times(1)
            .returning(|_, _| Err(EngineError::Http(503)));

        let (engine, _snapshots, mut signals) = engine_with(order, api);

        engine.start_paid_stop().await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let receipt = engine.end_paid_stop().await.unwrap();
        assert_eq!(receipt.minutes_delta, 1);
        assert_eq!(receipt.amount, dec!(0.50));

        let mut saw_sync_lost = false;
        while let Ok(signal) = signals.try_recv() {
            if matches!(signal, EngineSignal::BillingSyncLost { .. }) {
                saw_sync_lost = true;
            }
        }
        assert!(saw_sync_lost);

        // The high-water mark advanced despite the failure: an immediate
        // zero-length cycle bills nothing, so a landed-but-unacked first
        // request can never double-charge.
        engine.start_paid_stop().await.unwrap();
        let second = engine.end_paid_stop().await.unwrap();
        assert_eq!(second.minutes_delta, 0);
    }

    #[tokio::test]
    async fn test_submit_payment_outside_flow_rejected() {
        let order = test_order(OrderStatus::InProgress);
        let api = MockOrderApi::new();
        let (engine, _snapshots, _signals) = engine_with(order, api);

        assert!(matches!(
            engine.submit_payment(PaymentMethod::Cash).await,
            Err(EngineError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_payment_failure_signals() {
        let order = test_order(OrderStatus::PaymentPending);
        let mut api = MockOrderApi::new();
        api.expect_submit_payment()
            .times(1)
            .returning(|_, _| Err(EngineError::PaymentFailed("declined".to_string())));

        let (engine, _snapshots, mut signals) = engine_with(order, api);
        assert!(engine.submit_payment(PaymentMethod::Card).await.is_err());

        let mut saw_failure = false;
        while let Ok(signal) = signals.try_recv() {
            if matches!(signal, EngineSignal::PaymentFailed { .. }) {
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn test_intents_rejected_after_termination() {
        let order = test_order(OrderStatus::Accepted);
        let api = MockOrderApi::new();
        let (engine, _snapshots, _signals) = engine_with(order, api);

        engine.reconciler().cancel("dispatch").await;

        assert!(matches!(
            engine.mark_arrived().await,
            Err(EngineError::RideTerminated(_))
        ));
        assert!(matches!(
            engine.start_ride().await,
            Err(EngineError::RideTerminated(_))
        ));
    }
}
