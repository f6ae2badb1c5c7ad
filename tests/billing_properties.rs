// tests/billing_properties.rs
//! Property tests for the billing and reconciliation invariants:
//! status never regresses, paid-stop minutes are never double-billed,
//! the waiting fee is zero inside the grace period and linear beyond it,
//! and the fare breakdown always sums to its total.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use tokio_test::block_on;
use uuid::Uuid;

use ride_driver_engine::engine::paid_stop::PaidStopLedger;
use ride_driver_engine::engine::reconciler::{RideReconciler, StatusSource};
use ride_driver_engine::models::order::{Address, Order, OrderStatus};
use ride_driver_engine::models::{FareBreakdown, RideStatus, Tariff};
use ride_driver_engine::realtime::GatewayEvent;

fn make_order(status: OrderStatus, distance_centikm: u64, passengers: u32) -> Order {
    Order {
        id: Uuid::new_v4(),
        status,
        driver_id: Some(Uuid::new_v4()),
        passenger_name: "Prop".to_string(),
        passenger_phone: None,
        passenger_count: passengers,
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
        distance_km: Decimal::new(distance_centikm as i64, 2),
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
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Non-terminal wire statuses, including ones the mapping rejects.
fn arb_status() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "pending",
        "accepted",
        "driver_enroute",
        "driver_arrived",
        "in_progress",
        "completed",
        "payment_pending",
        "booked",
        "driver_napping", // unknown
    ])
}

proptest! {
    /// Once the derived status reaches completed, no sequence of further
    /// (possibly duplicated, out-of-order) events moves it back.
    #[test]
    fn status_never_regresses_past_completed(
        before in prop::collection::vec(arb_status(), 0..12),
        after in prop::collection::vec(arb_status(), 0..12),
    ) {
        block_on(async {
            let order = make_order(OrderStatus::Accepted, 500, 1);
            let order_id = order.id;
            let (reconciler, _snapshots, _signals) =
                RideReconciler::new(order, Tariff::default());

            for raw in &before {
                reconciler
                    .apply_event(&GatewayEvent::status_update(order_id, raw))
                    .await;
            }

            reconciler
                .apply_event(&GatewayEvent::status_update(order_id, "completed"))
                .await;
            prop_assert!(reconciler.current_status().await.rank() >= RideStatus::Completed.rank());

            for raw in &after {
                reconciler
                    .apply_event(&GatewayEvent::status_update(order_id, raw))
                    .await;
                let status = reconciler.current_status().await;
                prop_assert!(
                    status.rank() >= RideStatus::Completed.rank(),
                    "regressed to {} after {}",
                    status,
                    raw
                );
            }
            Ok(())
        })?;
    }

    /// Derived status is monotone under any event sequence, from any
    /// mapped starting status.
    #[test]
    fn status_rank_is_monotone(
        start in prop::sample::select(vec![
            OrderStatus::Accepted,
            OrderStatus::DriverArrived,
            OrderStatus::InProgress,
        ]),
        events in prop::collection::vec(arb_status(), 0..20),
    ) {
        block_on(async {
            let order = make_order(start, 500, 1);
            let order_id = order.id;
            let (reconciler, _snapshots, _signals) =
                RideReconciler::new(order, Tariff::default());

            let mut last_rank = reconciler.current_status().await.rank();
            for raw in &events {
                reconciler
                    .apply_event(&GatewayEvent::status_update(order_id, raw))
                    .await;
                let rank = reconciler.current_status().await.rank();
                prop_assert!(rank >= last_rank, "rank dropped after {}", raw);
                last_rank = rank;
            }
            Ok(())
        })?;
    }

    /// A stale REST poll can never undo a gateway transition.
    #[test]
    fn stale_poll_never_regresses(
        poll_status in prop::sample::select(vec![
            OrderStatus::Accepted,
            OrderStatus::DriverEnroute,
            OrderStatus::DriverArrived,
            OrderStatus::InProgress,
        ]),
    ) {
        block_on(async {
            let order = make_order(OrderStatus::Accepted, 500, 1);
            let order_id = order.id;
            let (reconciler, _snapshots, _signals) =
                RideReconciler::new(order.clone(), Tariff::default());

            reconciler
                .apply_event(&GatewayEvent::status_update(order_id, "completed"))
                .await;

            let mut stale = order;
            stale.status = poll_status;
            reconciler.apply_order(stale, StatusSource::Rest).await;

            prop_assert_eq!(reconciler.current_status().await, RideStatus::Completed);
            Ok(())
        })?;
    }

    /// Across any stop/resume cycles, total billed minutes equal
    /// floor(total_seconds / 60): no minute billed twice, none skipped.
    #[test]
    fn paid_stop_never_double_bills(
        cycles in prop::collection::vec(0u64..900, 1..25),
    ) {
        let rate = Decimal::new(50, 2);
        let mut ledger = PaidStopLedger::default();
        let mut billed_total = 0u64;

        for secs in &cycles {
            let receipt = ledger.close_interval(*secs, rate);
            billed_total += receipt.minutes_delta;
        }

        let total_seconds: u64 = cycles.iter().sum();
        prop_assert_eq!(billed_total, total_seconds / 60);
        prop_assert_eq!(ledger.accumulated_seconds(), total_seconds);
        prop_assert_eq!(ledger.billed_minutes(), total_seconds / 60);
    }

    /// Stale server reconciliations between cycles change nothing about
    /// the total billed.
    #[test]
    fn paid_stop_stale_reconcile_is_harmless(
        cycles in prop::collection::vec(0u64..900, 1..15),
    ) {
        let rate = Decimal::new(50, 2);
        let mut ledger = PaidStopLedger::default();
        let mut billed_total = 0u64;

        for secs in &cycles {
            // The server can only know at most what we already told it.
            ledger.reconcile(ledger.accumulated_seconds().saturating_sub(30));
            let receipt = ledger.close_interval(*secs, rate);
            billed_total += receipt.minutes_delta;
        }

        let total_seconds: u64 = cycles.iter().sum();
        prop_assert_eq!(billed_total, total_seconds / 60);
    }

    /// Waiting fee: zero inside the 5-minute grace, per whole started
    /// minute beyond it, monotone nondecreasing.
    #[test]
    fn waiting_fee_grace_and_linearity(elapsed in 0u64..36_000) {
        let tariff = Tariff::default();
        let fee = tariff.waiting_fee(elapsed);

        if elapsed <= tariff.waiting_grace_seconds {
            prop_assert_eq!(fee, Decimal::ZERO);
        } else {
            let minutes = (elapsed - tariff.waiting_grace_seconds) / 60;
            prop_assert_eq!(fee, Decimal::from(minutes) * tariff.waiting_rate_per_minute);
        }

        prop_assert!(tariff.waiting_fee(elapsed + 60) >= fee);
    }

    /// Fare breakdown components always sum to the total.
    #[test]
    fn breakdown_components_sum_to_total(
        distance_centikm in 0u64..20_000,
        passengers in 1u32..7,
        waiting_seconds in 0u64..7_200,
        stop_minutes in 0u64..120,
        supplements_cents in 0u64..5_000,
        advance in any::<bool>(),
        hour in 0u32..24,
    ) {
        let tariff = Tariff::default();
        let mut order = make_order(OrderStatus::InProgress, distance_centikm, passengers);
        order.supplements = Decimal::new(supplements_cents as i64, 2);
        order.is_advance_booking = advance;

        let started_at = Utc.with_ymd_and_hms(2025, 6, 15, hour, 30, 0).unwrap();
        let breakdown =
            FareBreakdown::compute(&tariff, &order, started_at, waiting_seconds, stop_minutes);

        prop_assert_eq!(breakdown.component_sum(), breakdown.total);
        prop_assert!(breakdown.total >= Decimal::ZERO);
    }
}
