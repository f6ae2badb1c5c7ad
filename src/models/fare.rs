// src/models/fare.rs
//! Tariff model and fare breakdown
//!
//! All money math is `Decimal`, rounded to cents per component. The
//! breakdown invariant: components always sum to the total shown to the
//! payer. The engine recomputes this client-side because incremental fees
//! are not always added atomically on the server.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::order::Order;

/// Tariff applied to a ride.
///
/// Defaults are the platform's published rates; server-sent pricing fields
/// on the Order override them per ride.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tariff {
    /// Flat pickup charge.
    pub base_fare: Decimal,

    /// Per-kilometer rate during day hours.
    pub rate_per_km_day: Decimal,

    /// Per-kilometer rate during the night window.
    pub rate_per_km_night: Decimal,

    /// Night window start hour, local time (inclusive).
    pub night_start_hour: u32,

    /// Night window end hour, local time (exclusive).
    pub night_end_hour: u32,

    /// Offset applied to UTC timestamps before the night check.
    pub utc_offset_hours: i32,

    /// Waiting charge per started minute past the grace period.
    pub waiting_rate_per_minute: Decimal,

    /// Free waiting time after arrival, seconds.
    pub waiting_grace_seconds: u64,

    /// Paid-stop charge per billed minute.
    pub paid_stop_rate_per_minute: Decimal,

    /// Platform service fee, percent of the ride subtotal.
    pub service_fee_percent: Decimal,

    /// Surcharge per passenger beyond the two included.
    pub passenger_surcharge: Decimal,

    /// Included passengers before the surcharge applies.
    pub included_passengers: u32,

    /// Fixed supplement for advance bookings.
    pub booking_supplement: Decimal,
}

impl Default for Tariff {
    fn default() -> Self {
        Self {
            base_fare: Decimal::new(250, 2),                // 2.50
            rate_per_km_day: Decimal::new(105, 2),          // 1.05 / km
            rate_per_km_night: Decimal::new(130, 2),        // 1.30 / km
            night_start_hour: 21,
            night_end_hour: 6,
            utc_offset_hours: 0,
            waiting_rate_per_minute: Decimal::new(50, 2),   // 0.50 / min
            waiting_grace_seconds: 300,
            paid_stop_rate_per_minute: Decimal::new(50, 2), // 0.50 / min
            service_fee_percent: Decimal::new(12, 0),       // 12 %
            passenger_surcharge: Decimal::new(200, 2),      // 2.00 / extra
            included_passengers: 2,
            booking_supplement: Decimal::new(500, 2),       // 5.00
        }
    }
}

impl Tariff {
    /// Overlay server-sent pricing fields from the order.
    pub fn for_order(order: &Order) -> Self {
        let mut tariff = Self::default();
        if let Some(base) = order.base_fare {
            tariff.base_fare = base;
        }
        if let Some(day) = order.rate_per_km_day {
            tariff.rate_per_km_day = day;
        }
        if let Some(night) = order.rate_per_km_night {
            tariff.rate_per_km_night = night;
        }
        tariff
    }

    /// Whether the night rate applies at the given instant.
    pub fn is_night(&self, at: DateTime<Utc>) -> bool {
        let local = at + Duration::hours(self.utc_offset_hours as i64);
        let hour = chrono::Timelike::hour(&local);
        if self.night_start_hour <= self.night_end_hour {
            hour >= self.night_start_hour && hour < self.night_end_hour
        } else {
            hour >= self.night_start_hour || hour < self.night_end_hour
        }
    }

    /// Per-kilometer rate effective at the given instant.
    #[inline]
    pub fn km_rate(&self, at: DateTime<Utc>) -> Decimal {
        if self.is_night(at) {
            self.rate_per_km_night
        } else {
            self.rate_per_km_day
        }
    }

    /// Waiting fee for a total waited duration.
    ///
    /// Zero within the grace period; beyond it, per whole started minute.
    #[inline]
    pub fn waiting_fee(&self, waited_seconds: u64) -> Decimal {
        let billable = waited_seconds.saturating_sub(self.waiting_grace_seconds);
        let minutes = billable / 60;
        round_cents(Decimal::from(minutes) * self.waiting_rate_per_minute)
    }

    /// Paid-stop fee for a number of billed minutes.
    #[inline]
    pub fn paid_stop_fee(&self, billed_minutes: u64) -> Decimal {
        round_cents(Decimal::from(billed_minutes) * self.paid_stop_rate_per_minute)
    }

    /// Surcharge for the given passenger count.
    #[inline]
    pub fn surcharge(&self, passenger_count: u32) -> Decimal {
        let extra = passenger_count.saturating_sub(self.included_passengers);
        round_cents(Decimal::from(extra) * self.passenger_surcharge)
    }
}

/// Itemized fare. `total` is always the sum of the other components.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FareBreakdown {
    pub base_fare: Decimal,
    pub distance_cost: Decimal,
    pub supplements: Decimal,
    pub passenger_surcharge: Decimal,
    pub waiting_fee: Decimal,
    pub paid_stop_fee: Decimal,
    pub service_fee: Decimal,
    pub total: Decimal,
}

impl FareBreakdown {
    /// Compute the breakdown for an order.
    ///
    /// `started_at` selects the day/night kilometer rate; `waiting_seconds`
    /// and `paid_stop_minutes` are the engine's accruals (which already
    /// reconcile against the server's tallies upstream).
    pub fn compute(
        tariff: &Tariff,
        order: &Order,
        started_at: DateTime<Utc>,
        waiting_seconds: u64,
        paid_stop_minutes: u64,
    ) -> Self {
        let base_fare = round_cents(tariff.base_fare);
        let distance_cost = round_cents(order.distance_km * tariff.km_rate(started_at));

        let mut supplements = round_cents(order.supplements);
        if order.is_advance_booking {
            supplements = round_cents(supplements + tariff.booking_supplement);
        }

        let passenger_surcharge = tariff.surcharge(order.passenger_count);
        let waiting_fee = tariff.waiting_fee(waiting_seconds);
        let paid_stop_fee = tariff.paid_stop_fee(paid_stop_minutes);

        let subtotal = base_fare
            + distance_cost
            + supplements
            + passenger_surcharge
            + waiting_fee
            + paid_stop_fee;
        let service_fee = round_cents(subtotal * tariff.service_fee_percent / Decimal::from(100));

        Self {
            base_fare,
            distance_cost,
            supplements,
            passenger_surcharge,
            waiting_fee,
            paid_stop_fee,
            service_fee,
            total: subtotal + service_fee,
        }
    }

    /// Re-derive the total from the components.
    #[inline]
    pub fn component_sum(&self) -> Decimal {
        self.base_fare
            + self.distance_cost
            + self.supplements
            + self.passenger_surcharge
            + self.waiting_fee
            + self.paid_stop_fee
            + self.service_fee
    }

    /// True when the server's reported total matches this breakdown.
    pub fn matches_server_total(&self, server_total: Option<Decimal>) -> bool {
        server_total.map_or(true, |t| round_cents(t) == round_cents(self.total))
    }
}

/// Round to cents, half away from zero.
#[inline]
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
