// src/models/order.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ride/booking entity, owned by the backend.
///
/// The engine holds an eventually-consistent cached copy: every full fetch
/// replaces it, gateway events patch individual fields. Pricing fields are
/// the server's view; the engine recomputes the breakdown defensively (see
/// `models::fare`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub driver_id: Option<Uuid>,
    pub passenger_name: String,
    pub passenger_phone: Option<String>,
    pub passenger_count: u32,
    pub pickup: Address,
    pub destination: Address,
    #[serde(default)]
    pub stops: Vec<Address>,
    /// Estimated route distance, kilometers.
    pub distance_km: Decimal,
    // Server pricing snapshot. Absent fields fall back to tariff defaults.
    pub base_fare: Option<Decimal>,
    pub rate_per_km_day: Option<Decimal>,
    pub rate_per_km_night: Option<Decimal>,
    #[serde(default)]
    pub supplements: Decimal,
    #[serde(default)]
    pub waiting_fee: Decimal,
    #[serde(default)]
    pub paid_stop_fee: Decimal,
    /// Total billable paid-stop seconds the server has recorded so far.
    #[serde(default)]
    pub paid_stop_seconds: u64,
    pub total_price: Option<Decimal>,
    // Advance booking scheduling
    #[serde(default)]
    pub is_advance_booking: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    // Lifecycle timestamps (server-confirmed)
    pub arrived_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Wire status vocabulary of the backend's Order.
///
/// Unknown strings deserialize to `Unknown` so a new server-side status
/// never fails the whole payload; the reconciler retains the previous
/// derived status and logs it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    DriverEnroute,
    DriverArrived,
    InProgress,
    Completed,
    PaymentPending,
    PaymentConfirmed,
    Cancelled,
    Expired,
    Booked,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::DriverEnroute => "driver_enroute",
            OrderStatus::DriverArrived => "driver_arrived",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::PaymentPending => "payment_pending",
            OrderStatus::PaymentConfirmed => "payment_confirmed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
            OrderStatus::Booked => "booked",
            OrderStatus::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> OrderStatus {
        match raw {
            "pending" => OrderStatus::Pending,
            "accepted" => OrderStatus::Accepted,
            "driver_enroute" => OrderStatus::DriverEnroute,
            "driver_arrived" => OrderStatus::DriverArrived,
            "in_progress" => OrderStatus::InProgress,
            "completed" => OrderStatus::Completed,
            "payment_pending" => OrderStatus::PaymentPending,
            "payment_confirmed" => OrderStatus::PaymentConfirmed,
            "cancelled" => OrderStatus::Cancelled,
            "expired" => OrderStatus::Expired,
            "booked" => OrderStatus::Booked,
            _ => OrderStatus::Unknown,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    InApp,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::InApp => write!(f, "in_app"),
        }
    }
}
