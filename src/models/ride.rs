// src/models/ride.rs
use serde::{Deserialize, Serialize};

use super::order::OrderStatus;

/// Client-local ride status the screens render.
///
/// Narrower than the backend's `OrderStatus`: only the states an assigned
/// driver can be in. Mutated exclusively by the reconciler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Enroute,
    Arrived,
    InProgress,
    Completed,
    PaymentPending,
}

impl RideStatus {
    /// Progression rank. Merges never move this backwards: the channels
    /// (gateway push, REST poll, optimistic local writes) are unordered
    /// relative to each other.
    pub fn rank(&self) -> u8 {
        match self {
            RideStatus::Enroute => 0,
            RideStatus::Arrived => 1,
            RideStatus::InProgress => 2,
            RideStatus::Completed => 3,
            RideStatus::PaymentPending => 4,
        }
    }

    /// Payment confirmation flow entry point.
    pub fn requires_payment_flow(&self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::PaymentPending)
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RideStatus::Enroute => write!(f, "enroute"),
            RideStatus::Arrived => write!(f, "arrived"),
            RideStatus::InProgress => write!(f, "in_progress"),
            RideStatus::Completed => write!(f, "completed"),
            RideStatus::PaymentPending => write!(f, "payment_pending"),
        }
    }
}

/// Terminal outcome of a tracked ride. Once set, the engine stops accrual
/// tasks and the screens navigate away.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum RideOutcome {
    Cancelled(String),
    PaymentConfirmed,
}

/// What a server status means for the derived ride state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMapping {
    Ride(RideStatus),
    Cancelled,
    PaymentConfirmed,
    /// Not representable on an active driver screen. Retain the previous
    /// derived status and log, never crash.
    Unmapped,
}

/// Fixed lookup from the backend vocabulary to the driver-local one.
pub fn map_order_status(status: OrderStatus) -> StatusMapping {
    match status {
        OrderStatus::Accepted | OrderStatus::DriverEnroute | OrderStatus::Booked => {
            StatusMapping::Ride(RideStatus::Enroute)
        }
        OrderStatus::DriverArrived => StatusMapping::Ride(RideStatus::Arrived),
        OrderStatus::InProgress => StatusMapping::Ride(RideStatus::InProgress),
        OrderStatus::Completed => StatusMapping::Ride(RideStatus::Completed),
        OrderStatus::PaymentPending => StatusMapping::Ride(RideStatus::PaymentPending),
        OrderStatus::Cancelled | OrderStatus::Expired => StatusMapping::Cancelled,
        OrderStatus::PaymentConfirmed => StatusMapping::PaymentConfirmed,
        OrderStatus::Pending | OrderStatus::Unknown => StatusMapping::Unmapped,
    }
}

impl RideStatus {
    /// The wire status pushed back to the backend for a local transition.
    pub fn as_order_status(&self) -> OrderStatus {
        match self {
            RideStatus::Enroute => OrderStatus::DriverEnroute,
            RideStatus::Arrived => OrderStatus::DriverArrived,
            RideStatus::InProgress => OrderStatus::InProgress,
            RideStatus::Completed => OrderStatus::Completed,
            RideStatus::PaymentPending => OrderStatus::PaymentPending,
        }
    }
}
