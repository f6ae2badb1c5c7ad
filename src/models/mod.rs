// src/models/mod.rs
pub mod fare;
pub mod order;
pub mod ride;

pub use fare::{FareBreakdown, Tariff};
pub use order::{Address, Order, OrderStatus, PaymentMethod};
pub use ride::{RideOutcome, RideStatus};
