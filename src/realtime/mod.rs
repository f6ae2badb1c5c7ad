// src/realtime/mod.rs
//! Realtime gateway client
//!
//! Push channel for ride updates: a persistent socket to the platform's
//! realtime gateway speaking newline-delimited JSON frames. The gateway,
//! its event names and room semantics are owned by the backend; this
//! module only consumes them. Delivery is not ordered relative to the
//! REST poll; the reconciler tolerates that.

pub mod client;
pub mod connection;
pub mod event;

pub use client::RealtimeClient;
pub use connection::{GatewayConnection, GatewayFrame};
pub use event::GatewayEvent;

/// Room naming scheme.
pub fn order_room(order_id: &uuid::Uuid) -> String {
    format!("order:{}", order_id)
}

pub fn driver_room(driver_id: &uuid::Uuid) -> String {
    format!("driver:{}", driver_id)
}
