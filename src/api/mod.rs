// src/api/mod.rs
//! Platform REST API client
//!
//! JSON over HTTPS with session-cookie auth. The endpoints are consumed
//! contracts owned by the backend; this module only wraps them with retry,
//! classification and typed DTOs.

pub mod auth;
pub mod client;
pub mod orders;
pub mod types;

pub use client::ApiClient;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Order, OrderStatus};
use types::{PaidStopChargeRequest, PaymentRequest, WaitingFeeRequest};

/// Order persistence seam the engine drives.
///
/// Exists so the engine logic is testable without a live backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn fetch_order(&self, order_id: Uuid) -> Result<Order, EngineError>;

    async fn update_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<Order, EngineError>;

    async fn post_waiting_fee(
        &self,
        order_id: Uuid,
        req: WaitingFeeRequest,
    ) -> Result<(), EngineError>;

    async fn post_paid_stop_charge(
        &self,
        order_id: Uuid,
        req: PaidStopChargeRequest,
    ) -> Result<(), EngineError>;

    async fn submit_payment(
        &self,
        order_id: Uuid,
        req: PaymentRequest,
    ) -> Result<Order, EngineError>;
}
