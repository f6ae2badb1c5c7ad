// src/api/types.rs
//! Wire DTOs for the platform REST API

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FareBreakdown, PaymentMethod};

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub driver_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionProbe {
    pub valid: bool,
}

#[derive(Debug, Serialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Waiting fee, persisted once when the ride starts.
#[derive(Debug, Clone, Serialize)]
pub struct WaitingFeeRequest {
    pub minutes: u64,
    pub amount: Decimal,
}

/// One paid-stop cycle's increment. The body carries only this cycle's
/// delta; `total_seconds` lets the server cross-check its running tally.
#[derive(Debug, Clone, Serialize)]
pub struct PaidStopChargeRequest {
    pub minutes: u64,
    pub amount: Decimal,
    pub total_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub method: PaymentMethod,
    pub breakdown: FareBreakdown,
}

#[derive(Debug, Deserialize)]
pub struct Ack {
    pub success: bool,
}

/// Error envelope the API returns on 4xx.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
}
