// src/api/orders.rs
//! Order endpoints
//!
//! Fetching is the fallback/reconciliation channel: whatever the gateway
//! missed, the next full fetch repairs. Billing increments (waiting fee,
//! paid-stop charges) carry only deltas, never recomputed totals.

use async_trait::async_trait;
use tracing::{info, instrument};
use uuid::Uuid;

use super::client::ApiClient;
use super::types::{
    Ack, PaidStopChargeRequest, PaymentRequest, UpdateStatusRequest, WaitingFeeRequest,
};
use super::OrderApi;
use crate::error::EngineError;
use crate::models::{Order, OrderStatus};

impl ApiClient {
    /// Fetch the driver's currently assigned order, if any.
    #[instrument(skip(self))]
    pub async fn fetch_active_order(&self) -> Result<Option<Order>, EngineError> {
        match self.get::<Order>("/api/v1/driver/orders/active").await {
            Ok(order) => Ok(Some(order)),
            Err(EngineError::Api { ref code, .. }) if code == "no_active_order" => Ok(None),
            Err(EngineError::Http(404)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl OrderApi for ApiClient {
    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn fetch_order(&self, order_id: Uuid) -> Result<Order, EngineError> {
        match self.get::<Order>(&format!("/api/v1/orders/{}", order_id)).await {
            Err(EngineError::Http(404)) => Err(EngineError::OrderNotFound(order_id.to_string())),
            other => other,
        }
    }

    #[instrument(skip(self), fields(order_id = %order_id, status = %status))]
    async fn update_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<Order, EngineError> {
        let order: Order = self
            .patch(
                &format!("/api/v1/orders/{}/status", order_id),
                &UpdateStatusRequest {
                    status: status.as_str().to_string(),
                },
            )
            .await?;

        info!("Order {} status pushed: {}", order_id, status);
        Ok(order)
    }

    #[instrument(skip(self, req), fields(order_id = %order_id, minutes = req.minutes))]
    async fn post_waiting_fee(
        &self,
        order_id: Uuid,
        req: WaitingFeeRequest,
    ) -> Result<(), EngineError> {
        let ack: Ack = self
            .post(&format!("/api/v1/orders/{}/waiting-fee", order_id), &req)
            .await?;

        if !ack.success {
            return Err(EngineError::Api {
                code: "waiting_fee_rejected".to_string(),
                message: format!("waiting fee rejected for order {}", order_id),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, req), fields(order_id = %order_id, minutes = req.minutes))]
    async fn post_paid_stop_charge(
        &self,
        order_id: Uuid,
        req: PaidStopChargeRequest,
    ) -> Result<(), EngineError> {
        let ack: Ack = self
            .post(&format!("/api/v1/orders/{}/paid-stops", order_id), &req)
            .await?;

        if !ack.success {
            return Err(EngineError::Api {
                code: "paid_stop_rejected".to_string(),
                message: format!("paid-stop charge rejected for order {}", order_id),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, req), fields(order_id = %order_id, method = %req.method))]
    async fn submit_payment(
        &self,
        order_id: Uuid,
        req: PaymentRequest,
    ) -> Result<Order, EngineError> {
        self.post(&format!("/api/v1/orders/{}/payment", order_id), &req)
            .await
            .map_err(|e| match e {
                e if e.is_retryable() => e,
                EngineError::Api { message, .. } => EngineError::PaymentFailed(message),
                other => other,
            })
    }
}
