// src/realtime/event.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Application event names on the gateway, as published by the backend.
pub mod names {
    pub const RIDE_STATUS_UPDATE: &str = "ride:status:update";
    pub const RIDE_CANCELLED: &str = "ride:cancelled";
    pub const RIDE_ARRIVAL_CONFIRMED: &str = "ride:arrival:confirmed";
    pub const PAID_STOP_STARTED: &str = "paid:stop:started";
    pub const PAID_STOP_ENDED: &str = "paid:stop:ended";
    pub const LOCATION_DRIVER_UPDATE: &str = "location:driver:update";
}

/// A gateway application event: a name plus an untyped JSON payload.
///
/// Payload shapes vary by event and backend version, so access goes
/// through tolerant helpers that try the known key spellings instead of
/// rigid DTOs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl GatewayEvent {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.event == name
    }

    fn str_field(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.data.get(k).and_then(Value::as_str))
    }

    pub fn order_id(&self) -> Option<Uuid> {
        self.str_field(&["order_id", "orderId", "id"])
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Raw server status string, unmapped.
    pub fn raw_status(&self) -> Option<&str> {
        self.str_field(&["status", "order_status"])
    }

    pub fn reason(&self) -> Option<&str> {
        self.str_field(&["reason", "cancel_reason"])
    }

    /// Server-confirmed arrival timestamp.
    pub fn arrived_at(&self) -> Option<DateTime<Utc>> {
        self.str_field(&["arrived_at", "arrivedAt", "timestamp"])
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn total_seconds(&self) -> Option<u64> {
        self.data
            .get("total_seconds")
            .and_then(Value::as_u64)
            .or_else(|| self.data.get("totalSeconds").and_then(Value::as_u64))
    }

    // ---- outbound constructors (driver -> counterpart) ----

    pub fn status_update(order_id: Uuid, status: &str) -> Self {
        Self::new(
            names::RIDE_STATUS_UPDATE,
            json!({ "order_id": order_id.to_string(), "status": status }),
        )
    }

    pub fn paid_stop_started(order_id: Uuid, at: DateTime<Utc>) -> Self {
        Self::new(
            names::PAID_STOP_STARTED,
            json!({ "order_id": order_id.to_string(), "started_at": at.to_rfc3339() }),
        )
    }

    pub fn paid_stop_ended(order_id: Uuid, minutes_delta: u64, total_seconds: u64) -> Self {
        Self::new(
            names::PAID_STOP_ENDED,
            json!({
                "order_id": order_id.to_string(),
                "minutes": minutes_delta,
                "total_seconds": total_seconds,
            }),
        )
    }

    pub fn location_update(order_id: Uuid, latitude: f64, longitude: f64) -> Self {
        Self::new(
            names::LOCATION_DRIVER_UPDATE,
            json!({
                "order_id": order_id.to_string(),
                "latitude": latitude,
                "longitude": longitude,
            }),
        )
    }
}
