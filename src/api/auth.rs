// src/api/auth.rs
//! Driver authentication endpoints

use chrono::Utc;
use tracing::{info, instrument};

use super::client::ApiClient;
use super::types::{LoginRequest, LoginResponse, SessionProbe};
use crate::error::EngineError;
use crate::session::DriverSession;

impl ApiClient {
    /// Authenticate the driver and persist the returned session token.
    #[instrument(skip(self, password), fields(phone = %phone))]
    pub async fn login(&self, phone: &str, password: &str) -> Result<DriverSession, EngineError> {
        let response: LoginResponse = self
            .post(
                "/api/v1/driver/login",
                &LoginRequest {
                    phone: phone.to_string(),
                    password: password.to_string(),
                },
            )
            .await?;

        let session = DriverSession {
            driver_id: response.driver_id,
            token: response.token,
            issued_at: Utc::now(),
        };
        self.session().set(session.clone()).await?;

        info!("Driver {} logged in", session.driver_id);
        Ok(session)
    }

    /// Probe whether the persisted session is still accepted by the backend.
    #[instrument(skip(self))]
    pub async fn probe_session(&self) -> Result<bool, EngineError> {
        match self.get::<SessionProbe>("/api/v1/driver/session").await {
            Ok(probe) => Ok(probe.valid),
            Err(EngineError::Unauthorized) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
