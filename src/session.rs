// src/session.rs
//! Driver session persistence
//!
//! The backend authenticates with a session cookie. The token must survive
//! process restarts on the device, so it is persisted as a small JSON file
//! next to the engine. A missing or corrupt file is a logged-out state,
//! never an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSession {
    pub driver_id: Uuid,
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionStore {
    path: PathBuf,
    current: Arc<RwLock<Option<DriverSession>>>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Load the persisted session, if any.
    pub async fn load(&self) -> Option<DriverSession> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(_) => {
                debug!("No session file at {}", self.path.display());
                return None;
            }
        };

        match serde_json::from_slice::<DriverSession>(&data) {
            Ok(session) => {
                let mut current = self.current.write().await;
                *current = Some(session.clone());
                Some(session)
            }
            Err(e) => {
                warn!("Discarding corrupt session file: {}", e);
                None
            }
        }
    }

    pub async fn session(&self) -> Option<DriverSession> {
        self.current.read().await.clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.current.read().await.as_ref().map(|s| s.token.clone())
    }

    /// Store and persist a fresh session.
    pub async fn set(&self, session: DriverSession) -> Result<(), EngineError> {
        let data = serde_json::to_vec_pretty(&session)?;
        tokio::fs::write(&self.path, data)
            .await
            .map_err(|e| EngineError::SessionStore(e.to_string()))?;

        let mut current = self.current.write().await;
        *current = Some(session);
        Ok(())
    }

    /// Drop the session, e.g. after a 401 from the API.
    pub async fn clear(&self) -> Result<(), EngineError> {
        let mut current = self.current.write().await;
        *current = None;
        drop(current);

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::SessionStore(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_session_path() -> PathBuf {
        std::env::temp_dir().join(format!("driver-session-{}.json", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_set_load_clear_roundtrip() {
        let path = temp_session_path();
        let store = SessionStore::new(&path);

        assert!(store.load().await.is_none());

        let session = DriverSession {
            driver_id: Uuid::new_v4(),
            token: "abc123".to_string(),
            issued_at: Utc::now(),
        };
        store.set(session.clone()).await.unwrap();

        let reloaded_store = SessionStore::new(&path);
        let reloaded = reloaded_store.load().await.unwrap();
        assert_eq!(reloaded.token, session.token);
        assert_eq!(reloaded.driver_id, session.driver_id);

        store.clear().await.unwrap();
        assert!(store.session().await.is_none());
        assert!(SessionStore::new(&path).load().await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_logged_out() {
        let path = temp_session_path();
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = SessionStore::new(&path);
        assert!(store.load().await.is_none());

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_clear_without_file_is_ok() {
        let store = SessionStore::new(temp_session_path());
        assert!(store.clear().await.is_ok());
    }
}
