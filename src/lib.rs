// src/lib.rs
//! Driver ride engine
//!
//! Headless core of the driver client: tracks the active ride's state
//! across the realtime gateway, the REST API and local driver intents,
//! accrues the live fare (waiting time, paid stops, day/night kilometer
//! rates, service fee) and exposes a derived snapshot plus one-shot
//! signals for the embedding UI.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod realtime;
pub mod session;

pub use config::Config;
pub use engine::{EngineSignal, RideEngine, RideSnapshot};
pub use error::EngineError;

use once_cell::sync::Lazy;

/// Device identity sent with REST requests and the gateway hello.
pub(crate) fn client_host() -> &'static str {
    static CLIENT_HOST: Lazy<String> = Lazy::new(|| {
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "driver-device".to_string())
    });
    &CLIENT_HOST
}
