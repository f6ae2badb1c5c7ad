// src/engine/waiting.rs
//! Waiting-time accrual
//!
//! Counts from the server-confirmed arrival timestamp whenever one exists,
//! so the elapsed time survives reconnects and process restarts. A local
//! anchor is only a fallback until the confirmation lands. Pricing (grace
//! period, per-minute rate) lives on the `Tariff`.

use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Local(DateTime<Utc>),
    Server(DateTime<Utc>),
}

#[derive(Debug, Clone, Default)]
pub struct WaitingClock {
    anchor: Option<Anchor>,
}

impl WaitingClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor on local receipt time. Ignored when any anchor already exists:
    /// redundant arrival events must not restart the clock.
    pub fn start_local(&mut self, now: DateTime<Utc>) {
        if self.anchor.is_none() {
            self.anchor = Some(Anchor::Local(now));
        }
    }

    /// Anchor on the server-confirmed arrival timestamp.
    ///
    /// Always replaces a local anchor; replaces an earlier server anchor
    /// only if the timestamp changed (idempotent re-delivery).
    pub fn confirm(&mut self, arrived_at: DateTime<Utc>) {
        match self.anchor {
            Some(Anchor::Server(existing)) if existing == arrived_at => {}
            _ => {
                debug!("Waiting clock anchored to server arrival: {}", arrived_at);
                self.anchor = Some(Anchor::Server(arrived_at));
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn is_server_confirmed(&self) -> bool {
        matches!(self.anchor, Some(Anchor::Server(_)))
    }

    /// Whole seconds waited at `now`. Zero before any anchor, and zero for
    /// an anchor in the future (clock skew between server and device).
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        let anchored_at = match self.anchor {
            Some(Anchor::Local(at)) | Some(Anchor::Server(at)) => at,
            None => return 0,
        };

        (now - anchored_at).num_seconds().max(0) as u64
    }
}
