// src/main.rs
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{error, info, warn};

use ride_driver_engine::api::ApiClient;
use ride_driver_engine::config::Config;
use ride_driver_engine::engine::{EngineSignal, RideEngine};
use ride_driver_engine::models::Tariff;
use ride_driver_engine::realtime::RealtimeClient;
use ride_driver_engine::session::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("🚀 Starting ride driver engine");

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("configuration: {}", e))?;
    info!("Environment: {}", config.environment);

    // Restore the driver session
    let session_store = SessionStore::new(&config.session_file);
    let session = session_store
        .load()
        .await
        .ok_or(ride_driver_engine::EngineError::NotLoggedIn)?;
    info!("✅ Session restored for driver {}", session.driver_id);

    // REST client
    let api = Arc::new(ApiClient::new(
        &config.api_base_url,
        config.http_timeout_ms,
        config.http_max_retries,
        session_store.clone(),
    )?);

    // Fetch the active order
    let order = api
        .fetch_active_order()
        .await?
        .ok_or_else(|| anyhow::anyhow!("no active order assigned to this driver"))?;
    info!("✅ Tracking order {} ({})", order.id, order.status);

    // Realtime gateway client
    let gateway = RealtimeClient::new(config.realtime.clone(), session.token.clone());

    // Ride engine, priced with the server's tariff overrides
    let tariff = Tariff::for_order(&order);
    let (engine, mut snapshots, mut signals) = RideEngine::new(
        order,
        tariff,
        api.clone(),
        gateway,
        Duration::from_secs(config.poll_interval_secs),
    );
    engine.join_driver_room(&session.driver_id).await;
    engine.clone().start().await;
    info!("✅ Ride engine running");

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                info!(
                    status = %snapshot.status,
                    total = %snapshot.fare.total,
                    waiting_seconds = snapshot.waiting_seconds,
                    paid_stop_seconds = snapshot.paid_stop_seconds,
                    "ride snapshot"
                );
            }
            signal = signals.recv() => {
                match signal {
                    Some(EngineSignal::EnterPaymentFlow) => {
                        info!("💳 Entering payment confirmation flow");
                    }
                    Some(EngineSignal::RideCancelled { reason }) => {
                        warn!("Ride cancelled: {}", reason);
                        break;
                    }
                    Some(EngineSignal::RideClosed) => {
                        info!("✅ Payment confirmed, ride closed");
                        break;
                    }
                    Some(EngineSignal::BillingSyncLost { detail }) => {
                        warn!("Billing increment not persisted ({}); server will repair", detail);
                    }
                    Some(EngineSignal::PaymentFailed { detail }) => {
                        error!("Payment submission failed: {}", detail);
                    }
                    Some(EngineSignal::SessionExpired) => {
                        error!("Session expired; clearing stored token");
                        session_store.clear().await.ok();
                        break;
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down on ctrl-c");
                break;
            }
        }
    }

    engine.shutdown().await;
    info!("Ride engine stopped");
    Ok(())
}
