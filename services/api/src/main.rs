use anyhow::Result;
use std::{env, sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod error;
mod routes;
mod state;

use common::database::{DatabaseConfig, connect_with_retry, health_check, run_migrations};
use laundry::{BookingConfig, PgSlotStore, SlotBookingManager, notifier_from_env};
use tokio::net::TcpListener;

use crate::state::AppState;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting API service");

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env();
    let pool = connect_with_retry(&db_config, 5, Duration::from_secs(2)).await?;

    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    run_migrations(&pool).await?;

    let booking_config = BookingConfig::from_env()?;
    info!(
        "Booking policy: {} slot(s) per student per week, roster {:02}:00-{:02}:00",
        booking_config.max_bookings_per_week, booking_config.first_hour, booking_config.last_hour
    );

    let (booking, notification_worker) = SlotBookingManager::with_worker(
        Arc::new(PgSlotStore::new(pool)),
        notifier_from_env(),
        booking_config,
    );

    // Start the web server
    let app = routes::create_router(AppState { booking });

    let addr = env::var("API_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!("API service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down API service");
        })
        .await?;

    // The router, and with it every sender, is gone; deliver what is queued
    match tokio::time::timeout(NOTIFICATION_DRAIN_TIMEOUT, notification_worker).await {
        Ok(_) => info!("Pending notifications delivered"),
        Err(_) => warn!("Gave up waiting for pending notifications"),
    }

    Ok(())
}
