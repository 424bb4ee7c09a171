use anyhow::Result;
use std::{env, sync::Arc, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cleanup;

use cleanup::ExpiryCleaner;
use common::database::{DatabaseConfig, connect_with_retry, run_migrations};
use laundry::{BookingConfig, LogNotifier, PgSlotStore, SlotBookingManager};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting slot cleanup service");

    let cleanup_schedule =
        env::var("CLEANUP_SCHEDULE").unwrap_or_else(|_| "0 0 0 * * *".to_string()); // Daily at midnight

    let db_config = DatabaseConfig::from_env();
    let pool = connect_with_retry(&db_config, 10, Duration::from_secs(3)).await?;
    run_migrations(&pool).await?;

    // Cleanup never books, so confirmations are never sent
    let booking = SlotBookingManager::new(
        Arc::new(PgSlotStore::new(pool)),
        Arc::new(LogNotifier),
        BookingConfig::from_env()?,
    );
    let cleaner = ExpiryCleaner::new(booking);

    cleaner.sweep().await;
    let mut scheduler = cleaner.start(&cleanup_schedule).await?;

    info!("Slot cleanup service started successfully");

    // Keep the service running
    tokio::signal::ctrl_c().await?;
    info!("Shutting down slot cleanup service");
    scheduler.shutdown().await?;

    Ok(())
}
