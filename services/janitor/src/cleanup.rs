use anyhow::Result;
use laundry::SlotBookingManager;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Removes slots whose date has passed
#[derive(Clone)]
pub struct ExpiryCleaner {
    booking: SlotBookingManager,
}

impl ExpiryCleaner {
    pub fn new(booking: SlotBookingManager) -> Self {
        Self { booking }
    }

    /// One cleanup pass; failures are logged and reported as zero deletions
    pub async fn sweep(&self) -> u64 {
        match self.booking.delete_expired_slots().await {
            Ok(deleted) => {
                info!("Expired slot cleanup removed {} slot(s)", deleted);
                deleted
            }
            Err(e) => {
                error!("Expired slot cleanup failed: {}", e);
                0
            }
        }
    }

    /// Run [`ExpiryCleaner::sweep`] on a six-field cron schedule
    pub async fn start(&self, schedule: &str) -> Result<JobScheduler> {
        let cleaner = self.clone();

        let scheduler = JobScheduler::new().await?;

        let job = Job::new_async(schedule, move |_, _| {
            let cleaner = cleaner.clone();
            Box::pin(async move {
                info!("Expired slot cleanup job executed");
                cleaner.sweep().await;
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;

        info!("Started expired slot cleanup with schedule: {}", schedule);
        Ok(scheduler)
    }
}
