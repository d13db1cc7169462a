//! Cron-driven expiry sweep using tokio-cron-scheduler.
//!
//! Actors already discard expired state when they touch it. The sweep removes
//! states for keys nobody touches again.

use std::sync::Arc;

use folio_core::ports::{Clock, CounterStorage};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Enable the sweep.
    pub enabled: bool,
    /// Cron schedule, seconds field first.
    pub schedule: String,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: "0 */5 * * * *".to_string(),
        }
    }
}

impl SweeperConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("SWEEPER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            schedule: std::env::var("SWEEP_CRON").unwrap_or_else(|_| "0 */5 * * * *".to_string()),
        }
    }
}

/// Drop every expired state once. Failures are logged and retried next run.
pub async fn sweep_once(storage: &dyn CounterStorage, now: i64) -> usize {
    match storage.purge_expired(now).await {
        Ok(0) => 0,
        Ok(purged) => {
            tracing::debug!(purged, "Expired counter states purged");
            purged
        }
        Err(e) => {
            tracing::error!(error = %e, "Expiry sweep failed");
            0
        }
    }
}

/// Periodic sweep of expired counter states.
pub struct ExpirySweeper {
    inner: JobScheduler,
    config: SweeperConfig,
}

impl ExpirySweeper {
    /// Create a new sweeper.
    pub async fn new(config: SweeperConfig) -> Result<Self, JobSchedulerError> {
        let inner = JobScheduler::new().await?;
        Ok(Self { inner, config })
    }

    /// Register the sweep job against `storage`.
    pub async fn register(
        &self,
        storage: Arc<dyn CounterStorage>,
        clock: Arc<dyn Clock>,
    ) -> Result<(), JobSchedulerError> {
        let schedule = self.config.schedule.as_str();
        let job = Job::new_async(schedule, move |_uuid, _lock| {
            let storage = storage.clone();
            let clock = clock.clone();
            Box::pin(async move {
                sweep_once(storage.as_ref(), clock.now()).await;
            })
        })?;

        let id = self.inner.add(job).await?;
        tracing::info!(schedule = %schedule, job_id = %id, "Expiry sweep registered");
        Ok(())
    }

    /// Start the sweeper.
    pub async fn start(&self) -> Result<(), JobSchedulerError> {
        if !self.config.enabled {
            tracing::info!("Expiry sweeper disabled");
            return Ok(());
        }

        self.inner.start().await?;
        tracing::info!("Expiry sweeper started");
        Ok(())
    }

    /// Stop the sweeper.
    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        self.inner.shutdown().await?;
        tracing::info!("Expiry sweeper stopped");
        Ok(())
    }
}
