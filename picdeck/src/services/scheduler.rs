/// Scheduler Service
/// Runs the reconciliation sweep on a schedule using cron expressions
use crate::error::{AppError, Result};
use crate::services::ReconcileService;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Sweep frequency options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepFrequency {
    Minutes(u32),
    Hours(u32),
    Days(u32),
}

impl SweepFrequency {
    /// Convert frequency to cron expression
    pub fn to_cron(self) -> String {
        match self {
            SweepFrequency::Minutes(1) => "0 * * * * *".to_string(),
            SweepFrequency::Minutes(m) => format!("0 */{} * * * *", m),
            SweepFrequency::Hours(1) => "0 0 * * * *".to_string(),
            SweepFrequency::Hours(h) => format!("0 0 */{} * * *", h),
            // Daily sweeps run at 3 AM
            SweepFrequency::Days(1) => "0 0 3 * * *".to_string(),
            SweepFrequency::Days(d) => format!("0 0 3 */{} * *", d),
        }
    }
}

impl FromStr for SweepFrequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // "30m", "6h", "1d" or the named forms
        let s = s.trim().to_lowercase();

        match s.as_str() {
            "hourly" => return Ok(SweepFrequency::Hours(1)),
            "daily" => return Ok(SweepFrequency::Days(1)),
            "weekly" => return Ok(SweepFrequency::Days(7)),
            _ => {}
        }

        let Some(unit) = s.chars().last() else {
            return Err("Empty frequency string".to_string());
        };
        let number_part = &s[..s.len() - unit.len_utf8()];

        let value: u32 = number_part
            .parse()
            .map_err(|_| format!("Invalid number in frequency: {}", s))?;

        if value == 0 {
            return Err("Frequency value must be greater than 0".to_string());
        }

        // Step values past the field's range would silently fire at a
        // different interval, so larger periods must use the next unit
        match unit {
            'm' if value < 60 => Ok(SweepFrequency::Minutes(value)),
            'h' if value < 24 => Ok(SweepFrequency::Hours(value)),
            'd' if value <= 31 => Ok(SweepFrequency::Days(value)),
            'm' | 'h' | 'd' => Err(format!(
                "Frequency {} is out of range. Use 1-59m, 1-23h or 1-31d",
                s
            )),
            _ => Err(format!(
                "Invalid frequency unit '{}'. Use 'm' (minutes), 'h' (hours), or 'd' (days)",
                unit
            )),
        }
    }
}

/// Scheduler service for the reconciliation sweep
pub struct SchedulerService {
    scheduler: Arc<RwLock<JobScheduler>>,
    reconciler: Arc<ReconcileService>,
    current_job_id: Arc<RwLock<Option<Uuid>>>,
}

impl SchedulerService {
    /// Create new scheduler service
    pub async fn new(reconciler: ReconcileService) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            reconciler: Arc::new(reconciler),
            current_job_id: Arc::new(RwLock::new(None)),
        })
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<()> {
        let scheduler = self.scheduler.read().await;
        scheduler
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {}", e)))?;
        tracing::info!("Sweep scheduler started");
        Ok(())
    }

    /// Schedule the reconciliation sweep, replacing any previous schedule
    pub async fn schedule_sweep(&self, frequency: SweepFrequency, enabled: bool) -> Result<()> {
        self.cancel_sweep().await?;

        if !enabled {
            tracing::info!("Reconciliation sweep disabled");
            return Ok(());
        }

        let cron_expr = frequency.to_cron();
        let reconciler = Arc::clone(&self.reconciler);

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _l| {
            let reconciler = Arc::clone(&reconciler);
            Box::pin(async move {
                tracing::info!("Running scheduled reconciliation sweep");
                if let Err(e) = reconciler.sweep().await {
                    tracing::error!("Scheduled reconciliation sweep failed: {}", e);
                }
            })
        })
        .map_err(|e| AppError::Scheduler(format!("Failed to create sweep job: {}", e)))?;

        let job_id = job.guid();

        let scheduler = self.scheduler.write().await;
        scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to schedule job: {}", e)))?;

        let mut current_job = self.current_job_id.write().await;
        *current_job = Some(job_id);

        tracing::info!("Reconciliation sweep scheduled: {:?} ({})", frequency, cron_expr);
        Ok(())
    }

    /// Cancel the scheduled sweep
    pub async fn cancel_sweep(&self) -> Result<()> {
        let mut current_job = self.current_job_id.write().await;

        if let Some(job_id) = *current_job {
            let scheduler = self.scheduler.write().await;
            scheduler
                .remove(&job_id)
                .await
                .map_err(|e| AppError::Scheduler(format!("Failed to remove job: {}", e)))?;

            *current_job = None;
            tracing::info!("Reconciliation sweep schedule cancelled");
        }

        Ok(())
    }

    /// Whether a sweep job is currently registered
    pub async fn is_scheduled(&self) -> bool {
        self.current_job_id.read().await.is_some()
    }

    /// Shutdown scheduler gracefully
    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.write().await;
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to shutdown scheduler: {}", e)))?;
        tracing::info!("Sweep scheduler shutdown");
        Ok(())
    }
}
