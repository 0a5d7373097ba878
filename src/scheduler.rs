use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{sleep, Duration};

use crate::batch::BatchPipeline;
use crate::config::{cleanup_old_files, Config};
use crate::coordinator::PublishCoordinator;
use crate::errors::{AppError, AppResult};

/// A cron-timed job checked by the poll loop.
#[derive(Debug)]
pub struct CronTask {
    name: &'static str,
    schedule: cron::Schedule,
    next_run: Option<DateTime<Local>>,
}

impl CronTask {
    pub fn new(name: &'static str, expression: &str, now: DateTime<Local>) -> AppResult<Self> {
        let schedule = cron::Schedule::from_str(expression).map_err(|e| {
            AppError::Config(format!(
                "Invalid cron expression '{}' for {}: {}",
                expression, name, e
            ))
        })?;
        let next_run = schedule.after(&now).next();

        Ok(Self {
            name,
            schedule,
            next_run,
        })
    }

    pub fn next_run(&self) -> Option<DateTime<Local>> {
        self.next_run
    }

    /// True when the task is due at `now`; the next occurrence is then
    /// computed from `now`, so missed firings collapse into one.
    pub fn poll(&mut self, now: DateTime<Local>) -> bool {
        match self.next_run {
            Some(next) if next <= now => {
                self.next_run = self.schedule.after(&now).next();
                log::debug!("{} fired, next run at {:?}", self.name, self.next_run);
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub replenish_threshold: usize,
    pub replenish_batch_size: u32,
    pub logs_dir: PathBuf,
    pub log_retention_days: u32,
}

impl From<&Config> for SchedulerSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            replenish_threshold: config.replenish_threshold,
            replenish_batch_size: config.replenish_batch_size,
            logs_dir: config.logs_dir.clone(),
            log_retention_days: config.log_retention_days,
        }
    }
}

/// Long-lived driver: publish hourly, replenish daily, both once at startup.
pub struct Scheduler {
    coordinator: PublishCoordinator,
    batch: BatchPipeline,
    publish_task: CronTask,
    replenish_task: CronTask,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        coordinator: PublishCoordinator,
        batch: BatchPipeline,
        now: DateTime<Local>,
    ) -> AppResult<Self> {
        Ok(Self {
            coordinator,
            batch,
            publish_task: CronTask::new("publish", &config.publish_cron, now)?,
            replenish_task: CronTask::new("replenish", &config.replenish_cron, now)?,
            settings: SchedulerSettings::from(config),
        })
    }

    /// Runs until `shutdown` is notified. A task in flight is never
    /// interrupted; shutdown is observed during the poll sleep.
    pub async fn run(&mut self, shutdown: Arc<Notify>) -> AppResult<()> {
        log::info!("Starting scheduler");

        let now = Local::now();
        self.check_and_publish(now).await;
        self.check_and_replenish(now).await;

        log::info!(
            "Scheduler started, next publish check {:?}, next replenish check {:?}",
            self.publish_task.next_run(),
            self.replenish_task.next_run()
        );
        log::info!("Press Ctrl+C to stop");

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    log::info!("Stopping scheduler");
                    return Ok(());
                }
                _ = sleep(self.settings.poll_interval) => {}
            }

            self.tick(Local::now()).await;
        }
    }

    /// Dispatch whichever timers are due at `now`.
    pub async fn tick(&mut self, now: DateTime<Local>) {
        if self.publish_task.poll(now) {
            self.check_and_publish(now).await;
        }
        if self.replenish_task.poll(now) {
            self.check_and_replenish(now).await;
        }
    }

    async fn check_and_publish(&self, now: DateTime<Local>) {
        log::info!("Checking for videos to publish");
        match self.coordinator.run_once(now.naive_local()).await {
            Ok(report) if report.due > 0 => log::info!(
                "Publish pass: {} due, {} published, {} failed, {} skipped",
                report.due,
                report.published,
                report.failed,
                report.skipped
            ),
            Ok(_) => {}
            Err(e) => log::error!("Publish pass failed: {}", e),
        }
    }

    async fn check_and_replenish(&self, now: DateTime<Local>) {
        log::info!("Checking whether a new batch is needed");
        let result = self
            .batch
            .replenish_if_needed(
                self.settings.replenish_threshold,
                self.settings.replenish_batch_size,
                now.date_naive(),
            )
            .await;

        match result {
            Ok(Some(report)) => log::info!(
                "Replenished schedule with {} videos ({} failed)",
                report.scheduled.len(),
                report.failed
            ),
            Ok(None) => log::info!("Enough videos scheduled, no batch needed"),
            Err(e) => log::error!("Replenishment failed: {}", e),
        }

        match cleanup_old_files(&self.settings.logs_dir, self.settings.log_retention_days) {
            Ok(0) => {}
            Ok(removed) => log::info!("Removed {} old log files", removed),
            Err(e) => log::warn!("Log cleanup failed: {}", e),
        }
    }
}
