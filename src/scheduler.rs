//! Daily jobs: FS accrual followed by the daily counter reset.
//!
//! Runs are serialized by an in-process lock; repeated runs for a day are
//! no-ops thanks to the per-investment stamps and per-day markers.

use chrono::{NaiveDate, Timelike, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};
use crate::investment::{AccrualReport, InvestmentManager, ResetReport};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRunReport {
    pub day: NaiveDate,
    pub accrual: AccrualReport,
    pub reset: ResetReport,
}

pub struct DailyJobs {
    investments: Arc<InvestmentManager>,
    lock: Mutex<()>,
    last_accrual: RwLock<Option<AccrualReport>>,
    last_reset: RwLock<Option<ResetReport>>,
}

impl DailyJobs {
    pub fn new(investments: Arc<InvestmentManager>) -> Self {
        Self {
            investments,
            lock: Mutex::new(()),
            last_accrual: RwLock::new(None),
            last_reset: RwLock::new(None),
        }
    }

    /// Latest completed accrual + reset pair for the same day
    pub fn last_run(&self) -> Option<DailyRunReport> {
        let accrual = self.last_accrual.read().clone()?;
        let reset = self.last_reset.read().clone()?;
        (accrual.day == reset.day).then(|| DailyRunReport {
            day: accrual.day,
            accrual,
            reset,
        })
    }

    async fn accrue(&self, day: NaiveDate) -> CoreResult<AccrualReport> {
        let investments = self.investments.clone();
        let report = tokio::task::spawn_blocking(move || investments.accrue_daily_fs(day))
            .await
            .map_err(|e| CoreError::Invariant(format!("accrual task aborted: {}", e)))??;
        if !report.already_ran {
            *self.last_accrual.write() = Some(report.clone());
        }
        Ok(report)
    }

    async fn reset(&self, day: NaiveDate) -> CoreResult<ResetReport> {
        let investments = self.investments.clone();
        let report = tokio::task::spawn_blocking(move || investments.reset_daily_counter(day))
            .await
            .map_err(|e| CoreError::Invariant(format!("reset task aborted: {}", e)))??;
        if !report.already_ran {
            *self.last_reset.write() = Some(report.clone());
        }
        Ok(report)
    }

    /// Accrual, then reset, for `day`. Used by the admin trigger and the CLI.
    pub async fn run_day(&self, day: NaiveDate) -> CoreResult<DailyRunReport> {
        let _guard = self.lock.lock().await;
        info!("[SCHEDULER] daily run for {}", day);
        let accrual = self.accrue(day).await?;
        let reset = self.reset(day).await?;
        Ok(DailyRunReport { day, accrual, reset })
    }

    /// One scheduler tick: run whatever is due for the current UTC hour
    pub async fn tick(&self, accrual_hour: u32, reset_hour: u32) -> CoreResult<()> {
        let now = Utc::now();
        let day = now.date_naive();
        let hour = now.hour();
        let _guard = self.lock.lock().await;

        if hour >= accrual_hour && !self.investments.accrual_done(day)? {
            let accrual = self.accrue(day).await?;
            debug!("[SCHEDULER] accrual for {} credited {}", day, accrual.credited);
        }
        // the reset waits for the day's accrual to finish
        if hour >= reset_hour && self.investments.accrual_done(day)? && !self.investments.reset_done(day)? {
            let reset = self.reset(day).await?;
            debug!("[SCHEDULER] reset for {} touched {} users", day, reset.users_reset);
        }
        Ok(())
    }
}

/// Spawn the wall-clock scheduler loop
pub fn start_daily_scheduler(jobs: Arc<DailyJobs>, accrual_hour: u32, reset_hour: u32, tick_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "[SCHEDULER] started (accrual {:02}:00 UTC, reset {:02}:00 UTC, tick {}s)",
            accrual_hour, reset_hour, tick_secs
        );
        let mut interval = time::interval(Duration::from_secs(tick_secs.max(1)));
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = jobs.tick(accrual_hour, reset_hour).await {
                warn!("[SCHEDULER] tick failed: {}", e);
            }
        }
    })
}
