//! Investment Lifecycle Manager
//!
//! Opening an investment journals the deposit and pays DRI and SmartLine in
//! one unit of work. FS investments then accrue a fixed daily return until
//! their lifetime cap is paid out.
//!
//! Daily job idempotency:
//!   - each investment carries `last_accrued_on`, written in the same
//!     transaction as its credit
//!   - a finished run leaves a `fs_accrual:{day}` marker in the jobs tree

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::amount::{self, apply_ppm, format_usd, validate_amount, Amount};
use crate::config::RewardSchedule;
use crate::das::DasTracker;
use crate::error::{CoreError, CoreResult};
use crate::ledger::{self, signed};
use crate::metrics::Metrics;
use crate::models::{EntryType, Investment, InvestmentStatus, LedgerEntry, PackageType, UserField};
use crate::rewards::{self, RewardCredit, RewardEngine};
use crate::store::{abort, Store, TxResult, UnitOfWork};

pub const FS_ACCRUAL_JOB: &str = "fs_accrual";
pub const FS_RESET_JOB: &str = "fs_reset";

pub fn job_key(job: &str, day: NaiveDate) -> String {
    format!("{}:{}", job, day.format("%Y-%m-%d"))
}

/// Marker left by a finished daily job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub job: String,
    pub day: NaiveDate,
    pub processed: usize,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentReceipt {
    pub investment: Investment,
    pub rewards: Vec<RewardCredit>,
    /// DAS tiers completed by the follow-up milestone check
    pub das_completed: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualCredit {
    pub investment_id: String,
    pub user_id: String,
    #[serde(with = "amount::as_usd")]
    pub credit: Amount,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualReport {
    pub day: NaiveDate,
    pub already_ran: bool,
    pub credited: usize,
    #[serde(with = "amount::as_usd")]
    pub total_credited: Amount,
    pub completed: usize,
    pub skipped: usize,
    pub failures: usize,
}

impl AccrualReport {
    fn empty(day: NaiveDate, already_ran: bool) -> Self {
        Self {
            day,
            already_ran,
            credited: 0,
            total_credited: 0,
            completed: 0,
            skipped: 0,
            failures: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetReport {
    pub day: NaiveDate,
    pub already_ran: bool,
    pub users_reset: usize,
    pub failures: usize,
}

pub struct InvestmentManager {
    store: Store,
    schedule: Arc<RewardSchedule>,
    rewards: RewardEngine,
    das: Arc<DasTracker>,
    metrics: Arc<Metrics>,
}

impl InvestmentManager {
    pub fn new(
        store: Store,
        schedule: Arc<RewardSchedule>,
        das: Arc<DasTracker>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            rewards: RewardEngine::new(schedule.clone()),
            store,
            schedule,
            das,
            metrics,
        }
    }

    pub fn create_investment(
        &self,
        user_id: &str,
        amount: Amount,
        package_type: PackageType,
    ) -> CoreResult<InvestmentReceipt> {
        validate_amount(amount)?;
        let now = Utc::now();
        let (investment, credits) = self
            .store
            .atomically(|uow| self.open_in(uow, user_id, amount, package_type, None, now))?;
        Ok(self.after_commit(investment, credits))
    }

    /// Create the investment, journal the deposit and pay DRI and SmartLine
    /// inside `uow`
    pub fn open_in(
        &self,
        uow: &UnitOfWork<'_>,
        user_id: &str,
        amount: Amount,
        package_type: PackageType,
        deposit_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> TxResult<(Investment, Vec<RewardCredit>)> {
        if let Err(e) = validate_amount(amount) {
            return abort(e);
        }
        uow.require_user(user_id)?;
        let Some(unlock_date) = now.checked_add_months(Months::new(self.schedule.lock_months)) else {
            return abort(CoreError::Invariant("unlock date out of range".into()));
        };

        let investment = Investment {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount,
            package_type,
            unlock_date,
            remaining_returns: self.schedule.return_cap(amount),
            total_returns: 0,
            status: InvestmentStatus::Active,
            last_accrued_on: None,
            deposit_id: deposit_id.map(str::to_string),
            created_at: now,
            completed_at: None,
        };
        uow.put_investment(&investment)?;

        let delta = signed(amount)?;
        uow.increment_user_fields(
            user_id,
            &[
                (UserField::TotalInvestmentAmount, delta),
                (UserField::TotalInvestmentVolume, delta),
            ],
        )?;
        let entry = LedgerEntry::new(
            user_id,
            EntryType::Deposit,
            amount,
            format!("{} investment", package_type.as_str()),
        )
        .for_investment(&investment.id);
        ledger::record(uow, &entry)?;

        let credits = self
            .rewards
            .distribute_all(uow, user_id, amount, Some(&investment.id))?;
        Ok((investment, credits))
    }

    /// Metrics, logging and the DAS milestone check for a committed
    /// investment. A failed check is logged; the investment stands.
    pub fn after_commit(&self, investment: Investment, credits: Vec<RewardCredit>) -> InvestmentReceipt {
        self.metrics.investments_created.inc();
        rewards::record_credits(&self.metrics, &credits);
        info!(
            "[INVESTMENT] {} opened {} {} ({} reward credits)",
            investment.user_id,
            investment.package_type.as_str(),
            format_usd(investment.amount),
            credits.len()
        );

        let enrolled = matches!(
            self.store.find_user_by_id(&investment.user_id),
            Ok(Some(u)) if u.das.is_enrolled
        );
        let das_completed = if enrolled {
            match self.das.check_and_update_all_tasks(&investment.user_id) {
                Ok(tiers) => tiers,
                Err(e) => {
                    warn!(
                        "[DAS] milestone check after investment {} failed: {}",
                        investment.id, e
                    );
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        InvestmentReceipt {
            investment,
            rewards: credits,
            das_completed,
        }
    }

    pub fn accrual_done(&self, day: NaiveDate) -> CoreResult<bool> {
        Ok(self
            .store
            .job_marker::<JobRun>(&job_key(FS_ACCRUAL_JOB, day))?
            .is_some())
    }

    pub fn reset_done(&self, day: NaiveDate) -> CoreResult<bool> {
        Ok(self
            .store
            .job_marker::<JobRun>(&job_key(FS_RESET_JOB, day))?
            .is_some())
    }

    /// Credit one day of FS return to every eligible investment. Each
    /// investment commits on its own; failures are counted and skipped, and
    /// the day's marker is only written once nothing failed.
    pub fn accrue_daily_fs(&self, day: NaiveDate) -> CoreResult<AccrualReport> {
        if self.accrual_done(day)? {
            debug!("[FS_ACCRUAL] {} already ran", day);
            return Ok(AccrualReport::empty(day, true));
        }
        self.metrics.accrual_runs.inc();

        let candidates = self
            .store
            .find_active_investments(|i| i.accrues_fs() && !i.already_accrued_for(day))?;
        let mut report = AccrualReport::empty(day, false);
        let now = Utc::now();

        for investment in candidates {
            match self.accrue_one(&investment.id, day, now) {
                Ok(Some(credit)) => {
                    report.credited += 1;
                    report.total_credited += credit.credit;
                    if credit.completed {
                        report.completed += 1;
                    }
                    self.metrics.record_reward("fs", credit.credit);
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failures += 1;
                    self.metrics.accrual_failures.inc();
                    warn!("[FS_ACCRUAL] investment {} failed: {}", investment.id, e);
                }
            }
        }

        if report.failures == 0 {
            let marker = JobRun {
                job: FS_ACCRUAL_JOB.to_string(),
                day,
                processed: report.credited,
                finished_at: Utc::now(),
            };
            let key = job_key(FS_ACCRUAL_JOB, day);
            self.store.atomically(|uow| uow.set_job_marker(&key, &marker))?;
        }

        info!(
            "[FS_ACCRUAL] {}: credited={} total={} completed={} skipped={} failures={}",
            day,
            report.credited,
            format_usd(report.total_credited),
            report.completed,
            report.skipped,
            report.failures
        );
        Ok(report)
    }

    /// One investment, one transaction. `None` when it is no longer eligible
    /// or already accrued for `day`.
    pub fn accrue_one(
        &self,
        investment_id: &str,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<AccrualCredit>> {
        self.store.atomically(|uow| {
            let Some(mut investment) = uow.investment(investment_id)? else {
                return abort(CoreError::InvestmentNotFound(investment_id.to_string()));
            };
            if !investment.accrues_fs() || investment.already_accrued_for(day) {
                return Ok(None);
            }

            let daily = apply_ppm(investment.amount, self.schedule.fs_daily_rate_ppm);
            let credit = daily.min(investment.remaining_returns);
            investment.remaining_returns -= credit;
            investment.total_returns += credit;
            investment.last_accrued_on = Some(day);
            let completed = investment.remaining_returns == 0;
            if completed {
                investment.status = InvestmentStatus::Completed;
                investment.completed_at = Some(now);
            }
            uow.put_investment(&investment)?;

            if credit > 0 {
                let entry = LedgerEntry::new(
                    &investment.user_id,
                    EntryType::FsIncome,
                    credit,
                    format!("FS daily return for {}", day),
                )
                .for_investment(&investment.id);
                ledger::credit(
                    uow,
                    &entry,
                    &[UserField::FsIncome, UserField::WalletBalance, UserField::DailyFsIncome],
                )?;
            }

            Ok(Some(AccrualCredit {
                investment_id: investment.id.clone(),
                user_id: investment.user_id.clone(),
                credit,
                completed,
            }))
        })
    }

    /// Zero every user's `dailyFsIncome` once for `day`
    pub fn reset_daily_counter(&self, day: NaiveDate) -> CoreResult<ResetReport> {
        if self.reset_done(day)? {
            debug!("[FS_ACCRUAL] reset for {} already ran", day);
            return Ok(ResetReport {
                day,
                already_ran: true,
                users_reset: 0,
                failures: 0,
            });
        }

        let mut report = ResetReport {
            day,
            already_ran: false,
            users_reset: 0,
            failures: 0,
        };
        for id in self.store.user_ids()? {
            let reset = self.store.atomically(|uow| {
                let user = uow.require_user(&id)?;
                if user.daily_fs_income == 0 {
                    return Ok(false);
                }
                let delta = signed(user.daily_fs_income)?;
                uow.increment_user_fields(&id, &[(UserField::DailyFsIncome, -delta)])?;
                Ok(true)
            });
            match reset {
                Ok(true) => report.users_reset += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failures += 1;
                    warn!("[FS_ACCRUAL] daily counter reset for {} failed: {}", id, e);
                }
            }
        }

        if report.failures == 0 {
            let marker = JobRun {
                job: FS_RESET_JOB.to_string(),
                day,
                processed: report.users_reset,
                finished_at: Utc::now(),
            };
            let key = job_key(FS_RESET_JOB, day);
            self.store.atomically(|uow| uow.set_job_marker(&key, &marker))?;
        }
        info!(
            "[FS_ACCRUAL] reset daily counters for {}: users={} failures={}",
            day, report.users_reset, report.failures
        );
        Ok(report)
    }

    /// `active -> cancelled` for an investment with no accrual yet. Balances
    /// and paid commissions are left as they are.
    pub fn cancel_investment(&self, investment_id: &str) -> CoreResult<Investment> {
        let investment = self.store.atomically(|uow| {
            let Some(mut investment) = uow.investment(investment_id)? else {
                return abort(CoreError::InvestmentNotFound(investment_id.to_string()));
            };
            if investment.status != InvestmentStatus::Active
                || investment.last_accrued_on.is_some()
                || investment.total_returns > 0
            {
                return abort(CoreError::NotCancellable(investment_id.to_string()));
            }
            investment.status = InvestmentStatus::Cancelled;
            uow.put_investment(&investment)?;
            Ok(investment)
        })?;
        info!("[INVESTMENT] {} cancelled", investment.id);
        Ok(investment)
    }

    pub fn investment(&self, investment_id: &str) -> CoreResult<Investment> {
        self.store
            .find_investment(investment_id)?
            .ok_or_else(|| CoreError::InvestmentNotFound(investment_id.to_string()))
    }

    pub fn investments_for(&self, user_id: &str) -> CoreResult<Vec<Investment>> {
        self.store.require_user(user_id)?;
        self.store.investments_for_user(user_id)
    }
}
