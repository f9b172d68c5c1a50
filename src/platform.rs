//! Composition root: wires the store, reward schedule, notifier and metrics
//! into the engine components and exposes the public operations.

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::amount::Amount;
use crate::config::RewardSchedule;
use crate::das::{DasCountdown, DasTracker, EnrollOutcome};
use crate::deposit::DepositDesk;
use crate::error::CoreResult;
use crate::investment::{InvestmentManager, InvestmentReceipt};
use crate::metrics::Metrics;
use crate::models::{AdminDecision, PackageType, Profile, User, Withdrawal};
use crate::notify::Notifier;
use crate::referral::ReferralTree;
use crate::scheduler::DailyJobs;
use crate::store::Store;
use crate::withdrawal::WithdrawalWorkflow;

#[derive(Debug, Clone)]
pub struct PlatformOptions {
    pub schedule: RewardSchedule,
    pub sponsor_id_max_attempts: u32,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            schedule: RewardSchedule::canonical(),
            sponsor_id_max_attempts: 20,
        }
    }
}

pub struct Platform {
    pub store: Store,
    pub schedule: Arc<RewardSchedule>,
    pub metrics: Arc<Metrics>,
    pub notifier: Arc<dyn Notifier>,
    pub referrals: ReferralTree,
    pub das: Arc<DasTracker>,
    pub investments: Arc<InvestmentManager>,
    pub withdrawals: WithdrawalWorkflow,
    pub deposits: DepositDesk,
    pub jobs: Arc<DailyJobs>,
}

impl Platform {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>, options: PlatformOptions) -> Result<Self> {
        options
            .schedule
            .validate()
            .map_err(|e| anyhow!("invalid reward schedule: {}", e))?;
        let schedule = Arc::new(options.schedule);
        let metrics = Arc::new(Metrics::new()?);

        let referrals = ReferralTree::new(
            store.clone(),
            notifier.clone(),
            metrics.clone(),
            options.sponsor_id_max_attempts,
        );
        let das = Arc::new(DasTracker::new(store.clone(), schedule.clone(), metrics.clone()));
        let investments = Arc::new(InvestmentManager::new(
            store.clone(),
            schedule.clone(),
            das.clone(),
            metrics.clone(),
        ));
        let withdrawals = WithdrawalWorkflow::new(
            store.clone(),
            schedule.clone(),
            notifier.clone(),
            metrics.clone(),
        );
        let deposits = DepositDesk::new(
            store.clone(),
            investments.clone(),
            notifier.clone(),
            metrics.clone(),
        );
        let jobs = Arc::new(DailyJobs::new(investments.clone()));

        tracing::info!(
            "[PLATFORM] ready (schedule v{}, notifier {}, {} users)",
            schedule.version,
            notifier.name(),
            store.user_count()
        );
        Ok(Self {
            store,
            schedule,
            metrics,
            notifier,
            referrals,
            das,
            investments,
            withdrawals,
            deposits,
            jobs,
        })
    }

    pub async fn register_user(&self, sponsor_id: &str, profile: &Profile) -> CoreResult<User> {
        self.referrals.register_user(sponsor_id, profile).await
    }

    pub fn create_investment(
        &self,
        user_id: &str,
        amount: Amount,
        package_type: PackageType,
    ) -> CoreResult<InvestmentReceipt> {
        self.investments
            .create_investment(user_id, amount, package_type)
    }

    pub async fn request_withdrawal(
        &self,
        user_id: &str,
        amount: Amount,
        method: &str,
        wallet_address: &str,
    ) -> CoreResult<Withdrawal> {
        self.withdrawals
            .request_withdrawal(user_id, amount, method, wallet_address)
            .await
    }

    pub fn verify_withdrawal_otp(&self, withdrawal_id: &str, code: &str) -> CoreResult<Withdrawal> {
        self.withdrawals.verify_otp(withdrawal_id, code)
    }

    pub async fn admin_act_on_withdrawal(
        &self,
        withdrawal_id: &str,
        decision: AdminDecision,
        notes: &str,
        admin_id: &str,
    ) -> CoreResult<Withdrawal> {
        self.withdrawals
            .admin_action(withdrawal_id, decision, notes, admin_id)
            .await
    }

    pub fn enroll_in_das(&self, user_id: &str) -> CoreResult<EnrollOutcome> {
        self.das.enroll(user_id)
    }

    pub fn get_das_countdown(&self, user_id: &str) -> CoreResult<DasCountdown> {
        self.das.get_countdown(user_id)
    }
}
