//! DAS Milestone Tracker
//!
//! Enrolled users earn a one-time reward per tier once their direct
//! referral count and own investment volume reach the tier thresholds.
//! Tier flags only ever move false -> true.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::amount::{self, format_usd, Amount};
use crate::config::{DasTier, RewardSchedule};
use crate::error::CoreResult;
use crate::ledger;
use crate::metrics::Metrics;
use crate::models::{DasTaskState, EntryType, InvestmentStatus, LedgerEntry, UserField, DAS_TIERS};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DasStats {
    pub referral_count: u64,
    #[serde(with = "amount::as_usd")]
    pub total_volume: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollOutcome {
    pub newly_enrolled: bool,
    pub completed_tiers: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierProgress {
    pub tier: u8,
    pub required_referrals: u32,
    pub current_referrals: u64,
    pub referral_progress: f64,
    #[serde(with = "amount::as_usd")]
    pub required_volume: Amount,
    #[serde(with = "amount::as_usd")]
    pub current_volume: Amount,
    pub volume_progress: f64,
    pub days: u32,
    #[serde(with = "amount::as_usd")]
    pub reward: Amount,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownDetail {
    pub start_date: DateTime<Utc>,
    pub window_days: u32,
    pub days_elapsed: i64,
    pub days_remaining: i64,
    pub referral_count: u64,
    #[serde(with = "amount::as_usd")]
    pub total_volume: Amount,
    #[serde(with = "amount::as_usd")]
    pub monthly_earnings: Amount,
    pub tiers: Vec<TierProgress>,
}

/// `{isEnrolled:false}` for users outside the program
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DasCountdown {
    pub is_enrolled: bool,
    #[serde(flatten)]
    pub detail: Option<CountdownDetail>,
}

fn percent(current: u128, required: u128) -> f64 {
    if required == 0 {
        return 100.0;
    }
    let pct = (current as f64 / required as f64 * 100.0).min(100.0);
    (pct * 100.0).round() / 100.0
}

fn tier_slot(tier: &DasTier) -> Option<usize> {
    (tier.tier as usize).checked_sub(1).filter(|i| *i < DAS_TIERS)
}

pub struct DasTracker {
    store: Store,
    schedule: Arc<RewardSchedule>,
    metrics: Arc<Metrics>,
}

impl DasTracker {
    pub fn new(store: Store, schedule: Arc<RewardSchedule>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            schedule,
            metrics,
        }
    }

    pub fn enroll(&self, user_id: &str) -> CoreResult<EnrollOutcome> {
        self.enroll_at(user_id, Utc::now())
    }

    /// Idempotent; the countdown start is stamped once
    pub fn enroll_at(&self, user_id: &str, now: DateTime<Utc>) -> CoreResult<EnrollOutcome> {
        let newly_enrolled = self.store.atomically(|uow| {
            let mut user = uow.require_user(user_id)?;
            if user.das.is_enrolled {
                return Ok(false);
            }
            user.das.is_enrolled = true;
            if user.das.countdown_start.is_none() {
                user.das.countdown_start = Some(now);
            }
            uow.put_user(&user)?;
            Ok(true)
        })?;
        if newly_enrolled {
            info!("[DAS] {} enrolled", user_id);
        }
        let completed_tiers = self.check_at(user_id, now)?;
        Ok(EnrollOutcome {
            newly_enrolled,
            completed_tiers,
        })
    }

    /// Direct children and the sum of the user's own non-cancelled
    /// investments
    pub fn get_actual_stats(&self, user_id: &str) -> CoreResult<DasStats> {
        let user = self.store.require_user(user_id)?;
        let total_volume: Amount = self
            .store
            .find_investments(|i| i.user_id == user_id && i.status != InvestmentStatus::Cancelled)?
            .iter()
            .map(|i| i.amount)
            .sum();
        Ok(DasStats {
            referral_count: user.children.len() as u64,
            total_volume,
        })
    }

    pub fn check_and_update_all_tasks(&self, user_id: &str) -> CoreResult<Vec<u8>> {
        self.check_at(user_id, Utc::now())
    }

    /// Complete every reachable tier and pay its reward. Returns the tiers
    /// completed by this call; not-enrolled users complete nothing.
    pub fn check_at(&self, user_id: &str, now: DateTime<Utc>) -> CoreResult<Vec<u8>> {
        // scans cannot run inside a transaction
        let stats = self.get_actual_stats(user_id)?;

        let completed: Vec<DasTier> = self.store.atomically(|uow| {
            let mut user = uow.require_user(user_id)?;
            if !user.das.is_enrolled {
                return Ok(Vec::new());
            }

            let mut reached = Vec::new();
            for tier in &self.schedule.das_tiers {
                let Some(slot) = tier_slot(tier) else { continue };
                if user.das.tasks[slot].completed {
                    continue;
                }
                if stats.referral_count < tier.referrals as u64 || stats.total_volume < tier.volume {
                    continue;
                }
                user.das.tasks[slot] = DasTaskState {
                    completed: true,
                    completed_at: Some(now),
                };
                reached.push(*tier);
            }
            if reached.is_empty() {
                return Ok(reached);
            }

            uow.put_user(&user)?;
            for tier in &reached {
                let entry = LedgerEntry::new(
                    user_id,
                    EntryType::DasIncome,
                    tier.reward,
                    format!("DAS tier {} reward", tier.tier),
                );
                ledger::credit(uow, &entry, &[UserField::DasMonthlyEarnings, UserField::WalletBalance])?;
            }
            Ok(reached)
        })?;

        for tier in &completed {
            self.metrics.das_tiers_completed.inc();
            self.metrics.record_reward("das", tier.reward);
            info!(
                "[DAS] {} completed tier {} (+{})",
                user_id,
                tier.tier,
                format_usd(tier.reward)
            );
        }
        Ok(completed.iter().map(|t| t.tier).collect())
    }

    pub fn get_countdown(&self, user_id: &str) -> CoreResult<DasCountdown> {
        self.countdown_at(user_id, Utc::now())
    }

    pub fn countdown_at(&self, user_id: &str, now: DateTime<Utc>) -> CoreResult<DasCountdown> {
        let user = self.store.require_user(user_id)?;
        if !user.das.is_enrolled {
            return Ok(DasCountdown {
                is_enrolled: false,
                detail: None,
            });
        }

        let stats = self.get_actual_stats(user_id)?;
        let start = user.das.countdown_start.unwrap_or(now);
        let window = self.schedule.das_window_days;
        let days_elapsed = (now - start).num_days().max(0);
        let days_remaining = (window as i64 - days_elapsed).max(0);

        let tiers = self
            .schedule
            .das_tiers
            .iter()
            .filter_map(|tier| {
                let slot = tier_slot(tier)?;
                let task = &user.das.tasks[slot];
                Some(TierProgress {
                    tier: tier.tier,
                    required_referrals: tier.referrals,
                    current_referrals: stats.referral_count,
                    referral_progress: percent(stats.referral_count as u128, tier.referrals as u128),
                    required_volume: tier.volume,
                    current_volume: stats.total_volume,
                    volume_progress: percent(stats.total_volume, tier.volume),
                    days: tier.days,
                    reward: tier.reward,
                    completed: task.completed,
                    completed_at: task.completed_at,
                })
            })
            .collect();

        Ok(DasCountdown {
            is_enrolled: true,
            detail: Some(CountdownDetail {
                start_date: start,
                window_days: window,
                days_elapsed,
                days_remaining,
                referral_count: stats.referral_count,
                total_volume: stats.total_volume,
                monthly_earnings: user.das.monthly_earnings,
                tiers,
            }),
        })
    }
}
