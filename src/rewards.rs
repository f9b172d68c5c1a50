//! Reward Distribution Engine
//!
//! DRI pays the investor's direct parent; SmartLine pays up to five
//! ancestors at decreasing rates. Both post inside the caller's unit of
//! work so an investment and its commissions commit together.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::amount::{self, apply_bps, format_usd, Amount};
use crate::config::{RewardSchedule, SMARTLINE_DEPTH};
use crate::ledger;
use crate::metrics::Metrics;
use crate::models::{EntryType, LedgerEntry, UserField};
use crate::referral;
use crate::store::{TxResult, UnitOfWork};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    Dri,
    Smartline,
}

impl RewardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardKind::Dri => "dri",
            RewardKind::Smartline => "smartline",
        }
    }
}

/// One commission posted to an ancestor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardCredit {
    pub user_id: String,
    pub kind: RewardKind,
    /// ancestor distance (DRI is always 1)
    pub level: u8,
    #[serde(with = "amount::as_usd")]
    pub amount: Amount,
    pub rate_bps: u32,
}

#[derive(Clone)]
pub struct RewardEngine {
    schedule: Arc<RewardSchedule>,
}

impl RewardEngine {
    pub fn new(schedule: Arc<RewardSchedule>) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &RewardSchedule {
        &self.schedule
    }

    /// Direct referral income to the investor's parent. `None` for roots.
    pub fn distribute_dri(
        &self,
        uow: &UnitOfWork<'_>,
        investor_id: &str,
        amount: Amount,
        investment_id: Option<&str>,
    ) -> TxResult<Option<RewardCredit>> {
        let Some(parent) = referral::uplines(uow, investor_id, 1)?.into_iter().next() else {
            return Ok(None);
        };
        let rate = self.schedule.dri_rate_bps;
        let credit = apply_bps(amount, rate);

        let mut entry = LedgerEntry::new(
            &parent.id,
            EntryType::DriIncome,
            credit,
            format!("Direct referral income on {} investment", format_usd(amount)),
        )
        .from_user(investor_id);
        if let Some(id) = investment_id {
            entry = entry.for_investment(id);
        }
        ledger::credit(uow, &entry, &[UserField::DirectIncome, UserField::WalletBalance])?;

        debug!(
            "[REWARDS] dri {} -> {} ({} bps)",
            format_usd(credit),
            parent.id,
            rate
        );
        Ok(Some(RewardCredit {
            user_id: parent.id,
            kind: RewardKind::Dri,
            level: 1,
            amount: credit,
            rate_bps: rate,
        }))
    }

    /// SmartLine commissions, nearest ancestor first; stops at the first
    /// missing ancestor
    pub fn distribute_smartline(
        &self,
        uow: &UnitOfWork<'_>,
        investor_id: &str,
        amount: Amount,
        investment_id: Option<&str>,
    ) -> TxResult<Vec<RewardCredit>> {
        let depth = self.schedule.smartline.len().min(SMARTLINE_DEPTH);
        let chain = referral::uplines(uow, investor_id, depth)?;
        let mut credits = Vec::with_capacity(chain.len());

        for (ancestor, rate) in chain.iter().zip(self.schedule.smartline.iter()) {
            let credit = apply_bps(amount, rate.rate_bps);
            let mut entry = LedgerEntry::new(
                &ancestor.id,
                EntryType::SmartlineIncome,
                credit,
                format!("SmartLine level {} income", rate.level),
            )
            .from_user(investor_id)
            .at_level(rate.level);
            if let Some(id) = investment_id {
                entry = entry.for_investment(id);
            }
            ledger::credit(
                uow,
                &entry,
                &[
                    UserField::LevelEarnings(rate.level),
                    UserField::TotalEarnings,
                    UserField::SmartLineIncome,
                    UserField::WalletBalance,
                ],
            )?;

            credits.push(RewardCredit {
                user_id: ancestor.id.clone(),
                kind: RewardKind::Smartline,
                level: rate.level,
                amount: credit,
                rate_bps: rate.rate_bps,
            });
        }
        debug!(
            "[REWARDS] smartline on {} paid {} levels",
            format_usd(amount),
            credits.len()
        );
        Ok(credits)
    }

    /// DRI then SmartLine
    pub fn distribute_all(
        &self,
        uow: &UnitOfWork<'_>,
        investor_id: &str,
        amount: Amount,
        investment_id: Option<&str>,
    ) -> TxResult<Vec<RewardCredit>> {
        let mut credits = Vec::new();
        credits.extend(self.distribute_dri(uow, investor_id, amount, investment_id)?);
        credits.extend(self.distribute_smartline(uow, investor_id, amount, investment_id)?);
        Ok(credits)
    }
}

/// Count committed credits in the metrics registry
pub fn record_credits(metrics: &Metrics, credits: &[RewardCredit]) {
    for c in credits {
        metrics.record_reward(c.kind.as_str(), c.amount);
    }
}
