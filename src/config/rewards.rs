//! Reward Schedule
//!
//! The single table every component reads rates and thresholds from: SmartLine
//! level rates, DRI rate, FS daily rate and cap, DAS tiers and withdrawal
//! limits. The UI reads the same structure from `GET /config/rewards`.

use serde::{Deserialize, Serialize};

use crate::amount::{self, usd, Amount};

/// SmartLine walks at most this many ancestors
pub const SMARTLINE_DEPTH: usize = 5;

/// Commission rate for one ancestor distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelRate {
    pub level: u8,
    /// basis points (150 = 1.5%)
    pub rate_bps: u32,
}

/// One DAS milestone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DasTier {
    pub tier: u8,
    /// direct referrals required
    pub referrals: u32,
    /// own investment volume required
    #[serde(with = "amount::as_usd")]
    pub volume: Amount,
    /// displayed only; completion does not check it
    pub days: u32,
    #[serde(with = "amount::as_usd")]
    pub reward: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardSchedule {
    pub version: u32,
    /// Direct referral income paid to the investor's parent
    pub dri_rate_bps: u32,
    /// Ordered nearest ancestor first
    pub smartline: Vec<LevelRate>,
    /// FS daily return, parts per million of principal (2727 = 0.2727%)
    pub fs_daily_rate_ppm: u32,
    /// Lifetime FS payout cap as a multiple of principal
    pub return_cap_multiple: u32,
    /// Lock term added to the creation date
    pub lock_months: u32,
    pub das_tiers: Vec<DasTier>,
    pub das_window_days: u32,
    #[serde(with = "amount::as_usd")]
    pub withdrawal_minimum: Amount,
    pub withdrawal_fee_bps: u32,
    pub otp_ttl_secs: i64,
}

impl Default for RewardSchedule {
    fn default() -> Self {
        Self::canonical()
    }
}

impl RewardSchedule {
    /// The enforced table.
    pub fn canonical() -> Self {
        Self {
            version: 1,
            dri_rate_bps: 600,
            smartline: vec![
                LevelRate { level: 1, rate_bps: 150 },
                LevelRate { level: 2, rate_bps: 100 },
                LevelRate { level: 3, rate_bps: 75 },
                LevelRate { level: 4, rate_bps: 50 },
                LevelRate { level: 5, rate_bps: 25 },
            ],
            fs_daily_rate_ppm: 2727,
            return_cap_multiple: 2,
            lock_months: 17,
            das_tiers: vec![
                DasTier { tier: 1, referrals: 5, volume: usd(10_000), days: 30, reward: usd(100) },
                DasTier { tier: 2, referrals: 10, volume: usd(20_000), days: 60, reward: usd(300) },
                DasTier { tier: 3, referrals: 15, volume: usd(50_000), days: 90, reward: usd(1_000) },
            ],
            das_window_days: 90,
            withdrawal_minimum: usd(15),
            withdrawal_fee_bps: 500,
            otp_ttl_secs: 10 * 60,
        }
    }

    /// Rate for ancestor distance `level` (1-indexed)
    pub fn smartline_rate(&self, level: u8) -> Option<u32> {
        self.smartline
            .iter()
            .find(|r| r.level == level)
            .map(|r| r.rate_bps)
    }

    pub fn smartline_total_bps(&self) -> u32 {
        self.smartline.iter().map(|r| r.rate_bps).sum()
    }

    /// Lifetime FS cap for a principal
    pub fn return_cap(&self, principal: Amount) -> Amount {
        principal.saturating_mul(self.return_cap_multiple as Amount)
    }

    pub fn das_tier(&self, tier: u8) -> Option<&DasTier> {
        self.das_tiers.iter().find(|t| t.tier == tier)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.smartline.is_empty() || self.smartline.len() > SMARTLINE_DEPTH {
            return Err(format!(
                "smartline must define 1..={} levels, got {}",
                SMARTLINE_DEPTH,
                self.smartline.len()
            ));
        }
        for (idx, rate) in self.smartline.iter().enumerate() {
            if rate.level as usize != idx + 1 {
                return Err(format!(
                    "smartline levels must be ordered 1..n, found level {} at position {}",
                    rate.level,
                    idx + 1
                ));
            }
        }
        if self.das_tiers.len() != 3 {
            return Err(format!("das must define 3 tiers, got {}", self.das_tiers.len()));
        }
        for pair in self.das_tiers.windows(2) {
            if pair[1].tier != pair[0].tier + 1 || pair[1].referrals < pair[0].referrals {
                return Err("das tiers must be ordered with non-decreasing referrals".into());
            }
        }
        if self.return_cap_multiple == 0 {
            return Err("return_cap_multiple must be positive".into());
        }
        if self.withdrawal_fee_bps >= 10_000 {
            return Err("withdrawal_fee_bps must be below 100%".into());
        }
        if self.otp_ttl_secs <= 0 {
            return Err("otp_ttl_secs must be positive".into());
        }
        Ok(())
    }
}
