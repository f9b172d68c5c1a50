use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{self, Amount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    /// FixSix: daily fixed return against the 2x cap
    FsIncome,
    /// DAS re-top-up; pays DRI and SmartLine but does not accrue FS
    DasTopUp,
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::FsIncome => "fs_income",
            PackageType::DasTopUp => "das_top_up",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentStatus {
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Investment {
    pub id: String,
    pub user_id: String,
    #[serde(with = "amount::as_usd")]
    pub amount: Amount,
    pub package_type: PackageType,
    pub unlock_date: DateTime<Utc>,
    #[serde(with = "amount::as_usd")]
    pub remaining_returns: Amount,
    #[serde(with = "amount::as_usd")]
    pub total_returns: Amount,
    pub status: InvestmentStatus,
    /// Calendar day of the last FS credit; accrual for a day at or before
    /// this is skipped.
    pub last_accrued_on: Option<NaiveDate>,
    pub deposit_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Investment {
    pub fn accrues_fs(&self) -> bool {
        self.package_type == PackageType::FsIncome
            && self.status == InvestmentStatus::Active
            && self.remaining_returns > 0
    }

    pub fn already_accrued_for(&self, day: NaiveDate) -> bool {
        matches!(self.last_accrued_on, Some(last) if last >= day)
    }
}
