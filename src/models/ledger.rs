use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{self, Amount};

/// Kind of balance-affecting event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Deposit,
    FsIncome,
    DriIncome,
    SmartlineIncome,
    DasIncome,
    Withdrawal,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Deposit => "deposit",
            EntryType::FsIncome => "fs_income",
            EntryType::DriIncome => "dri_income",
            EntryType::SmartlineIncome => "smartline_income",
            EntryType::DasIncome => "das_income",
            EntryType::Withdrawal => "withdrawal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Completed,
}

/// Immutable ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(with = "amount::as_usd")]
    pub amount: Amount,
    pub description: String,
    pub status: EntryStatus,
    pub related_investment_id: Option<String>,
    pub from_user_id: Option<String>,
    pub referral_level: Option<u8>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(user_id: &str, entry_type: EntryType, amount: Amount, description: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            entry_type,
            amount,
            description,
            status: EntryStatus::Completed,
            related_investment_id: None,
            from_user_id: None,
            referral_level: None,
            created_at: Utc::now(),
        }
    }

    pub fn for_investment(mut self, investment_id: &str) -> Self {
        self.related_investment_id = Some(investment_id.to_string());
        self
    }

    pub fn from_user(mut self, user_id: &str) -> Self {
        self.from_user_id = Some(user_id.to_string());
        self
    }

    pub fn at_level(mut self, level: u8) -> Self {
        self.referral_level = Some(level);
        self
    }

    /// Chronological storage key
    pub fn storage_key(&self) -> String {
        format!("{:020}-{}", self.created_at.timestamp_micros().max(0), self.id)
    }
}
