use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{self, Amount};
use crate::models::investment::PackageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Pending,
    Approved,
    Rejected,
}

/// A user's funding request, reviewed by an admin before it becomes an
/// investment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub id: String,
    pub user_id: String,
    #[serde(with = "amount::as_usd")]
    pub amount: Amount,
    pub package_type: PackageType,
    pub payment_method: String,
    pub payment_reference: String,
    pub status: DepositStatus,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub investment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
