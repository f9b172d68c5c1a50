use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{self, Amount};
use crate::config::SMARTLINE_DEPTH;
use crate::error::CoreError;

/// Number of DAS milestone tiers tracked per user
pub const DAS_TIERS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DasTaskState {
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DasState {
    pub is_enrolled: bool,
    pub countdown_start: Option<DateTime<Utc>>,
    pub tasks: [DasTaskState; DAS_TIERS],
    pub monthly_earnings: Amount,
}

/// Stored user record. Balance and counter fields are only written through
/// [`User::apply_delta`] inside a store transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub own_sponsor_id: String,
    pub sponsor_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub mobile: String,
    pub password_hash: String,

    pub parent: Option<String>,
    pub children: Vec<String>,

    pub referral_count: u64,
    /// index 0 = level 1
    pub level_counts: [u64; SMARTLINE_DEPTH],
    pub level_earnings: [Amount; SMARTLINE_DEPTH],
    pub total_earnings: Amount,

    pub direct_income: Amount,
    pub fs_income: Amount,
    pub smart_line_income: Amount,
    pub wallet_balance: Amount,
    pub daily_fs_income: Amount,
    pub total_investment_amount: Amount,
    pub total_investment_volume: Amount,
    pub total_withdrawn: Amount,

    pub das: DasState,

    pub created_at: DateTime<Utc>,
}

/// A user field that moves only by atomic increments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    ReferralCount,
    /// 1-indexed ancestor distance
    LevelCount(u8),
    /// 1-indexed ancestor distance
    LevelEarnings(u8),
    TotalEarnings,
    DirectIncome,
    FsIncome,
    SmartLineIncome,
    WalletBalance,
    DailyFsIncome,
    TotalInvestmentAmount,
    TotalInvestmentVolume,
    TotalWithdrawn,
    DasMonthlyEarnings,
}

impl UserField {
    pub fn name(&self) -> String {
        match self {
            UserField::ReferralCount => "referralCount".into(),
            UserField::LevelCount(l) => format!("level{}Count", l),
            UserField::LevelEarnings(l) => format!("level{}Earnings", l),
            UserField::TotalEarnings => "totalEarnings".into(),
            UserField::DirectIncome => "directIncome".into(),
            UserField::FsIncome => "fsIncome".into(),
            UserField::SmartLineIncome => "smartLineIncome".into(),
            UserField::WalletBalance => "walletBalance".into(),
            UserField::DailyFsIncome => "dailyFsIncome".into(),
            UserField::TotalInvestmentAmount => "totalInvestmentAmount".into(),
            UserField::TotalInvestmentVolume => "totalInvestmentVolume".into(),
            UserField::TotalWithdrawn => "totalWithdrawn".into(),
            UserField::DasMonthlyEarnings => "dasMonthlyEarnings".into(),
        }
    }
}

fn level_index(field: UserField, level: u8) -> Result<usize, CoreError> {
    if level == 0 || level as usize > SMARTLINE_DEPTH {
        return Err(CoreError::Invariant(format!("{} out of range", field.name())));
    }
    Ok(level as usize - 1)
}

fn shift_amount(value: &mut Amount, delta: i128, field: UserField) -> Result<(), CoreError> {
    if delta >= 0 {
        *value = value.saturating_add(delta as Amount);
        return Ok(());
    }
    let dec = delta.unsigned_abs();
    if dec > *value {
        return Err(match field {
            UserField::WalletBalance => CoreError::InsufficientBalance {
                available: *value,
                requested: dec,
            },
            _ => CoreError::Invariant(format!("{} would go negative", field.name())),
        });
    }
    *value -= dec;
    Ok(())
}

fn shift_count(value: &mut u64, delta: i128, field: UserField) -> Result<(), CoreError> {
    let next = *value as i128 + delta;
    if next < 0 || next > u64::MAX as i128 {
        return Err(CoreError::Invariant(format!("{} out of range", field.name())));
    }
    *value = next as u64;
    Ok(())
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Apply one signed increment to a counter or balance field
    pub fn apply_delta(&mut self, field: UserField, delta: i128) -> Result<(), CoreError> {
        match field {
            UserField::ReferralCount => shift_count(&mut self.referral_count, delta, field),
            UserField::LevelCount(l) => {
                let idx = level_index(field, l)?;
                shift_count(&mut self.level_counts[idx], delta, field)
            }
            UserField::LevelEarnings(l) => {
                let idx = level_index(field, l)?;
                shift_amount(&mut self.level_earnings[idx], delta, field)
            }
            UserField::TotalEarnings => shift_amount(&mut self.total_earnings, delta, field),
            UserField::DirectIncome => shift_amount(&mut self.direct_income, delta, field),
            UserField::FsIncome => shift_amount(&mut self.fs_income, delta, field),
            UserField::SmartLineIncome => shift_amount(&mut self.smart_line_income, delta, field),
            UserField::WalletBalance => shift_amount(&mut self.wallet_balance, delta, field),
            UserField::DailyFsIncome => shift_amount(&mut self.daily_fs_income, delta, field),
            UserField::TotalInvestmentAmount => {
                shift_amount(&mut self.total_investment_amount, delta, field)
            }
            UserField::TotalInvestmentVolume => {
                shift_amount(&mut self.total_investment_volume, delta, field)
            }
            UserField::TotalWithdrawn => shift_amount(&mut self.total_withdrawn, delta, field),
            UserField::DasMonthlyEarnings => {
                shift_amount(&mut self.das.monthly_earnings, delta, field)
            }
        }
    }
}

/// Registration input
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub mobile: String,
    pub email: String,
    pub password: String,
}

/// Public projection of a user (no password hash, flattened level arrays)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub own_sponsor_id: String,
    pub sponsor_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub mobile: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub referral_count: u64,
    pub level1_count: u64,
    pub level2_count: u64,
    pub level3_count: u64,
    pub level4_count: u64,
    pub level5_count: u64,
    #[serde(with = "amount::as_usd")]
    pub level1_earnings: Amount,
    #[serde(with = "amount::as_usd")]
    pub level2_earnings: Amount,
    #[serde(with = "amount::as_usd")]
    pub level3_earnings: Amount,
    #[serde(with = "amount::as_usd")]
    pub level4_earnings: Amount,
    #[serde(with = "amount::as_usd")]
    pub level5_earnings: Amount,
    #[serde(with = "amount::as_usd")]
    pub total_earnings: Amount,
    #[serde(with = "amount::as_usd")]
    pub direct_income: Amount,
    #[serde(with = "amount::as_usd")]
    pub fs_income: Amount,
    #[serde(with = "amount::as_usd")]
    pub smart_line_income: Amount,
    #[serde(with = "amount::as_usd")]
    pub wallet_balance: Amount,
    #[serde(with = "amount::as_usd")]
    pub daily_fs_income: Amount,
    #[serde(with = "amount::as_usd")]
    pub total_investment_amount: Amount,
    #[serde(with = "amount::as_usd")]
    pub total_investment_volume: Amount,
    #[serde(with = "amount::as_usd")]
    pub total_withdrawn: Amount,
    pub is_enrolled_in_das: bool,
    pub das_countdown_start_date: Option<DateTime<Utc>>,
    pub das_task1_completed: bool,
    pub das_task2_completed: bool,
    pub das_task3_completed: bool,
    #[serde(with = "amount::as_usd")]
    pub das_monthly_earnings: Amount,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            own_sponsor_id: u.own_sponsor_id.clone(),
            sponsor_id: u.sponsor_id.clone(),
            first_name: u.first_name.clone(),
            last_name: u.last_name.clone(),
            email: u.email.clone(),
            mobile: u.mobile.clone(),
            parent: u.parent.clone(),
            children: u.children.clone(),
            referral_count: u.referral_count,
            level1_count: u.level_counts[0],
            level2_count: u.level_counts[1],
            level3_count: u.level_counts[2],
            level4_count: u.level_counts[3],
            level5_count: u.level_counts[4],
            level1_earnings: u.level_earnings[0],
            level2_earnings: u.level_earnings[1],
            level3_earnings: u.level_earnings[2],
            level4_earnings: u.level_earnings[3],
            level5_earnings: u.level_earnings[4],
            total_earnings: u.total_earnings,
            direct_income: u.direct_income,
            fs_income: u.fs_income,
            smart_line_income: u.smart_line_income,
            wallet_balance: u.wallet_balance,
            daily_fs_income: u.daily_fs_income,
            total_investment_amount: u.total_investment_amount,
            total_investment_volume: u.total_investment_volume,
            total_withdrawn: u.total_withdrawn,
            is_enrolled_in_das: u.das.is_enrolled,
            das_countdown_start_date: u.das.countdown_start,
            das_task1_completed: u.das.tasks[0].completed,
            das_task2_completed: u.das.tasks[1].completed,
            das_task3_completed: u.das.tasks[2].completed,
            das_monthly_earnings: u.das.monthly_earnings,
            created_at: u.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::usd;

    fn blank() -> User {
        User {
            id: "u1".into(),
            own_sponsor_id: "FX000001".into(),
            sponsor_id: None,
            first_name: "Ada".into(),
            last_name: "Obi".into(),
            email: "ada@example.com".into(),
            mobile: "+2340000000".into(),
            password_hash: String::new(),
            parent: None,
            children: vec![],
            referral_count: 0,
            level_counts: [0; SMARTLINE_DEPTH],
            level_earnings: [0; SMARTLINE_DEPTH],
            total_earnings: 0,
            direct_income: 0,
            fs_income: 0,
            smart_line_income: 0,
            wallet_balance: 0,
            daily_fs_income: 0,
            total_investment_amount: 0,
            total_investment_volume: 0,
            total_withdrawn: 0,
            das: DasState::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn wallet_underflow_reports_insufficient_balance() {
        let mut u = blank();
        u.apply_delta(UserField::WalletBalance, usd(10) as i128).unwrap();
        let err = u
            .apply_delta(UserField::WalletBalance, -(usd(11) as i128))
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBalance { .. }));
        assert_eq!(u.wallet_balance, usd(10));
    }

    #[test]
    fn level_fields_are_bounds_checked() {
        let mut u = blank();
        u.apply_delta(UserField::LevelCount(5), 1).unwrap();
        assert_eq!(u.level_counts[4], 1);
        assert!(u.apply_delta(UserField::LevelCount(6), 1).is_err());
        assert!(u.apply_delta(UserField::LevelEarnings(0), 1).is_err());
    }

    #[test]
    fn view_flattens_levels_and_hides_password() {
        let mut u = blank();
        u.password_hash = "secret".into();
        u.level_earnings[1] = usd(10);
        let json = serde_json::to_value(UserView::from(&u)).unwrap();
        assert_eq!(json["level2Earnings"], "10.00");
        assert!(json.get("passwordHash").is_none());
    }
}
