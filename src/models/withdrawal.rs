use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::amount::{self, Amount};
use crate::error::CoreError;

/// Withdrawal lifecycle:
///
/// ```text
/// pending_otp --OtpVerified--> pending_admin --Approve--> approved --PayoutSent--> completed
///                                            \--Reject---> rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    PendingOtp,
    PendingAdmin,
    Approved,
    Rejected,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalEvent {
    OtpVerified,
    Approve,
    Reject,
    PayoutSent,
}

impl WithdrawalEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalEvent::OtpVerified => "otp_verified",
            WithdrawalEvent::Approve => "approve",
            WithdrawalEvent::Reject => "reject",
            WithdrawalEvent::PayoutSent => "payout_sent",
        }
    }
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::PendingOtp => "pending_otp",
            WithdrawalStatus::PendingAdmin => "pending_admin",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
            WithdrawalStatus::Completed => "completed",
        }
    }

    /// The only place status moves. Anything not listed is illegal.
    pub fn on(self, event: WithdrawalEvent) -> Result<WithdrawalStatus, CoreError> {
        use WithdrawalEvent as E;
        use WithdrawalStatus as S;
        match (self, event) {
            (S::PendingOtp, E::OtpVerified) => Ok(S::PendingAdmin),
            (S::PendingAdmin, E::Approve) => Ok(S::Approved),
            (S::PendingAdmin, E::Reject) => Ok(S::Rejected),
            (S::Approved, E::PayoutSent) => Ok(S::Completed),
            (from, event) => Err(CoreError::IllegalTransition {
                from: from.as_str(),
                event: event.as_str(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Rejected | WithdrawalStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: String,
    pub user_id: String,
    #[serde(with = "amount::as_usd")]
    pub requested_amount: Amount,
    #[serde(with = "amount::as_usd")]
    pub service_charge: Amount,
    /// net = requested - service charge
    #[serde(with = "amount::as_usd")]
    pub amount: Amount,
    pub method: String,
    pub wallet_address: String,
    pub status: WithdrawalStatus,
    pub otp_verified: bool,
    pub otp_verified_at: Option<DateTime<Utc>>,
    pub admin_id: Option<String>,
    pub admin_notes: Option<String>,
    pub actioned_at: Option<DateTime<Utc>>,
    pub payout_reference: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Withdrawal,
}

/// One-time code bound to a single withdrawal. Only the hash is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRecord {
    pub withdrawal_id: String,
    pub code_hash: String,
    pub purpose: OtpPurpose,
    pub is_used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl OtpRecord {
    pub fn issue(withdrawal_id: &str, code: &str, now: DateTime<Utc>, ttl_secs: i64) -> Self {
        Self {
            withdrawal_id: withdrawal_id.to_string(),
            code_hash: Self::hash_code(withdrawal_id, code),
            purpose: OtpPurpose::Withdrawal,
            is_used: false,
            expires_at: now + Duration::seconds(ttl_secs),
            created_at: now,
            used_at: None,
        }
    }

    pub fn hash_code(withdrawal_id: &str, code: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(withdrawal_id.as_bytes());
        hasher.update(b":");
        hasher.update(code.trim().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Unused, unexpired and matching
    pub fn accepts(&self, code: &str, now: DateTime<Utc>) -> bool {
        !self.is_used
            && now < self.expires_at
            && self.code_hash == Self::hash_code(&self.withdrawal_id, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_only() {
        use WithdrawalEvent as E;
        use WithdrawalStatus as S;

        assert_eq!(S::PendingOtp.on(E::OtpVerified).unwrap(), S::PendingAdmin);
        assert_eq!(S::PendingAdmin.on(E::Approve).unwrap(), S::Approved);
        assert_eq!(S::PendingAdmin.on(E::Reject).unwrap(), S::Rejected);
        assert_eq!(S::Approved.on(E::PayoutSent).unwrap(), S::Completed);

        assert!(S::PendingOtp.on(E::Approve).is_err());
        assert!(S::PendingAdmin.on(E::OtpVerified).is_err());
        assert!(S::Rejected.on(E::Approve).is_err());
        assert!(S::Approved.on(E::Reject).is_err());
        assert!(S::Completed.on(E::PayoutSent).is_err());
    }

    #[test]
    fn otp_rejects_used_expired_and_wrong_codes() {
        let now = Utc::now();
        let mut otp = OtpRecord::issue("w1", "123456", now, 600);
        assert!(otp.accepts("123456", now));
        assert!(!otp.accepts("654321", now));
        assert!(!otp.accepts("123456", now + Duration::seconds(600)));
        otp.is_used = true;
        assert!(!otp.accepts("123456", now));
    }

    #[test]
    fn code_hash_is_bound_to_withdrawal() {
        assert_ne!(
            OtpRecord::hash_code("w1", "123456"),
            OtpRecord::hash_code("w2", "123456")
        );
    }
}
