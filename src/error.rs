use serde::Serialize;
use thiserror::Error;

use crate::amount::{format_usd, Amount};

/// Coarse error class, used by callers to decide between retry, re-fetch and
/// surfacing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Dependency,
    Internal,
}

#[derive(Error, Debug)]
pub enum CoreError {
    // validation
    #[error("invalid sponsor id: {0}")]
    InvalidSponsor(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("amount below minimum of {}", format_usd(*minimum))]
    BelowMinimum { minimum: Amount },
    #[error("admin notes are required")]
    MissingNotes,
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    // not found
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("investment not found: {0}")]
    InvestmentNotFound(String),
    #[error("deposit not found: {0}")]
    DepositNotFound(String),
    #[error("withdrawal not found: {0}")]
    WithdrawalNotFound(String),

    // conflict / state
    #[error("email already registered")]
    DuplicateEmail,
    #[error("mobile number already registered")]
    DuplicateMobile,
    #[error("could not allocate a unique sponsor id")]
    SponsorIdExhausted,
    #[error("insufficient balance: available {}, requested {}", format_usd(*available), format_usd(*requested))]
    InsufficientBalance { available: Amount, requested: Amount },
    #[error("withdrawal is not awaiting otp verification")]
    NotPending,
    #[error("withdrawal is not awaiting admin action")]
    NotPendingAdmin,
    #[error("invalid or expired otp")]
    InvalidOrExpiredOtp,
    #[error("illegal withdrawal transition from {from} on {event}")]
    IllegalTransition { from: &'static str, event: &'static str },
    #[error("deposit already reviewed")]
    DepositAlreadyReviewed,
    #[error("investment {0} can no longer be cancelled")]
    NotCancellable(String),

    // dependencies
    #[error("notification dispatch failed: {0}")]
    Notification(String),

    // internal
    #[error("storage: {0}")]
    Storage(#[from] sled::Error),
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        use CoreError::*;
        match self {
            InvalidSponsor(_) | InvalidAmount(_) | BelowMinimum { .. } | MissingNotes
            | InvalidField { .. } => ErrorKind::Validation,
            UserNotFound(_) | InvestmentNotFound(_) | DepositNotFound(_) | WithdrawalNotFound(_) => {
                ErrorKind::NotFound
            }
            DuplicateEmail | DuplicateMobile | SponsorIdExhausted | InsufficientBalance { .. }
            | NotPending | NotPendingAdmin | InvalidOrExpiredOtp | IllegalTransition { .. }
            | DepositAlreadyReviewed | NotCancellable(_) => ErrorKind::Conflict,
            Notification(_) => ErrorKind::Dependency,
            Storage(_) | Codec(_) | Invariant(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        use CoreError::*;
        match self {
            InvalidSponsor(_) => "invalid_sponsor",
            InvalidAmount(_) => "invalid_amount",
            BelowMinimum { .. } => "below_minimum",
            MissingNotes => "missing_notes",
            InvalidField { .. } => "invalid_field",
            UserNotFound(_) => "user_not_found",
            InvestmentNotFound(_) => "investment_not_found",
            DepositNotFound(_) => "deposit_not_found",
            WithdrawalNotFound(_) => "withdrawal_not_found",
            DuplicateEmail => "duplicate_email",
            DuplicateMobile => "duplicate_mobile",
            SponsorIdExhausted => "sponsor_id_exhausted",
            InsufficientBalance { .. } => "insufficient_balance",
            NotPending => "not_pending",
            NotPendingAdmin => "not_pending_admin",
            InvalidOrExpiredOtp => "invalid_or_expired_otp",
            IllegalTransition { .. } => "illegal_transition",
            DepositAlreadyReviewed => "deposit_already_reviewed",
            NotCancellable(_) => "not_cancellable",
            Notification(_) => "notification_failed",
            Storage(_) => "storage",
            Codec(_) => "codec",
            Invariant(_) => "invariant",
        }
    }
}

impl From<sled::transaction::TransactionError<CoreError>> for CoreError {
    fn from(e: sled::transaction::TransactionError<CoreError>) -> Self {
        match e {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(err) => CoreError::Storage(err),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::usd;

    #[test]
    fn kinds_group_errors() {
        assert_eq!(CoreError::MissingNotes.kind(), ErrorKind::Validation);
        assert_eq!(CoreError::UserNotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(CoreError::InvalidOrExpiredOtp.kind(), ErrorKind::Conflict);
        assert_eq!(CoreError::Notification("smtp".into()).kind(), ErrorKind::Dependency);
    }

    #[test]
    fn messages_render_amounts() {
        let e = CoreError::BelowMinimum { minimum: usd(15) };
        assert_eq!(e.to_string(), "amount below minimum of 15.00");
    }
}
