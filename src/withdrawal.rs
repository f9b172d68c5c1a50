//! Withdrawal Workflow
//!
//! request -> OTP verify -> admin approve/reject -> payout completed.
//! Status only moves through [`WithdrawalStatus::on`]. Funds leave the
//! wallet at approval, inside the same transaction as the status change.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::amount::{self, apply_bps, format_usd, round_to_cents, validate_amount, Amount};
use crate::config::RewardSchedule;
use crate::error::{CoreError, CoreResult};
use crate::ledger;
use crate::metrics::Metrics;
use crate::models::{
    AdminDecision, EntryType, LedgerEntry, OtpRecord, User, UserField, Withdrawal, WithdrawalEvent,
    WithdrawalStatus,
};
use crate::notify::Notifier;
use crate::store::{abort, Store};

/// Fee split of a requested amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalQuote {
    #[serde(with = "amount::as_usd")]
    pub requested: Amount,
    #[serde(with = "amount::as_usd")]
    pub service_charge: Amount,
    #[serde(with = "amount::as_usd")]
    pub net: Amount,
}

/// Service charge is the fee rate of `requested`, rounded half-up to cents
pub fn quote(schedule: &RewardSchedule, requested: Amount) -> WithdrawalQuote {
    let service_charge = round_to_cents(apply_bps(requested, schedule.withdrawal_fee_bps)).min(requested);
    WithdrawalQuote {
        requested,
        service_charge,
        net: requested - service_charge,
    }
}

fn new_otp_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

fn non_empty(field: &'static str, value: &str) -> CoreResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CoreError::InvalidField {
            field,
            reason: "required".into(),
        });
    }
    Ok(value.to_string())
}

pub struct WithdrawalWorkflow {
    store: Store,
    schedule: Arc<RewardSchedule>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
}

impl WithdrawalWorkflow {
    pub fn new(
        store: Store,
        schedule: Arc<RewardSchedule>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            schedule,
            notifier,
            metrics,
        }
    }

    pub fn quote(&self, requested: Amount) -> WithdrawalQuote {
        quote(&self.schedule, requested)
    }

    pub async fn request_withdrawal(
        &self,
        user_id: &str,
        amount: Amount,
        method: &str,
        wallet_address: &str,
    ) -> CoreResult<Withdrawal> {
        self.request_at(user_id, amount, method, wallet_address, Utc::now())
            .await
    }

    /// Create the withdrawal and its OTP, then dispatch the code. A failed
    /// dispatch deletes both records again.
    pub async fn request_at(
        &self,
        user_id: &str,
        amount: Amount,
        method: &str,
        wallet_address: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Withdrawal> {
        if amount < self.schedule.withdrawal_minimum {
            return Err(CoreError::BelowMinimum {
                minimum: self.schedule.withdrawal_minimum,
            });
        }
        validate_amount(amount)?;
        let method = non_empty("method", method)?;
        let wallet_address = non_empty("walletAddress", wallet_address)?;

        let q = self.quote(amount);
        let code = new_otp_code();
        let draft = Withdrawal {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            requested_amount: q.requested,
            service_charge: q.service_charge,
            amount: q.net,
            method,
            wallet_address,
            status: WithdrawalStatus::PendingOtp,
            otp_verified: false,
            otp_verified_at: None,
            admin_id: None,
            admin_notes: None,
            actioned_at: None,
            payout_reference: None,
            completed_at: None,
            created_at: now,
        };
        let otp = OtpRecord::issue(&draft.id, &code, now, self.schedule.otp_ttl_secs);

        let user: User = self.store.atomically(|uow| {
            let user = uow.require_user(user_id)?;
            if amount > user.wallet_balance {
                return abort(CoreError::InsufficientBalance {
                    available: user.wallet_balance,
                    requested: amount,
                });
            }
            uow.put_withdrawal(&draft)?;
            uow.put_otp(&otp)?;
            Ok(user)
        })?;

        if let Err(e) = self
            .notifier
            .send_otp_email(&user, &code, &draft, self.schedule.otp_ttl_secs)
            .await
        {
            let rollback = self.store.atomically(|uow| {
                uow.remove_withdrawal(&draft.id)?;
                uow.remove_otp(&draft.id)
            });
            if let Err(re) = rollback {
                error!("[WITHDRAWAL] rollback of {} failed: {}", draft.id, re);
            }
            self.metrics.withdrawal_event("rolled_back");
            warn!(
                "[WITHDRAWAL] otp dispatch for {} failed, request dropped: {}",
                draft.id, e
            );
            return Err(CoreError::Notification(e.to_string()));
        }

        self.metrics.withdrawal_event("requested");
        info!(
            "[WITHDRAWAL] {} requested {} (fee {}, net {})",
            user_id,
            format_usd(q.requested),
            format_usd(q.service_charge),
            format_usd(q.net)
        );
        Ok(draft)
    }

    pub fn verify_otp(&self, withdrawal_id: &str, code: &str) -> CoreResult<Withdrawal> {
        self.verify_otp_at(withdrawal_id, code, Utc::now())
    }

    /// Consume the OTP and move to `pending_admin` in one conditional
    /// transaction. Of concurrent attempts with the right code exactly one
    /// succeeds; the others see a used OTP.
    pub fn verify_otp_at(&self, withdrawal_id: &str, code: &str, now: DateTime<Utc>) -> CoreResult<Withdrawal> {
        let result = self.store.atomically(|uow| {
            let Some(mut withdrawal) = uow.withdrawal(withdrawal_id)? else {
                return abort(CoreError::WithdrawalNotFound(withdrawal_id.to_string()));
            };
            let mut otp = match uow.otp(withdrawal_id)? {
                Some(otp) if otp.accepts(code, now) => otp,
                _ => return abort(CoreError::InvalidOrExpiredOtp),
            };
            let Ok(next) = withdrawal.status.on(WithdrawalEvent::OtpVerified) else {
                return abort(CoreError::NotPending);
            };

            otp.is_used = true;
            otp.used_at = Some(now);
            withdrawal.status = next;
            withdrawal.otp_verified = true;
            withdrawal.otp_verified_at = Some(now);
            uow.put_otp(&otp)?;
            uow.put_withdrawal(&withdrawal)?;
            Ok(withdrawal)
        });

        match &result {
            Ok(w) => {
                self.metrics.withdrawal_event("verified");
                info!("[WITHDRAWAL] {} verified, awaiting admin", w.id);
            }
            Err(CoreError::InvalidOrExpiredOtp) => {
                self.metrics.otp_failures.inc();
                warn!("[WITHDRAWAL] rejected otp for {}", withdrawal_id);
            }
            Err(_) => {}
        }
        result
    }

    /// Approve (debits the net amount) or reject (moves nothing). Notes are
    /// mandatory either way.
    pub async fn admin_action(
        &self,
        withdrawal_id: &str,
        decision: AdminDecision,
        notes: &str,
        admin_id: &str,
    ) -> CoreResult<Withdrawal> {
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(CoreError::MissingNotes);
        }
        let now = Utc::now();

        let (withdrawal, user) = self.store.atomically(|uow| {
            let Some(mut withdrawal) = uow.withdrawal(withdrawal_id)? else {
                return abort(CoreError::WithdrawalNotFound(withdrawal_id.to_string()));
            };
            let event = match decision {
                AdminDecision::Approve => WithdrawalEvent::Approve,
                AdminDecision::Reject => WithdrawalEvent::Reject,
            };
            let Ok(next) = withdrawal.status.on(event) else {
                return abort(CoreError::NotPendingAdmin);
            };

            let user = match decision {
                AdminDecision::Approve => {
                    let entry = LedgerEntry::new(
                        &withdrawal.user_id,
                        EntryType::Withdrawal,
                        withdrawal.amount,
                        format!(
                            "Withdrawal via {} (requested {}, fee {})",
                            withdrawal.method,
                            format_usd(withdrawal.requested_amount),
                            format_usd(withdrawal.service_charge)
                        ),
                    );
                    ledger::debit(uow, &entry, &[UserField::WalletBalance], &[UserField::TotalWithdrawn])?
                }
                AdminDecision::Reject => uow.require_user(&withdrawal.user_id)?,
            };

            withdrawal.status = next;
            withdrawal.admin_id = Some(admin_id.to_string());
            withdrawal.admin_notes = Some(notes.to_string());
            withdrawal.actioned_at = Some(now);
            uow.put_withdrawal(&withdrawal)?;
            Ok((withdrawal, user))
        })?;

        let sent = match decision {
            AdminDecision::Approve => {
                self.metrics.withdrawal_event("approved");
                self.notifier
                    .send_withdrawal_approval_email(&user, &withdrawal)
                    .await
            }
            AdminDecision::Reject => {
                self.metrics.withdrawal_event("rejected");
                self.notifier
                    .send_withdrawal_rejection_email(&user, &withdrawal)
                    .await
            }
        };
        if let Err(e) = sent {
            warn!("[WITHDRAWAL] outcome email for {} failed: {}", withdrawal.id, e);
        }
        info!(
            "[WITHDRAWAL] {} {} by {}",
            withdrawal.id,
            withdrawal.status.as_str(),
            admin_id
        );
        Ok(withdrawal)
    }

    /// `approved -> completed` once the payout has been sent
    pub fn mark_completed(&self, withdrawal_id: &str, payout_reference: &str) -> CoreResult<Withdrawal> {
        let reference = non_empty("payoutReference", payout_reference)?;
        let now = Utc::now();
        let withdrawal = self.store.atomically(|uow| {
            let Some(mut withdrawal) = uow.withdrawal(withdrawal_id)? else {
                return abort(CoreError::WithdrawalNotFound(withdrawal_id.to_string()));
            };
            let next = match withdrawal.status.on(WithdrawalEvent::PayoutSent) {
                Ok(next) => next,
                Err(e) => return abort(e),
            };
            withdrawal.status = next;
            withdrawal.payout_reference = Some(reference.clone());
            withdrawal.completed_at = Some(now);
            uow.put_withdrawal(&withdrawal)?;
            Ok(withdrawal)
        })?;
        self.metrics.withdrawal_event("completed");
        info!("[WITHDRAWAL] {} completed ({})", withdrawal.id, reference);
        Ok(withdrawal)
    }

    pub fn withdrawal(&self, withdrawal_id: &str) -> CoreResult<Withdrawal> {
        self.store
            .find_withdrawal(withdrawal_id)?
            .ok_or_else(|| CoreError::WithdrawalNotFound(withdrawal_id.to_string()))
    }

    pub fn withdrawals_for(&self, user_id: &str) -> CoreResult<Vec<Withdrawal>> {
        self.store.require_user(user_id)?;
        self.store.withdrawals_where(|w| w.user_id == user_id)
    }

    pub fn pending_for_admin(&self) -> CoreResult<Vec<Withdrawal>> {
        self.store.withdrawals_with_status(WithdrawalStatus::PendingAdmin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::usd;

    #[test]
    fn fee_is_five_percent_rounded_to_cents() {
        let schedule = RewardSchedule::canonical();

        let q = quote(&schedule, usd(20));
        assert_eq!(q.service_charge, usd(1));
        assert_eq!(q.net, usd(19));

        // 15.01 * 0.05 = 0.7505 -> 0.75
        let q = quote(&schedule, 15_010_000);
        assert_eq!(q.service_charge, 750_000);
        assert_eq!(q.net, 14_260_000);

        // 15.10 * 0.05 = 0.755 -> 0.76
        let q = quote(&schedule, 15_100_000);
        assert_eq!(q.service_charge, 760_000);
        assert_eq!(q.requested, q.service_charge + q.net);
    }

    #[test]
    fn otp_codes_are_six_digits() {
        for _ in 0..50 {
            let code = new_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
