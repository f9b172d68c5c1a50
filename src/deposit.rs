//! Deposit Desk
//!
//! Users file funding requests; an admin reviews each one once. Approval
//! opens the investment in the same transaction that flips the deposit.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::amount::{format_usd, validate_amount, Amount};
use crate::error::{CoreError, CoreResult};
use crate::investment::{InvestmentManager, InvestmentReceipt};
use crate::metrics::Metrics;
use crate::models::{AdminDecision, Deposit, DepositStatus, PackageType};
use crate::notify::Notifier;
use crate::store::{abort, Store};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositReview {
    pub deposit: Deposit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investment: Option<InvestmentReceipt>,
}

pub struct DepositDesk {
    store: Store,
    investments: Arc<InvestmentManager>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
}

impl DepositDesk {
    pub fn new(
        store: Store,
        investments: Arc<InvestmentManager>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            investments,
            notifier,
            metrics,
        }
    }

    pub fn submit_deposit(
        &self,
        user_id: &str,
        amount: Amount,
        package_type: PackageType,
        payment_method: &str,
        payment_reference: &str,
    ) -> CoreResult<Deposit> {
        validate_amount(amount)?;
        let payment_method = payment_method.trim();
        if payment_method.is_empty() {
            return Err(CoreError::InvalidField {
                field: "paymentMethod",
                reason: "required".into(),
            });
        }
        self.store.require_user(user_id)?;

        let deposit = Deposit {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount,
            package_type,
            payment_method: payment_method.to_string(),
            payment_reference: payment_reference.trim().to_string(),
            status: DepositStatus::Pending,
            admin_notes: None,
            reviewed_by: None,
            reviewed_at: None,
            investment_id: None,
            created_at: Utc::now(),
        };
        self.store.atomically(|uow| uow.put_deposit(&deposit))?;

        self.metrics.deposit_event("submitted");
        info!(
            "[DEPOSIT] {} submitted {} for {}",
            user_id,
            format_usd(amount),
            package_type.as_str()
        );
        Ok(deposit)
    }

    pub async fn review_deposit(
        &self,
        deposit_id: &str,
        decision: AdminDecision,
        notes: &str,
        admin_id: &str,
    ) -> CoreResult<DepositReview> {
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(CoreError::MissingNotes);
        }
        let now = Utc::now();

        let (deposit, opened) = self.store.atomically(|uow| {
            let Some(mut deposit) = uow.deposit(deposit_id)? else {
                return abort(CoreError::DepositNotFound(deposit_id.to_string()));
            };
            if deposit.status != DepositStatus::Pending {
                return abort(CoreError::DepositAlreadyReviewed);
            }

            let opened = match decision {
                AdminDecision::Approve => {
                    let (investment, credits) = self.investments.open_in(
                        uow,
                        &deposit.user_id,
                        deposit.amount,
                        deposit.package_type,
                        Some(&deposit.id),
                        now,
                    )?;
                    deposit.status = DepositStatus::Approved;
                    deposit.investment_id = Some(investment.id.clone());
                    Some((investment, credits))
                }
                AdminDecision::Reject => {
                    deposit.status = DepositStatus::Rejected;
                    None
                }
            };
            deposit.admin_notes = Some(notes.to_string());
            deposit.reviewed_by = Some(admin_id.to_string());
            deposit.reviewed_at = Some(now);
            uow.put_deposit(&deposit)?;
            Ok((deposit, opened))
        })?;

        let investment = opened.map(|(investment, credits)| self.investments.after_commit(investment, credits));
        let approved = investment.is_some();
        self.metrics
            .deposit_event(if approved { "approved" } else { "rejected" });
        info!(
            "[DEPOSIT] {} {} by {}",
            deposit.id,
            if approved { "approved" } else { "rejected" },
            admin_id
        );

        match self.store.find_user_by_id(&deposit.user_id) {
            Ok(Some(user)) => {
                let sent = if approved {
                    self.notifier.send_deposit_approval_email(&user, &deposit).await
                } else {
                    self.notifier.send_deposit_rejection_email(&user, &deposit).await
                };
                if let Err(e) = sent {
                    warn!("[DEPOSIT] outcome email for {} failed: {}", deposit.id, e);
                }
            }
            Ok(None) => warn!("[DEPOSIT] owner of {} vanished", deposit.id),
            Err(e) => warn!("[DEPOSIT] could not load owner of {}: {}", deposit.id, e),
        }

        Ok(DepositReview { deposit, investment })
    }

    pub fn deposit(&self, deposit_id: &str) -> CoreResult<Deposit> {
        self.store
            .find_deposit(deposit_id)?
            .ok_or_else(|| CoreError::DepositNotFound(deposit_id.to_string()))
    }

    pub fn deposits_for(&self, user_id: &str) -> CoreResult<Vec<Deposit>> {
        self.store.require_user(user_id)?;
        self.store.deposits_for_user(user_id)
    }
}
