//! Outbound notifications (email relay).
//!
//! The engine only decides *when* to notify and what a failed dispatch
//! means; rendering and delivery live behind [`Notifier`]. OTP dispatch
//! failures roll the withdrawal back; every other notification is
//! log-and-continue.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::info;

use crate::amount::format_usd;
use crate::models::{Deposit, User, Withdrawal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    WithdrawalOtp,
    Welcome,
    DepositApproved,
    DepositRejected,
    WithdrawalApproved,
    WithdrawalRejected,
}

/// Template-agnostic message handed to the relay
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub to: String,
    pub name: String,
    pub subject: String,
    pub data: serde_json::Value,
}

impl Notification {
    fn for_user(user: &User, kind: NotificationKind, subject: &str, data: serde_json::Value) -> Self {
        Self {
            kind,
            to: user.email.clone(),
            name: user.full_name(),
            subject: subject.to_string(),
            data,
        }
    }

    pub fn withdrawal_otp(user: &User, otp: &str, withdrawal: &Withdrawal, ttl_secs: i64) -> Self {
        Self::for_user(
            user,
            NotificationKind::WithdrawalOtp,
            "Your withdrawal verification code",
            serde_json::json!({
                "otp": otp,
                "withdrawalId": withdrawal.id,
                "requestedAmount": format_usd(withdrawal.requested_amount),
                "serviceCharge": format_usd(withdrawal.service_charge),
                "netAmount": format_usd(withdrawal.amount),
                "method": withdrawal.method,
                "walletAddress": withdrawal.wallet_address,
                "expiresInMinutes": ttl_secs / 60,
            }),
        )
    }

    pub fn welcome(user: &User) -> Self {
        Self::for_user(
            user,
            NotificationKind::Welcome,
            "Welcome aboard",
            serde_json::json!({
                "ownSponsorId": user.own_sponsor_id,
                "sponsorId": user.sponsor_id,
            }),
        )
    }

    pub fn deposit_reviewed(user: &User, deposit: &Deposit, approved: bool) -> Self {
        let (kind, subject) = if approved {
            (NotificationKind::DepositApproved, "Your deposit was approved")
        } else {
            (NotificationKind::DepositRejected, "Your deposit was rejected")
        };
        Self::for_user(
            user,
            kind,
            subject,
            serde_json::json!({
                "depositId": deposit.id,
                "amount": format_usd(deposit.amount),
                "packageType": deposit.package_type.as_str(),
                "notes": deposit.admin_notes,
            }),
        )
    }

    pub fn withdrawal_reviewed(user: &User, withdrawal: &Withdrawal, approved: bool) -> Self {
        let (kind, subject) = if approved {
            (NotificationKind::WithdrawalApproved, "Your withdrawal was approved")
        } else {
            (NotificationKind::WithdrawalRejected, "Your withdrawal was rejected")
        };
        Self::for_user(
            user,
            kind,
            subject,
            serde_json::json!({
                "withdrawalId": withdrawal.id,
                "netAmount": format_usd(withdrawal.amount),
                "walletAddress": withdrawal.wallet_address,
                "notes": withdrawal.admin_notes,
            }),
        )
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, notification: Notification) -> Result<()>;

    async fn send_otp_email(
        &self,
        user: &User,
        otp: &str,
        withdrawal: &Withdrawal,
        ttl_secs: i64,
    ) -> Result<()> {
        self.deliver(Notification::withdrawal_otp(user, otp, withdrawal, ttl_secs))
            .await
    }

    async fn send_welcome_email(&self, user: &User) -> Result<()> {
        self.deliver(Notification::welcome(user)).await
    }

    async fn send_deposit_approval_email(&self, user: &User, deposit: &Deposit) -> Result<()> {
        self.deliver(Notification::deposit_reviewed(user, deposit, true))
            .await
    }

    async fn send_deposit_rejection_email(&self, user: &User, deposit: &Deposit) -> Result<()> {
        self.deliver(Notification::deposit_reviewed(user, deposit, false))
            .await
    }

    async fn send_withdrawal_approval_email(&self, user: &User, withdrawal: &Withdrawal) -> Result<()> {
        self.deliver(Notification::withdrawal_reviewed(user, withdrawal, true))
            .await
    }

    async fn send_withdrawal_rejection_email(
        &self,
        user: &User,
        withdrawal: &Withdrawal,
    ) -> Result<()> {
        self.deliver(Notification::withdrawal_reviewed(user, withdrawal, false))
            .await
    }
}

/// Logs notifications instead of sending them
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, notification: Notification) -> Result<()> {
        // never log the otp itself
        info!(
            kind = ?notification.kind,
            to = %notification.to,
            "[NOTIFY] {}",
            notification.subject
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a mail relay
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(8))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, notification: Notification) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&notification)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!(
                "mail relay answered {} for {:?}",
                resp.status(),
                notification.kind
            ));
        }
        Ok(())
    }
}

/// In-memory outbox. Kinds registered with [`MemoryNotifier::fail_on`]
/// fail to deliver, which lets callers exercise dispatch-failure paths.
#[derive(Default)]
pub struct MemoryNotifier {
    outbox: Mutex<Vec<Notification>>,
    failing: Mutex<HashSet<NotificationKind>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, kind: NotificationKind) {
        self.failing.lock().insert(kind);
    }

    pub fn recover(&self, kind: NotificationKind) {
        self.failing.lock().remove(&kind);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.outbox.lock().clone()
    }

    pub fn sent_of(&self, kind: NotificationKind) -> Vec<Notification> {
        self.outbox
            .lock()
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    /// Latest OTP dispatched for a withdrawal
    pub fn otp_for(&self, withdrawal_id: &str) -> Option<String> {
        self.outbox
            .lock()
            .iter()
            .rev()
            .filter(|n| n.kind == NotificationKind::WithdrawalOtp)
            .find(|n| n.data["withdrawalId"] == withdrawal_id)
            .and_then(|n| n.data["otp"].as_str().map(str::to_string))
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    fn name(&self) -> &str {
        "memory"
    }

    async fn deliver(&self, notification: Notification) -> Result<()> {
        if self.failing.lock().contains(&notification.kind) {
            return Err(anyhow!("delivery of {:?} refused", notification.kind));
        }
        self.outbox.lock().push(notification);
        Ok(())
    }
}
