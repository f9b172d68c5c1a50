//! Prometheus counters for the engine, rendered at `GET /metrics`.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::amount::Amount;

pub struct Metrics {
    registry: Registry,
    pub users_registered: IntCounter,
    pub investments_created: IntCounter,
    /// label: kind = dri | smartline | fs | das
    pub reward_credits: IntCounterVec,
    /// label: kind; value in whole cents
    pub reward_cents: IntCounterVec,
    pub accrual_runs: IntCounter,
    pub accrual_failures: IntCounter,
    /// label: outcome = requested | rolled_back | verified | approved | rejected | completed
    pub withdrawals: IntCounterVec,
    pub otp_failures: IntCounter,
    /// label: outcome = submitted | approved | rejected
    pub deposits: IntCounterVec,
    pub das_tiers_completed: IntCounter,
    pub counter_repairs: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("fxline".to_string()), None)?;

        let users_registered = IntCounter::new("users_registered_total", "Users registered")?;
        let investments_created =
            IntCounter::new("investments_created_total", "Investments created")?;
        let reward_credits = IntCounterVec::new(
            Opts::new("reward_credits_total", "Reward ledger credits by kind"),
            &["kind"],
        )?;
        let reward_cents = IntCounterVec::new(
            Opts::new("reward_cents_total", "Credited reward value in cents by kind"),
            &["kind"],
        )?;
        let accrual_runs = IntCounter::new("fs_accrual_runs_total", "Daily FS accrual runs")?;
        let accrual_failures = IntCounter::new(
            "fs_accrual_failures_total",
            "Investments that failed to accrue during a run",
        )?;
        let withdrawals = IntCounterVec::new(
            Opts::new("withdrawals_total", "Withdrawal workflow events by outcome"),
            &["outcome"],
        )?;
        let otp_failures = IntCounter::new("otp_failures_total", "Rejected OTP verifications")?;
        let deposits = IntCounterVec::new(
            Opts::new("deposits_total", "Deposit events by outcome"),
            &["outcome"],
        )?;
        let das_tiers_completed =
            IntCounter::new("das_tiers_completed_total", "DAS tiers completed")?;
        let counter_repairs = IntCounter::new(
            "referral_counter_repairs_total",
            "Users whose level counters were repaired from the live tree",
        )?;

        registry.register(Box::new(users_registered.clone()))?;
        registry.register(Box::new(investments_created.clone()))?;
        registry.register(Box::new(reward_credits.clone()))?;
        registry.register(Box::new(reward_cents.clone()))?;
        registry.register(Box::new(accrual_runs.clone()))?;
        registry.register(Box::new(accrual_failures.clone()))?;
        registry.register(Box::new(withdrawals.clone()))?;
        registry.register(Box::new(otp_failures.clone()))?;
        registry.register(Box::new(deposits.clone()))?;
        registry.register(Box::new(das_tiers_completed.clone()))?;
        registry.register(Box::new(counter_repairs.clone()))?;

        Ok(Self {
            registry,
            users_registered,
            investments_created,
            reward_credits,
            reward_cents,
            accrual_runs,
            accrual_failures,
            withdrawals,
            otp_failures,
            deposits,
            das_tiers_completed,
            counter_repairs,
        })
    }

    pub fn record_reward(&self, kind: &str, amount: Amount) {
        self.reward_credits.with_label_values(&[kind]).inc();
        let cents = amount / crate::amount::UNITS_PER_CENT;
        self.reward_cents
            .with_label_values(&[kind])
            .inc_by(cents.min(u64::MAX as Amount) as u64);
    }

    pub fn withdrawal_event(&self, outcome: &str) {
        self.withdrawals.with_label_values(&[outcome]).inc();
    }

    pub fn deposit_event(&self, outcome: &str) {
        self.deposits.with_label_values(&[outcome]).inc();
    }

    /// Prometheus text exposition
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::warn!("[METRICS] encode failed: {}", e);
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::usd;

    #[test]
    fn renders_registered_counters() {
        let m = Metrics::new().unwrap();
        m.users_registered.inc();
        m.record_reward("dri", usd(60));
        let text = m.render();
        assert!(text.contains("fxline_users_registered_total 1"));
        assert!(text.contains("fxline_reward_cents_total{kind=\"dri\"} 6000"));
    }
}
