//! Ledger
//!
//! Append-only journal of balance-affecting events. Credits and debits are
//! posted through [`credit`] / [`debit`], which move the user fields and
//! write the journal row inside the same unit of work, so a balance change
//! without its row (or a row without its change) cannot be committed.

use serde::Serialize;

use crate::amount::{self, Amount};
use crate::error::CoreResult;
use crate::models::{EntryType, LedgerEntry, User, UserField};
use crate::store::{abort, Store, TxResult, UnitOfWork};

pub(crate) fn signed(amount: Amount) -> TxResult<i128> {
    i128::try_from(amount)
        .or_else(|_| abort(crate::error::CoreError::InvalidAmount(amount.to_string())))
}

/// Add `entry.amount` to every field in `fields` of the entry's user and
/// journal the entry.
pub fn credit(uow: &UnitOfWork<'_>, entry: &LedgerEntry, fields: &[UserField]) -> TxResult<User> {
    let delta = signed(entry.amount)?;
    let deltas: Vec<(UserField, i128)> = fields.iter().map(|f| (*f, delta)).collect();
    let user = uow.increment_user_fields(&entry.user_id, &deltas)?;
    uow.append_entry(entry)?;
    Ok(user)
}

/// Subtract `entry.amount` from `debit_fields` (and add it to `mirror_fields`,
/// e.g. a cumulative withdrawn counter), then journal the entry.
pub fn debit(
    uow: &UnitOfWork<'_>,
    entry: &LedgerEntry,
    debit_fields: &[UserField],
    mirror_fields: &[UserField],
) -> TxResult<User> {
    let delta = signed(entry.amount)?;
    let mut deltas: Vec<(UserField, i128)> = debit_fields.iter().map(|f| (*f, -delta)).collect();
    deltas.extend(mirror_fields.iter().map(|f| (*f, delta)));
    let user = uow.increment_user_fields(&entry.user_id, &deltas)?;
    uow.append_entry(entry)?;
    Ok(user)
}

/// Journal an event that moves no wallet field by itself (e.g. the deposit
/// row of a new investment)
pub fn record(uow: &UnitOfWork<'_>, entry: &LedgerEntry) -> TxResult<()> {
    uow.append_entry(entry)
}

/// A user's rows, oldest first, optionally filtered by type
pub fn history(store: &Store, user_id: &str, kind: Option<EntryType>) -> CoreResult<Vec<LedgerEntry>> {
    let mut entries = store.ledger_for_user(user_id)?;
    if let Some(kind) = kind {
        entries.retain(|e| e.entry_type == kind);
    }
    Ok(entries)
}

/// Per-type totals of a set of rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    #[serde(with = "amount::as_usd")]
    pub deposits: Amount,
    #[serde(with = "amount::as_usd")]
    pub fs_income: Amount,
    #[serde(with = "amount::as_usd")]
    pub dri_income: Amount,
    #[serde(with = "amount::as_usd")]
    pub smartline_income: Amount,
    #[serde(with = "amount::as_usd")]
    pub das_income: Amount,
    #[serde(with = "amount::as_usd")]
    pub withdrawals: Amount,
    pub entries: usize,
}

impl LedgerSummary {
    pub fn of(entries: &[LedgerEntry]) -> Self {
        let mut s = Self::default();
        for e in entries {
            let slot = match e.entry_type {
                EntryType::Deposit => &mut s.deposits,
                EntryType::FsIncome => &mut s.fs_income,
                EntryType::DriIncome => &mut s.dri_income,
                EntryType::SmartlineIncome => &mut s.smartline_income,
                EntryType::DasIncome => &mut s.das_income,
                EntryType::Withdrawal => &mut s.withdrawals,
            };
            *slot = slot.saturating_add(e.amount);
            s.entries += 1;
        }
        s
    }

    /// Everything credited to the wallet minus everything withdrawn
    pub fn net_earnings(&self) -> i128 {
        let credits = self.fs_income + self.dri_income + self.smartline_income + self.das_income;
        credits as i128 - self.withdrawals as i128
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::usd;

    #[test]
    fn summary_groups_by_type() {
        let rows = vec![
            LedgerEntry::new("u", EntryType::Deposit, usd(1000), "d".into()),
            LedgerEntry::new("u", EntryType::DriIncome, usd(60), "dri".into()),
            LedgerEntry::new("u", EntryType::SmartlineIncome, usd(15), "l1".into()),
            LedgerEntry::new("u", EntryType::Withdrawal, usd(19), "w".into()),
        ];
        let s = LedgerSummary::of(&rows);
        assert_eq!(s.deposits, usd(1000));
        assert_eq!(s.dri_income, usd(60));
        assert_eq!(s.entries, 4);
        assert_eq!(s.net_earnings(), (usd(75) - usd(19)) as i128);
    }
}
