//! Store: sled-backed persistence for users, investments, ledger, deposits,
//! withdrawals and OTPs.
//!
//! Storage format (one JSON document per key):
//!   Tree "users"        key: user id                  -> User
//!   Tree "user_index"   key: "sponsor:{FX######}"     -> user id
//!                       key: "email:{lowercased}"     -> user id
//!                       key: "mobile:{digits}"        -> user id
//!   Tree "investments"  key: investment id            -> Investment
//!   Tree "ledger"       key: "{micros:020}-{uuid}"    -> LedgerEntry
//!   Tree "deposits"     key: deposit id               -> Deposit
//!   Tree "withdrawals"  key: withdrawal id            -> Withdrawal
//!   Tree "otps"         key: withdrawal id            -> OtpRecord
//!   Tree "jobs"         key: "{job}:{YYYY-MM-DD}"     -> job run marker
//!
//! Every multi-record change goes through [`Store::atomically`], a sled
//! transaction spanning all trees. The closure may be re-run on conflict.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::models::{
    Deposit, Investment, LedgerEntry, OtpRecord, User, UserField, Withdrawal, WithdrawalStatus,
};

const USERS_TREE: &str = "users";
const USER_INDEX_TREE: &str = "user_index";
const INVESTMENTS_TREE: &str = "investments";
const LEDGER_TREE: &str = "ledger";
const DEPOSITS_TREE: &str = "deposits";
const WITHDRAWALS_TREE: &str = "withdrawals";
const OTPS_TREE: &str = "otps";
const JOBS_TREE: &str = "jobs";

pub type TxResult<T> = ConflictableTransactionResult<T, CoreError>;

/// Abort the surrounding transaction with a domain error
pub fn abort<T>(err: CoreError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

fn sponsor_key(sponsor_id: &str) -> String {
    format!("sponsor:{}", sponsor_id)
}

fn email_key(email: &str) -> String {
    format!("email:{}", email.trim().to_lowercase())
}

fn mobile_key(mobile: &str) -> String {
    let digits: String = mobile.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("mobile:{}", digits)
}

fn tx_get<T: DeserializeOwned>(tree: &TransactionalTree, key: &str) -> TxResult<Option<T>> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .or_else(|e| abort(CoreError::Codec(e))),
        None => Ok(None),
    }
}

fn tx_put<T: Serialize>(tree: &TransactionalTree, key: &str, value: &T) -> TxResult<()> {
    let bytes = serde_json::to_vec(value).or_else(|e| abort(CoreError::Codec(e)))?;
    tree.insert(key.as_bytes(), bytes)?;
    Ok(())
}

fn get_json<T: DeserializeOwned>(tree: &Tree, key: &str) -> CoreResult<Option<T>> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn scan_json<T: DeserializeOwned>(tree: &Tree) -> CoreResult<Vec<T>> {
    let mut out = Vec::new();
    for kv in tree.iter() {
        let (_k, v) = kv?;
        out.push(serde_json::from_slice(&v)?);
    }
    Ok(out)
}

/// Transactional view over every tree. Handed to closures run by
/// [`Store::atomically`].
pub struct UnitOfWork<'a> {
    users: &'a TransactionalTree,
    user_index: &'a TransactionalTree,
    investments: &'a TransactionalTree,
    ledger: &'a TransactionalTree,
    deposits: &'a TransactionalTree,
    withdrawals: &'a TransactionalTree,
    otps: &'a TransactionalTree,
    jobs: &'a TransactionalTree,
}

impl UnitOfWork<'_> {
    // ---- users ----

    pub fn user(&self, id: &str) -> TxResult<Option<User>> {
        tx_get(self.users, id)
    }

    pub fn require_user(&self, id: &str) -> TxResult<User> {
        match self.user(id)? {
            Some(u) => Ok(u),
            None => abort(CoreError::UserNotFound(id.to_string())),
        }
    }

    pub fn put_user(&self, user: &User) -> TxResult<()> {
        tx_put(self.users, &user.id, user)
    }

    /// Insert a new user together with its sponsor-id, email and mobile
    /// index entries
    pub fn insert_user(&self, user: &User) -> TxResult<()> {
        self.put_user(user)?;
        self.user_index
            .insert(sponsor_key(&user.own_sponsor_id).as_bytes(), user.id.as_bytes())?;
        self.user_index
            .insert(email_key(&user.email).as_bytes(), user.id.as_bytes())?;
        self.user_index
            .insert(mobile_key(&user.mobile).as_bytes(), user.id.as_bytes())?;
        Ok(())
    }

    fn index_lookup(&self, key: &str) -> TxResult<Option<String>> {
        Ok(self
            .user_index
            .get(key.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    pub fn user_id_by_sponsor_id(&self, sponsor_id: &str) -> TxResult<Option<String>> {
        self.index_lookup(&sponsor_key(sponsor_id))
    }

    pub fn user_id_by_email(&self, email: &str) -> TxResult<Option<String>> {
        self.index_lookup(&email_key(email))
    }

    pub fn user_id_by_mobile(&self, mobile: &str) -> TxResult<Option<String>> {
        self.index_lookup(&mobile_key(mobile))
    }

    /// Apply signed deltas to a user's counters/balances atomically with the
    /// rest of the unit of work. Returns the updated record.
    pub fn increment_user_fields(&self, id: &str, deltas: &[(UserField, i128)]) -> TxResult<User> {
        let mut user = self.require_user(id)?;
        for (field, delta) in deltas {
            if let Err(e) = user.apply_delta(*field, *delta) {
                return abort(e);
            }
        }
        self.put_user(&user)?;
        Ok(user)
    }

    // ---- investments ----

    pub fn investment(&self, id: &str) -> TxResult<Option<Investment>> {
        tx_get(self.investments, id)
    }

    pub fn put_investment(&self, investment: &Investment) -> TxResult<()> {
        tx_put(self.investments, &investment.id, investment)
    }

    // ---- ledger ----

    /// Journal one balance change. Entries are never rewritten.
    pub fn append_entry(&self, entry: &LedgerEntry) -> TxResult<()> {
        tx_put(self.ledger, &entry.storage_key(), entry)
    }

    // ---- deposits ----

    pub fn deposit(&self, id: &str) -> TxResult<Option<Deposit>> {
        tx_get(self.deposits, id)
    }

    pub fn put_deposit(&self, deposit: &Deposit) -> TxResult<()> {
        tx_put(self.deposits, &deposit.id, deposit)
    }

    // ---- withdrawals / otps ----

    pub fn withdrawal(&self, id: &str) -> TxResult<Option<Withdrawal>> {
        tx_get(self.withdrawals, id)
    }

    pub fn put_withdrawal(&self, withdrawal: &Withdrawal) -> TxResult<()> {
        tx_put(self.withdrawals, &withdrawal.id, withdrawal)
    }

    pub fn remove_withdrawal(&self, id: &str) -> TxResult<()> {
        self.withdrawals.remove(id.as_bytes())?;
        Ok(())
    }

    pub fn otp(&self, withdrawal_id: &str) -> TxResult<Option<OtpRecord>> {
        tx_get(self.otps, withdrawal_id)
    }

    pub fn put_otp(&self, otp: &OtpRecord) -> TxResult<()> {
        tx_put(self.otps, &otp.withdrawal_id, otp)
    }

    pub fn remove_otp(&self, withdrawal_id: &str) -> TxResult<()> {
        self.otps.remove(withdrawal_id.as_bytes())?;
        Ok(())
    }

    // ---- job markers ----

    pub fn job_marker<T: DeserializeOwned>(&self, key: &str) -> TxResult<Option<T>> {
        tx_get(self.jobs, key)
    }

    pub fn set_job_marker<T: Serialize>(&self, key: &str, value: &T) -> TxResult<()> {
        tx_put(self.jobs, key, value)
    }
}

/// Handle to the platform database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    db: Db,
    users: Tree,
    user_index: Tree,
    investments: Tree,
    ledger: Tree,
    deposits: Tree,
    withdrawals: Tree,
    otps: Tree,
    jobs: Tree,
}

impl Store {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop
    pub fn temporary() -> CoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    pub fn from_db(db: Db) -> CoreResult<Self> {
        Ok(Self {
            users: db.open_tree(USERS_TREE)?,
            user_index: db.open_tree(USER_INDEX_TREE)?,
            investments: db.open_tree(INVESTMENTS_TREE)?,
            ledger: db.open_tree(LEDGER_TREE)?,
            deposits: db.open_tree(DEPOSITS_TREE)?,
            withdrawals: db.open_tree(WITHDRAWALS_TREE)?,
            otps: db.open_tree(OTPS_TREE)?,
            jobs: db.open_tree(JOBS_TREE)?,
            db,
        })
    }

    /// Run `f` as one serializable transaction over every tree. Either all
    /// of its writes land or none do.
    pub fn atomically<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: Fn(&UnitOfWork<'_>) -> TxResult<T>,
    {
        let trees = (
            &self.users,
            &self.user_index,
            &self.investments,
            &self.ledger,
            &self.deposits,
            &self.withdrawals,
            &self.otps,
            &self.jobs,
        );
        trees
            .transaction(
                |(users, user_index, investments, ledger, deposits, withdrawals, otps, jobs)| {
                    let uow = UnitOfWork {
                        users,
                        user_index,
                        investments,
                        ledger,
                        deposits,
                        withdrawals,
                        otps,
                        jobs,
                    };
                    f(&uow)
                },
            )
            .map_err(CoreError::from)
    }

    pub fn flush(&self) -> CoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    // ---- users ----

    pub fn find_user_by_id(&self, id: &str) -> CoreResult<Option<User>> {
        get_json(&self.users, id)
    }

    pub fn require_user(&self, id: &str) -> CoreResult<User> {
        self.find_user_by_id(id)?
            .ok_or_else(|| CoreError::UserNotFound(id.to_string()))
    }

    fn find_user_by_index(&self, key: &str) -> CoreResult<Option<User>> {
        match self.user_index.get(key.as_bytes())? {
            Some(id) => self.find_user_by_id(&String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    pub fn find_user_by_sponsor_id(&self, sponsor_id: &str) -> CoreResult<Option<User>> {
        self.find_user_by_index(&sponsor_key(sponsor_id))
    }

    pub fn find_user_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        self.find_user_by_index(&email_key(email))
    }

    pub fn find_user_by_mobile(&self, mobile: &str) -> CoreResult<Option<User>> {
        self.find_user_by_index(&mobile_key(mobile))
    }

    pub fn user_ids(&self) -> CoreResult<Vec<String>> {
        let mut ids = Vec::new();
        for key in self.users.iter().keys() {
            ids.push(String::from_utf8_lossy(&key?).into_owned());
        }
        Ok(ids)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Standalone atomic increment (its own transaction)
    pub fn increment_user_fields(&self, id: &str, deltas: &[(UserField, i128)]) -> CoreResult<User> {
        self.atomically(|uow| uow.increment_user_fields(id, deltas))
    }

    // ---- investments ----

    pub fn find_investment(&self, id: &str) -> CoreResult<Option<Investment>> {
        get_json(&self.investments, id)
    }

    /// Investments matching `filter`
    pub fn find_investments<F>(&self, filter: F) -> CoreResult<Vec<Investment>>
    where
        F: Fn(&Investment) -> bool,
    {
        let mut all: Vec<Investment> = scan_json(&self.investments)?;
        all.retain(|i| filter(i));
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    /// Active investments matching `filter`
    pub fn find_active_investments<F>(&self, filter: F) -> CoreResult<Vec<Investment>>
    where
        F: Fn(&Investment) -> bool,
    {
        self.find_investments(|i| i.status == crate::models::InvestmentStatus::Active && filter(i))
    }

    pub fn investments_for_user(&self, user_id: &str) -> CoreResult<Vec<Investment>> {
        self.find_investments(|i| i.user_id == user_id)
    }

    // ---- ledger ----

    /// Ledger rows, oldest first
    pub fn ledger_entries(&self) -> CoreResult<Vec<LedgerEntry>> {
        scan_json(&self.ledger)
    }

    pub fn ledger_for_user(&self, user_id: &str) -> CoreResult<Vec<LedgerEntry>> {
        let mut entries = self.ledger_entries()?;
        entries.retain(|e| e.user_id == user_id);
        Ok(entries)
    }

    // ---- deposits ----

    pub fn find_deposit(&self, id: &str) -> CoreResult<Option<Deposit>> {
        get_json(&self.deposits, id)
    }

    pub fn deposits_for_user(&self, user_id: &str) -> CoreResult<Vec<Deposit>> {
        let mut all: Vec<Deposit> = scan_json(&self.deposits)?;
        all.retain(|d| d.user_id == user_id);
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    // ---- withdrawals / otps ----

    pub fn find_withdrawal(&self, id: &str) -> CoreResult<Option<Withdrawal>> {
        get_json(&self.withdrawals, id)
    }

    pub fn withdrawals_where<F>(&self, filter: F) -> CoreResult<Vec<Withdrawal>>
    where
        F: Fn(&Withdrawal) -> bool,
    {
        let mut all: Vec<Withdrawal> = scan_json(&self.withdrawals)?;
        all.retain(|w| filter(w));
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    pub fn withdrawals_with_status(&self, status: WithdrawalStatus) -> CoreResult<Vec<Withdrawal>> {
        self.withdrawals_where(|w| w.status == status)
    }

    pub fn find_otp(&self, withdrawal_id: &str) -> CoreResult<Option<OtpRecord>> {
        get_json(&self.otps, withdrawal_id)
    }

    // ---- job markers ----

    pub fn job_marker<T: DeserializeOwned>(&self, key: &str) -> CoreResult<Option<T>> {
        get_json(&self.jobs, key)
    }
}
