//! Stored records shared by the store and the engine components.

pub mod deposit;
pub mod investment;
pub mod ledger;
pub mod user;
pub mod withdrawal;

pub use deposit::{Deposit, DepositStatus};
pub use investment::{Investment, InvestmentStatus, PackageType};
pub use ledger::{EntryStatus, EntryType, LedgerEntry};
pub use user::{DasState, DasTaskState, Profile, User, UserField, UserView, DAS_TIERS};
pub use withdrawal::{
    AdminDecision, OtpPurpose, OtpRecord, Withdrawal, WithdrawalEvent, WithdrawalStatus,
};
