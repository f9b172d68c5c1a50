//! FXLine node: referral tree, commission engine, FS investments, DAS
//! milestones and the withdrawal workflow behind one HTTP service.

pub mod amount;
pub mod api;
pub mod config;
pub mod das;
pub mod deposit;
pub mod error;
pub mod investment;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod platform;
pub mod referral;
pub mod rewards;
pub mod scheduler;
pub mod store;
pub mod withdrawal;

pub use error::{CoreError, CoreResult, ErrorKind};
pub use platform::{Platform, PlatformOptions};
pub use store::Store;
