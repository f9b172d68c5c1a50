pub mod rewards;
pub mod server;

pub use rewards::{DasTier, LevelRate, RewardSchedule, SMARTLINE_DEPTH};
pub use server::ServerConfig;
