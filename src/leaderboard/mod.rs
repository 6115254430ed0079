pub mod engine;
pub mod ranking;
pub mod streak;

pub use engine::{next_check_in, DynLeaderboardEngine, LeaderboardEngine, SqliteLeaderboardEngine};
