//! Typed wrappers over individual portal endpoints
//!
//! Each group is a short-lived handle borrowed from a
//! [`Portal`](crate::Portal), so every call goes through the session's
//! gateway and benefits from transparent credential refresh.

mod bucket;
mod leaderboard;
mod user;

pub use bucket::Buckets;
pub use leaderboard::{Leaderboard, LeaderboardEntry};
pub use user::{AccountType, UserProfile, UserType, Users};
