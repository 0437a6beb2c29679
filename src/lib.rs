//! Compare & Vote: blind side-by-side comparisons of AI writing tools
//!
//! Readers judge two posts per matchup across five categories. Votes stay
//! editable for a short window, then lock; locked votes feed the leaderboard,
//! head-to-head and per-user aggregates.

pub mod aggregation;
pub mod api;
pub mod audit;
pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod directory;
pub mod entitlement;
pub mod error;
pub mod joblog;
pub mod ledger;
pub mod model;
pub mod registry;
pub mod scheduler;
pub mod sqlite_pragma;
pub mod voting;

pub use api::{ApiResponse, CompareApi, HistoryQuery};
pub use config::VoteConfig;
pub use db::Database;
pub use error::{ErrorCode, StoreError, VoteError, VoteRejection};
