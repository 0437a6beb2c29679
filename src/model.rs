//! Domain types shared by the registry, ledger, pipelines and aggregates
//!
//! All timestamps are Unix seconds (UTC). Enums are stored in SQLite as their
//! lowercase string form and round-trip through `ToSql`/`FromSql`.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type UserId = i64;
pub type ToolId = i64;
pub type PostId = i64;
pub type MatchupId = i64;
pub type VoteId = i64;

/// Implements string storage for a C-like enum with `as_str`/`FromStr`.
macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                s.parse()
                    .map_err(|_| FromSqlError::Other(format!("unknown value: {}", s).into()))
            }
        }
    };
}

/// One of the five fixed judgment axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    WritingQuality,
    Accuracy,
    Creativity,
    Usefulness,
    Overall,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::WritingQuality,
        Category::Accuracy,
        Category::Creativity,
        Category::Usefulness,
        Category::Overall,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::WritingQuality => "writing_quality",
            Category::Accuracy => "accuracy",
            Category::Creativity => "creativity",
            Category::Usefulness => "usefulness",
            Category::Overall => "overall",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

sql_text_enum!(Category);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchupStatus {
    Active,
    Archived,
    Draft,
}

impl MatchupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchupStatus::Active => "active",
            MatchupStatus::Archived => "archived",
            MatchupStatus::Draft => "draft",
        }
    }
}

impl FromStr for MatchupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MatchupStatus::Active),
            "archived" => Ok(MatchupStatus::Archived),
            "draft" => Ok(MatchupStatus::Draft),
            other => Err(other.to_string()),
        }
    }
}

sql_text_enum!(MatchupStatus);

/// Tool lifecycle. `Pending` tools are announced but not launched yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Active,
    Pending,
    Inactive,
}

impl ToolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolStatus::Active => "active",
            ToolStatus::Pending => "pending",
            ToolStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for ToolStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ToolStatus::Active),
            "pending" => Ok(ToolStatus::Pending),
            "inactive" => Ok(ToolStatus::Inactive),
            other => Err(other.to_string()),
        }
    }
}

sql_text_enum!(ToolStatus);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
    New,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
            Trend::New => "new",
        }
    }

    /// What the opponent sees when this side trends
    pub fn mirror(self) -> Trend {
        match self {
            Trend::Up => Trend::Down,
            Trend::Down => Trend::Up,
            other => other,
        }
    }
}

impl FromStr for Trend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Trend::Up),
            "down" => Ok(Trend::Down),
            "stable" => Ok(Trend::Stable),
            "new" => Ok(Trend::New),
            other => Err(other.to_string()),
        }
    }
}

sql_text_enum!(Trend);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Tier by total votes: high >= 100, medium >= 30
    pub fn from_votes(total: i64) -> Confidence {
        if total >= 100 {
            Confidence::High
        } else if total >= 30 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            other => Err(other.to_string()),
        }
    }
}

sql_text_enum!(Confidence);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteEventType {
    Submit,
    Edit,
    Reject,
    Lock,
}

impl VoteEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteEventType::Submit => "submit",
            VoteEventType::Edit => "edit",
            VoteEventType::Reject => "reject",
            VoteEventType::Lock => "lock",
        }
    }
}

impl FromStr for VoteEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submit" => Ok(VoteEventType::Submit),
            "edit" => Ok(VoteEventType::Edit),
            "reject" => Ok(VoteEventType::Reject),
            "lock" => Ok(VoteEventType::Lock),
            other => Err(other.to_string()),
        }
    }
}

sql_text_enum!(VoteEventType);

/// A stored pairing of two posts in canonical order (`tool_a < tool_b`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Matchup {
    pub matchup_id: MatchupId,
    pub post_a_id: PostId,
    pub post_b_id: PostId,
    pub tool_a: ToolId,
    pub tool_b: ToolId,
    pub prompt_id: Option<i64>,
    pub position_seed: i64,
    pub status: MatchupStatus,
    pub is_pinned: bool,
    pub created_at: i64,
}

impl Matchup {
    pub const COLUMNS: &'static str = "matchup_id, post_a_id, post_b_id, tool_a, tool_b, \
         prompt_id, position_seed, status, is_pinned, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            matchup_id: row.get(0)?,
            post_a_id: row.get(1)?,
            post_b_id: row.get(2)?,
            tool_a: row.get(3)?,
            tool_b: row.get(4)?,
            prompt_id: row.get(5)?,
            position_seed: row.get(6)?,
            status: row.get(7)?,
            is_pinned: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    pub fn has_tool(&self, tool_id: ToolId) -> bool {
        tool_id == self.tool_a || tool_id == self.tool_b
    }
}

/// A matchup joined with tool names and post titles for display
#[derive(Debug, Clone, Serialize)]
pub struct MatchupView {
    #[serde(flatten)]
    pub matchup: Matchup,
    pub tool_a_name: String,
    pub tool_a_slug: String,
    pub tool_b_name: String,
    pub tool_b_slug: String,
    pub title_a: String,
    pub title_b: String,
}

/// One user's judgment for one category of one matchup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vote {
    pub vote_id: VoteId,
    pub user_id: UserId,
    pub matchup_id: MatchupId,
    pub category: Category,
    pub winner_tool: ToolId,
    pub position_a_was_left: bool,
    pub voted_at: i64,
    pub locked: bool,
}

impl Vote {
    pub const COLUMNS: &'static str =
        "vote_id, user_id, matchup_id, category, winner_tool, position_a_was_left, voted_at, locked";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            vote_id: row.get(0)?,
            user_id: row.get(1)?,
            matchup_id: row.get(2)?,
            category: row.get(3)?,
            winner_tool: row.get(4)?,
            position_a_was_left: row.get(5)?,
            voted_at: row.get(6)?,
            locked: row.get(7)?,
        })
    }
}

/// Raw `{category, winner_tool}` entry as received from a client.
///
/// Kept untyped so validation can report `INVALID_CATEGORY` /
/// `INVALID_WINNER` with the offending value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub category: String,
    pub winner_tool: Option<ToolId>,
}

impl VoteRequest {
    pub fn new(category: impl Into<String>, winner_tool: ToolId) -> Self {
        Self {
            category: category.into(),
            winner_tool: Some(winner_tool),
        }
    }
}

/// `{category, winner: "left"|"right"}` as sent by the comparison UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideVote {
    pub category: String,
    pub winner: String,
}

/// Client telemetry stored with audit events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_time_seconds: Option<f64>,
}

/// Row of `tool_stats`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolStats {
    pub tool_id: ToolId,
    pub category: Category,
    pub total_votes: i64,
    pub total_wins: i64,
    pub win_rate: Option<f64>,
    pub votes_7d: i64,
    pub wins_7d: i64,
    pub win_rate_7d: Option<f64>,
    pub votes_prev_7d: i64,
    pub wins_prev_7d: i64,
    pub win_rate_prev_7d: Option<f64>,
    pub trend: Trend,
    pub computed_at: i64,
}

impl ToolStats {
    pub const COLUMNS: &'static str = "tool_id, category, total_votes, total_wins, win_rate, \
         votes_7d, wins_7d, win_rate_7d, votes_prev_7d, wins_prev_7d, win_rate_prev_7d, \
         trend, computed_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tool_id: row.get(0)?,
            category: row.get(1)?,
            total_votes: row.get(2)?,
            total_wins: row.get(3)?,
            win_rate: row.get(4)?,
            votes_7d: row.get(5)?,
            wins_7d: row.get(6)?,
            win_rate_7d: row.get(7)?,
            votes_prev_7d: row.get(8)?,
            wins_prev_7d: row.get(9)?,
            win_rate_prev_7d: row.get(10)?,
            trend: row.get(11)?,
            computed_at: row.get(12)?,
        })
    }
}

/// Row of `h2h_stats` (side A is the lower tool id)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct H2HStats {
    pub tool_a: ToolId,
    pub tool_b: ToolId,
    pub category: Category,
    pub total_votes: i64,
    pub tool_a_wins: i64,
    pub tool_b_wins: i64,
    pub tool_a_win_rate: Option<f64>,
    pub tool_b_win_rate: Option<f64>,
    pub votes_7d: i64,
    pub tool_a_wins_7d: i64,
    pub votes_prev_7d: i64,
    pub tool_a_wins_prev_7d: i64,
    pub confidence: Confidence,
    pub tool_a_trend: Trend,
    pub tool_b_trend: Trend,
    pub computed_at: i64,
}

impl H2HStats {
    pub const COLUMNS: &'static str = "tool_a, tool_b, category, total_votes, tool_a_wins, \
         tool_b_wins, tool_a_win_rate, tool_b_win_rate, votes_7d, tool_a_wins_7d, \
         votes_prev_7d, tool_a_wins_prev_7d, confidence, tool_a_trend, tool_b_trend, computed_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tool_a: row.get(0)?,
            tool_b: row.get(1)?,
            category: row.get(2)?,
            total_votes: row.get(3)?,
            tool_a_wins: row.get(4)?,
            tool_b_wins: row.get(5)?,
            tool_a_win_rate: row.get(6)?,
            tool_b_win_rate: row.get(7)?,
            votes_7d: row.get(8)?,
            tool_a_wins_7d: row.get(9)?,
            votes_prev_7d: row.get(10)?,
            tool_a_wins_prev_7d: row.get(11)?,
            confidence: row.get(12)?,
            tool_a_trend: row.get(13)?,
            tool_b_trend: row.get(14)?,
            computed_at: row.get(15)?,
        })
    }
}

/// Row of `user_vote_stats`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserVoteStats {
    pub user_id: UserId,
    pub total_votes: i64,
    pub total_matchups: i64,
    pub majority_agreement: i64,
    pub majority_rate: Option<f64>,
    pub favorite_tool_id: Option<ToolId>,
    pub favorite_tool_votes: i64,
    pub most_voted_category: Option<Category>,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_voted_at: Option<i64>,
    pub computed_at: i64,
}

impl UserVoteStats {
    pub const COLUMNS: &'static str = "user_id, total_votes, total_matchups, majority_agreement, \
         majority_rate, favorite_tool_id, favorite_tool_votes, most_voted_category, \
         current_streak, longest_streak, last_voted_at, computed_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            total_votes: row.get(1)?,
            total_matchups: row.get(2)?,
            majority_agreement: row.get(3)?,
            majority_rate: row.get(4)?,
            favorite_tool_id: row.get(5)?,
            favorite_tool_votes: row.get(6)?,
            most_voted_category: row.get(7)?,
            current_streak: row.get(8)?,
            longest_streak: row.get(9)?,
            last_voted_at: row.get(10)?,
            computed_at: row.get(11)?,
        })
    }
}
