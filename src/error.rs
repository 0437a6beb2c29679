//! Error taxonomy for the vote core
//!
//! Two layers:
//! - [`StoreError`]: infrastructure failures (SQLite, I/O, poisoned handle).
//! - [`VoteRejection`]: caller-visible refusals with a stable machine code,
//!   a human message and a details bag. Rendered as
//!   `{"error": {"code", "message", "details"}}` with the HTTP-equivalent
//!   status from [`ErrorCode::http_status`].

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database connection lock poisoned")]
    LockPoisoned,
    #[error("schema directory not found: {0}")]
    SchemaNotFound(String),
    #[error("entitlement lookup failed: {0}")]
    Entitlement(String),
}

/// Stable rejection codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthRequired,
    PremiumRequired,
    FreeLimitReached,
    VoteRequired,
    MatchupNotFound,
    ToolNotFound,
    MatchupInactive,
    VoteLocked,
    ExistingVotesUsePatch,
    InvalidPayload,
    InvalidCategory,
    InvalidWinner,
    DuplicateCategory,
    NewVoteViaPatch,
    SameTool,
    InvalidAlignment,
    InvalidSort,
    RateLimited,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::PremiumRequired => "PREMIUM_REQUIRED",
            ErrorCode::FreeLimitReached => "FREE_LIMIT_REACHED",
            ErrorCode::VoteRequired => "VOTE_REQUIRED",
            ErrorCode::MatchupNotFound => "MATCHUP_NOT_FOUND",
            ErrorCode::ToolNotFound => "TOOL_NOT_FOUND",
            ErrorCode::MatchupInactive => "MATCHUP_INACTIVE",
            ErrorCode::VoteLocked => "VOTE_LOCKED",
            ErrorCode::ExistingVotesUsePatch => "EXISTING_VOTES_USE_PATCH",
            ErrorCode::InvalidPayload => "INVALID_PAYLOAD",
            ErrorCode::InvalidCategory => "INVALID_CATEGORY",
            ErrorCode::InvalidWinner => "INVALID_WINNER",
            ErrorCode::DuplicateCategory => "DUPLICATE_CATEGORY",
            ErrorCode::NewVoteViaPatch => "NEW_VOTE_VIA_PATCH",
            ErrorCode::SameTool => "SAME_TOOL",
            ErrorCode::InvalidAlignment => "INVALID_ALIGNMENT",
            ErrorCode::InvalidSort => "INVALID_SORT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::AuthRequired => 401,
            ErrorCode::PremiumRequired | ErrorCode::FreeLimitReached | ErrorCode::VoteRequired => {
                403
            }
            ErrorCode::MatchupNotFound | ErrorCode::ToolNotFound => 404,
            ErrorCode::MatchupInactive
            | ErrorCode::VoteLocked
            | ErrorCode::ExistingVotesUsePatch => 409,
            ErrorCode::InvalidPayload
            | ErrorCode::InvalidCategory
            | ErrorCode::InvalidWinner
            | ErrorCode::DuplicateCategory
            | ErrorCode::NewVoteViaPatch
            | ErrorCode::SameTool
            | ErrorCode::InvalidAlignment
            | ErrorCode::InvalidSort => 400,
            ErrorCode::RateLimited => 429,
            ErrorCode::InternalError => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A refusal surfaced to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct VoteRejection {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
}

impl VoteRejection {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: json!({}),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn status(&self) -> u16 {
        self.code.http_status()
    }

    /// `{"error": {"code", "message", "details"}}`
    pub fn envelope(&self) -> Value {
        json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
            }
        })
    }

    /// Catch-all for persistence failures; the underlying error text stays in the log.
    pub fn internal() -> Self {
        Self::new(ErrorCode::InternalError, "An unexpected error occurred")
    }
}

impl fmt::Display for VoteRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for VoteRejection {}

/// Outcome error of a submit/edit/cast call
#[derive(Debug, thiserror::Error)]
pub enum VoteError {
    #[error("vote rejected: {0}")]
    Rejected(VoteRejection),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl VoteError {
    pub fn rejection(&self) -> Option<&VoteRejection> {
        match self {
            VoteError::Rejected(r) => Some(r),
            VoteError::Store(_) => None,
        }
    }

    /// Caller-facing view; store failures collapse to `INTERNAL_ERROR`
    pub fn to_rejection(&self) -> VoteRejection {
        match self {
            VoteError::Rejected(r) => r.clone(),
            VoteError::Store(_) => VoteRejection::internal(),
        }
    }
}

impl From<VoteRejection> for VoteError {
    fn from(r: VoteRejection) -> Self {
        VoteError::Rejected(r)
    }
}

impl From<rusqlite::Error> for VoteError {
    fn from(e: rusqlite::Error) -> Self {
        VoteError::Store(StoreError::Sqlite(e))
    }
}

impl From<serde_json::Error> for VoteError {
    fn from(e: serde_json::Error) -> Self {
        VoteError::Store(StoreError::Serialization(e))
    }
}

/// Matchup Registry failures
#[derive(Debug, thiserror::Error)]
pub enum MatchupError {
    #[error("a matchup needs two different posts")]
    InvalidPair,
    #[error("post not found: {0}")]
    PostNotFound(i64),
    #[error("both posts belong to tool {0}")]
    SameTool(i64),
    #[error("tool {tool_id} is {status}, not active")]
    ToolInactive { tool_id: i64, status: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for MatchupError {
    fn from(e: rusqlite::Error) -> Self {
        MatchupError::Store(StoreError::Sqlite(e))
    }
}
