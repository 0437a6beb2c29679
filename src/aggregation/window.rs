//! 7-day / previous-7-day windows and trend classification

use crate::model::Trend;

pub const WEEK_SECS: i64 = 7 * 86_400;

/// Either window below this many votes → `stable`
pub const TREND_MIN_VOTES: i64 = 5;

/// Win-rate delta (fraction) that counts as a move
pub const TREND_THRESHOLD: f64 = 0.05;

/// Which window a vote falls in, relative to `now`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Last7d,
    Prev7d,
    Older,
}

impl Bucket {
    pub fn of(voted_at: i64, now: i64) -> Bucket {
        if voted_at >= now - WEEK_SECS {
            Bucket::Last7d
        } else if voted_at >= now - 2 * WEEK_SECS {
            Bucket::Prev7d
        } else {
            Bucket::Older
        }
    }
}

/// Votes/wins counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub votes: i64,
    pub wins: i64,
}

impl Tally {
    pub fn add(&mut self, votes: i64, won: bool) {
        self.votes += votes;
        if won {
            self.wins += votes;
        }
    }

    pub fn rate(&self) -> Option<f64> {
        if self.votes > 0 {
            Some(self.wins as f64 / self.votes as f64)
        } else {
            None
        }
    }
}

/// All-time plus the two 7-day windows for one subject
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Windowed {
    pub total: Tally,
    pub last_7d: Tally,
    pub prev_7d: Tally,
}

impl Windowed {
    pub fn add(&mut self, bucket: Bucket, votes: i64, won: bool) {
        self.total.add(votes, won);
        match bucket {
            Bucket::Last7d => self.last_7d.add(votes, won),
            Bucket::Prev7d => self.prev_7d.add(votes, won),
            Bucket::Older => {}
        }
    }

    pub fn trend(&self) -> Trend {
        trend(self.last_7d, self.prev_7d)
    }
}

/// `up`/`down` when the 7-day win rate moved more than 5 points against the
/// previous 7 days, `stable` otherwise or when either window is too thin.
pub fn trend(current: Tally, previous: Tally) -> Trend {
    if current.votes < TREND_MIN_VOTES || previous.votes < TREND_MIN_VOTES {
        return Trend::Stable;
    }
    match (current.rate(), previous.rate()) {
        (Some(cur), Some(prev)) if cur - prev > TREND_THRESHOLD => Trend::Up,
        (Some(cur), Some(prev)) if prev - cur > TREND_THRESHOLD => Trend::Down,
        _ => Trend::Stable,
    }
}
