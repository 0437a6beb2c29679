//! Premium entitlement collaborators
//!
//! The vote core only asks one question: is this user premium? Free-tier
//! bootstrap accounting (distinct matchups this week) lives in the ledger,
//! because it is a count over the `votes` table.

use crate::db::Database;
use crate::error::StoreError;
use crate::model::UserId;
use rusqlite::{params, OptionalExtension};
use std::collections::HashSet;
use std::sync::RwLock;

pub trait EntitlementOracle: Send + Sync {
    fn is_premium(&self, user_id: UserId) -> Result<bool, StoreError>;
}

/// In-memory premium set, for tests and single-process deployments
#[derive(Debug, Default)]
pub struct PremiumRoster {
    users: RwLock<HashSet<UserId>>,
}

impl PremiumRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().collect()),
        }
    }

    pub fn grant(&self, user_id: UserId) -> Result<(), StoreError> {
        self.users
            .write()
            .map_err(|_| StoreError::Entitlement("roster lock poisoned".to_string()))?
            .insert(user_id);
        Ok(())
    }

    pub fn revoke(&self, user_id: UserId) -> Result<(), StoreError> {
        self.users
            .write()
            .map_err(|_| StoreError::Entitlement("roster lock poisoned".to_string()))?
            .remove(&user_id);
        Ok(())
    }
}

impl EntitlementOracle for PremiumRoster {
    fn is_premium(&self, user_id: UserId) -> Result<bool, StoreError> {
        let users = self
            .users
            .read()
            .map_err(|_| StoreError::Entitlement("roster lock poisoned".to_string()))?;
        Ok(users.contains(&user_id))
    }
}

/// Reads `user_subscriptions`: premium while status is active/trialing and
/// the current period has not ended.
pub struct SubscriptionOracle {
    db: Database,
    clock: crate::clock::Clock,
}

impl SubscriptionOracle {
    pub fn new(db: Database, clock: crate::clock::Clock) -> Self {
        Self { db, clock }
    }
}

impl EntitlementOracle for SubscriptionOracle {
    fn is_premium(&self, user_id: UserId) -> Result<bool, StoreError> {
        let now = (self.clock)();
        let conn = self.db.lock()?;
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT status, current_period_end FROM user_subscriptions WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(match row {
            Some((status, period_end)) => {
                matches!(status.as_str(), "active" | "trialing")
                    && period_end.map_or(true, |end| end > now)
            }
            None => false,
        })
    }
}
