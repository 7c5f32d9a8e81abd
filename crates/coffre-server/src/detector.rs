//! Suspicious-activity detector.
//!
//! Derives per-(user, action) aggregates from the activity log and compares
//! them against the configured thresholds. Counts are recomputed from the
//! log on demand, so an entry can never be double-counted. The detector is
//! observational: it never fails the request that triggered it, and the
//! actual lock mutation stays with [`crate::locks::LockManager`].

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use coffre_core::Action;
use coffre_store::{ActivityAggregate, SharedDatabase};

use crate::config::DetectorConfig;
use crate::error::ServerError;
use crate::locks::{LockManager, SYSTEM_ACTOR};

#[derive(Clone)]
pub struct SuspiciousDetector {
    db: SharedDatabase,
    config: DetectorConfig,
}

impl SuspiciousDetector {
    pub fn new(db: SharedDatabase, config: DetectorConfig) -> Self {
        Self { db, config }
    }

    /// First watched action whose trailing-window count has reached its
    /// threshold for this user, if any.
    ///
    /// An admin unlock resets the slate: only entries after the user's most
    /// recent `unlock` count, so a freshly unlocked account is not
    /// immediately re-flagged by pre-unlock history.
    pub fn evaluate(&self, email: &str) -> Result<Option<Action>, ServerError> {
        let now = Utc::now();
        let db = self.db.lock();
        let unlock_floor = db.latest_action_time(email, Action::Unlock)?;

        for action in self.config.watched_actions() {
            let t = self
                .config
                .threshold_for(action)
                .expect("watched actions always carry a threshold");
            let mut since = now - Duration::seconds(t.window.as_secs() as i64);
            if let Some(floor) = unlock_floor {
                since = since.max(floor);
            }
            let count = db.count_entries_since(email, action, since)?;
            if count >= t.threshold as i64 {
                return Ok(Some(action));
            }
        }
        Ok(None)
    }

    /// Pure threshold check consulted on the authentication path.
    pub fn is_suspicious(&self, email: &str) -> Result<bool, ServerError> {
        Ok(self.evaluate(email)?.is_some())
    }

    /// Threshold-exceeding aggregates over an optional date range, sorted
    /// by count descending, ties broken by last_seen descending.
    pub fn summarize(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ActivityAggregate>, ServerError> {
        let mut aggregates: Vec<ActivityAggregate> = self
            .db
            .lock()
            .aggregate_activity(start, end)?
            .into_iter()
            .filter(|agg| {
                self.config
                    .threshold_for(agg.action)
                    .is_some_and(|t| agg.count >= t.threshold as i64)
            })
            .collect();

        aggregates.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
        });

        Ok(aggregates
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    /// Lock the account when a threshold is crossed. Best-effort: called
    /// after an audited action commits, and never fails the caller.
    pub fn enforce_auto_lock(&self, email: &str, locks: &LockManager) {
        match self.evaluate(email) {
            Ok(Some(action)) => {
                let actor = format!("{SYSTEM_ACTOR}: {action} threshold");
                if let Err(e) = locks.lock(email, &actor) {
                    warn!(user = %email, error = %e, "auto-lock failed");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(user = %email, error = %e, "suspicious-activity evaluation failed");
            }
        }
    }
}
