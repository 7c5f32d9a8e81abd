//! Account lock manager.
//!
//! The single writer of `lock_state`. Both admin actions and the
//! detector's auto-lock path go through here, so every transition gets
//! exactly one `lock`/`unlock` audit entry and repeated transitions stay
//! idempotent. Reads go through the same store mutex as writes, which makes
//! the authentication-path lock check strongly consistent.

use tracing::info;

use coffre_core::{Action, LockState};
use coffre_store::{NewActivityEntry, SharedDatabase};

use crate::error::ServerError;

/// Actor recorded for automatic transitions.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Clone)]
pub struct LockManager {
    db: SharedDatabase,
}

impl LockManager {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Lock an account. Idempotent: locking an already-locked account
    /// succeeds, changes nothing, and writes no audit entry.
    ///
    /// Returns whether the state actually changed.
    pub fn lock(&self, email: &str, actor: &str) -> Result<bool, ServerError> {
        let entry = NewActivityEntry::new(email, Action::Lock, format!("locked by {actor}"));
        let changed = self
            .db
            .lock()
            .set_lock_state_with_log(email, LockState::Locked, &entry)?;
        if changed {
            info!(user = %email, actor = %actor, "account locked");
        }
        Ok(changed)
    }

    /// Unlock an account. Same idempotence contract as [`Self::lock`].
    /// Admin-only: callers enforce the role before invoking.
    pub fn unlock(&self, email: &str, actor: &str) -> Result<bool, ServerError> {
        let entry = NewActivityEntry::new(email, Action::Unlock, format!("unlocked by {actor}"));
        let changed = self
            .db
            .lock()
            .set_lock_state_with_log(email, LockState::Active, &entry)?;
        if changed {
            info!(user = %email, actor = %actor, "account unlocked");
        }
        Ok(changed)
    }

    /// Current lock state, read under the store mutex.
    pub fn is_locked(&self, email: &str) -> Result<bool, ServerError> {
        let user = self.db.lock().get_user_by_email(email)?;
        Ok(user.lock_state.is_locked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coffre_core::Role;
    use coffre_store::activity::ActivityFilter;
    use coffre_store::{Database, User};
    use uuid::Uuid;

    fn setup() -> (LockManager, SharedDatabase) {
        let db = SharedDatabase::new(Database::open_in_memory().unwrap());
        db.lock()
            .insert_user(&User {
                id: Uuid::new_v4(),
                email: "c@x.com".to_string(),
                password_hash: "$argon2id$test".to_string(),
                role: Role::User,
                lock_state: LockState::Active,
                created_at: Utc::now(),
            })
            .unwrap();
        (LockManager::new(db.clone()), db)
    }

    #[test]
    fn lock_then_unlock_round_trip() {
        let (locks, _db) = setup();

        assert!(locks.lock("c@x.com", "admin@x.com").unwrap());
        assert!(locks.is_locked("c@x.com").unwrap());

        assert!(locks.unlock("c@x.com", "admin@x.com").unwrap());
        assert!(!locks.is_locked("c@x.com").unwrap());
    }

    #[test]
    fn repeated_transitions_write_one_entry_each() {
        let (locks, db) = setup();

        assert!(locks.lock("c@x.com", SYSTEM_ACTOR).unwrap());
        assert!(!locks.lock("c@x.com", SYSTEM_ACTOR).unwrap());
        assert!(!locks.lock("c@x.com", "admin@x.com").unwrap());

        let entries = db
            .lock()
            .query_entries(&ActivityFilter::default(), 10, 0)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, Action::Lock);
        assert_eq!(entries[0].metadata, "locked by system");
    }

    #[test]
    fn unknown_account_is_not_found() {
        let (locks, _db) = setup();
        assert!(matches!(
            locks.lock("ghost@x.com", SYSTEM_ACTOR),
            Err(ServerError::NotFound(_))
        ));
    }
}
