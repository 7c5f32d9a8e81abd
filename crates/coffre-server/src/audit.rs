//! Audit log service.
//!
//! Business mutations append their audit entry inside the store transaction
//! that commits them; this service covers the standalone paths (login,
//! failed login, download) where there is no surrounding transaction.
//! Transient store failures are retried with backoff before the request is
//! failed, so an action is never silently left unaudited.

use std::time::Duration;

use tracing::warn;

use coffre_store::activity::ActivityFilter;
use coffre_store::{ActivityEntry, NewActivityEntry, SharedDatabase, StoreError};

use crate::error::ServerError;

/// Bounded retry schedule for standalone log appends.
const RECORD_ATTEMPTS: u32 = 3;
const RECORD_BACKOFF_BASE: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct AuditLog {
    db: SharedDatabase,
}

impl AuditLog {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Append one entry, retrying transient failures. Returns the entry id.
    ///
    /// A `NotFound`/`Conflict` from the store would be a programming error
    /// here and is not retried; everything else gets `RECORD_ATTEMPTS`
    /// tries before surfacing as `Unavailable`.
    pub async fn record(&self, entry: &NewActivityEntry) -> Result<i64, ServerError> {
        let mut last_err: Option<StoreError> = None;

        for attempt in 0..RECORD_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(RECORD_BACKOFF_BASE * 2u32.pow(attempt - 1)).await;
            }

            match self.db.lock().append_entry(entry) {
                Ok(id) => return Ok(id),
                Err(e @ (StoreError::NotFound | StoreError::Conflict(_))) => {
                    return Err(ServerError::from(e));
                }
                Err(e) => {
                    warn!(
                        attempt,
                        user = %entry.user_email,
                        action = %entry.action,
                        error = %e,
                        "audit append failed, retrying"
                    );
                    last_err = Some(e);
                }
            }
        }

        let e = last_err.expect("at least one attempt ran");
        warn!(user = %entry.user_email, action = %entry.action, error = %e, "audit append exhausted retries");
        Err(ServerError::Unavailable("audit log write failed".to_string()))
    }

    /// Page through the log newest-first with optional filters.
    pub fn query(
        &self,
        filter: &ActivityFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ActivityEntry>, ServerError> {
        Ok(self.db.lock().query_entries(filter, limit, offset)?)
    }
}
