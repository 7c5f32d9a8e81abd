//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` so it can be handed directly to the HTTP
//! layer; enums come from `coffre-core` and are stored as their wire strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use coffre_core::{Action, LockState, Permission, Role};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account. Emails are unique case-insensitively and stored
/// lowercased.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Unique user identifier.
    pub id: Uuid,
    pub email: String,
    /// Argon2id PHC string. Never serialized to API responses.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    /// Mutated only by the account-lock manager.
    pub lock_state: LockState,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// File metadata
// ---------------------------------------------------------------------------

/// Metadata for a stored file. The encrypted content is kept on disk in the
/// vault directory, keyed by `id`; listings never carry content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    /// Unique file identifier, also the vault blob name.
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Original file name, unique per owner.
    pub file_name: String,
    /// MIME type as reported at upload.
    pub file_type: String,
    /// Plaintext size in bytes.
    pub size: i64,
    /// BLAKE3 hash of the plaintext (hex), re-checked on download.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Share grant
// ---------------------------------------------------------------------------

/// A (file, grantee, permission) authorization record distinct from
/// ownership. At most one grant exists per (file, grantee); re-sharing
/// replaces the permission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShareGrant {
    pub file_id: Uuid,
    pub grantor_id: Uuid,
    pub grantee_email: String,
    pub permission: Permission,
    pub created_at: DateTime<Utc>,
}

/// A file visible to a grantee, joined with its grant and owner for listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SharedFileView {
    pub file_id: Uuid,
    pub file_name: String,
    pub file_type: String,
    pub size: i64,
    pub owner_email: String,
    pub permission: Permission,
    pub shared_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Activity log
// ---------------------------------------------------------------------------

/// One immutable entry of the append-only activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityEntry {
    /// Monotonic row id; ties on `created_at` break by id.
    pub id: i64,
    pub user_email: String,
    pub action: Action,
    /// Free-form descriptive string (file name, recipient, failure reason).
    pub metadata: String,
    pub created_at: DateTime<Utc>,
}

/// A log entry about to be appended; the store stamps id and timestamp.
#[derive(Debug, Clone)]
pub struct NewActivityEntry {
    pub user_email: String,
    pub action: Action,
    pub metadata: String,
}

impl NewActivityEntry {
    pub fn new(user_email: impl Into<String>, action: Action, metadata: impl Into<String>) -> Self {
        Self {
            user_email: user_email.into(),
            action,
            metadata: metadata.into(),
        }
    }
}

/// Per-(user, action) rollup derived from the activity log. Never persisted;
/// recomputed from the log on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityAggregate {
    pub user_email: String,
    pub action: Action,
    pub count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// SQL conversion helpers shared by the row converters
// ---------------------------------------------------------------------------

/// Fixed-width RFC-3339 (microseconds, `Z` suffix) so that textual ordering
/// of stored timestamps matches chronological ordering.
pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn ts_from_sql(col: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn uuid_from_sql(col: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn conv_failure(col: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, msg.into())
}
