//! Append-only activity log.
//!
//! Entries are never mutated or deleted. Queries order by
//! `(created_at DESC, id DESC)`; the rowid tie-breaker keeps pagination
//! stable while concurrent writers append.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, types::Value, Connection};

use coffre_core::Action;

use crate::database::Database;
use crate::error::Result;
use crate::models::{
    conv_failure, ts_from_sql, ts_to_sql, ActivityAggregate, ActivityEntry, NewActivityEntry,
};

/// Filter for [`Database::query_entries`]. All fields combine with AND.
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    /// Restrict to a single action type.
    pub action: Option<Action>,
    /// Restrict to entries created on this calendar day (UTC).
    pub date: Option<NaiveDate>,
    /// Restrict to one requester email.
    pub email: Option<String>,
}

/// Append an entry inside the caller's transaction (or on a bare
/// connection). Returns the new entry id.
pub(crate) fn append_entry_tx(conn: &Connection, entry: &NewActivityEntry) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO activity_log (user_email, action, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            entry.user_email,
            entry.action.as_str(),
            entry.metadata,
            ts_to_sql(&Utc::now()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Database {
    /// Append one entry outside any business transaction (login paths).
    pub fn append_entry(&self, entry: &NewActivityEntry) -> Result<i64> {
        Ok(append_entry_tx(self.conn(), entry)?)
    }

    /// Page through the log newest-first with optional filters.
    pub fn query_entries(
        &self,
        filter: &ActivityFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ActivityEntry>> {
        let mut sql = String::from(
            "SELECT id, user_email, action, metadata, created_at FROM activity_log",
        );
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(action) = filter.action {
            clauses.push("action = ?");
            values.push(Value::from(action.as_str().to_string()));
        }
        if let Some(date) = filter.date {
            // created_at is fixed-width RFC-3339; the first 10 chars are the day
            clauses.push("substr(created_at, 1, 10) = ?");
            values.push(Value::from(date.format("%Y-%m-%d").to_string()));
        }
        if let Some(ref email) = filter.email {
            clauses.push("user_email = ?");
            values.push(Value::from(email.clone()));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");
        values.push(Value::from(limit as i64));
        values.push(Value::from(offset as i64));

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Group the log per (user, action) over an optional time range.
    /// Callers sort and threshold the result; the store only aggregates.
    pub fn aggregate_activity(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ActivityAggregate>> {
        let mut sql = String::from(
            "SELECT user_email, action, COUNT(*), MIN(created_at), MAX(created_at)
             FROM activity_log",
        );
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(start) = start {
            clauses.push("created_at >= ?");
            values.push(Value::from(ts_to_sql(&start)));
        }
        if let Some(end) = end {
            clauses.push("created_at <= ?");
            values.push(Value::from(ts_to_sql(&end)));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" GROUP BY user_email, action");

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_aggregate)?;

        let mut aggregates = Vec::new();
        for row in rows {
            aggregates.push(row?);
        }
        Ok(aggregates)
    }

    /// Timestamp of one user's most recent entry of one action, if any.
    pub fn latest_action_time(
        &self,
        email: &str,
        action: Action,
    ) -> Result<Option<DateTime<Utc>>> {
        let latest: Option<String> = self.conn().query_row(
            "SELECT MAX(created_at) FROM activity_log
             WHERE user_email = ?1 AND action = ?2",
            params![email, action.as_str()],
            |row| row.get(0),
        )?;
        match latest {
            Some(s) => {
                let ts = chrono::DateTime::parse_from_rfc3339(&s)?.with_timezone(&Utc);
                Ok(Some(ts))
            }
            None => Ok(None),
        }
    }

    /// Count one user's entries of one action since a point in time.
    pub fn count_entries_since(
        &self,
        email: &str,
        action: Action,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM activity_log
             WHERE user_email = ?1 AND action = ?2 AND created_at >= ?3",
            params![email, action.as_str(), ts_to_sql(&since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActivityEntry> {
    let id: i64 = row.get(0)?;
    let user_email: String = row.get(1)?;
    let action_str: String = row.get(2)?;
    let metadata: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    let action = Action::parse(&action_str)
        .ok_or_else(|| conv_failure(2, format!("unknown action: {action_str}")))?;

    Ok(ActivityEntry {
        id,
        user_email,
        action,
        metadata,
        created_at: ts_from_sql(4, &created_str)?,
    })
}

fn row_to_aggregate(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActivityAggregate> {
    let user_email: String = row.get(0)?;
    let action_str: String = row.get(1)?;
    let count: i64 = row.get(2)?;
    let first_str: String = row.get(3)?;
    let last_str: String = row.get(4)?;

    let action = Action::parse(&action_str)
        .ok_or_else(|| conv_failure(1, format!("unknown action: {action_str}")))?;

    Ok(ActivityAggregate {
        user_email,
        action,
        count,
        first_seen: ts_from_sql(3, &first_str)?,
        last_seen: ts_from_sql(4, &last_str)?,
    })
}
