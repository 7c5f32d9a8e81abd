//! Read-only operator rollups over files and share grants.
//!
//! Everything is computed inside one transaction so a single caller never
//! observes partial counts while writers commit concurrently.

use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::Result;

/// One (email, count) row of a per-user rollup, sorted count-descending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserCount {
    pub email: String,
    pub count: i64,
}

/// Snapshot-consistent operator statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminStats {
    pub total_uploads: i64,
    pub total_shares: i64,
    pub uploads_per_user: Vec<UserCount>,
    pub shares_per_user: Vec<UserCount>,
}

impl Database {
    /// Compute the admin dashboard rollup under a read-consistent snapshot.
    pub fn admin_stats(&mut self) -> Result<AdminStats> {
        let tx = self.conn_mut().transaction()?;

        let total_uploads: i64 =
            tx.query_row("SELECT COUNT(*) FROM files", params![], |row| row.get(0))?;
        let total_shares: i64 =
            tx.query_row("SELECT COUNT(*) FROM share_grants", params![], |row| {
                row.get(0)
            })?;

        let uploads_per_user = per_user_counts(
            &tx,
            "SELECT u.email, COUNT(f.id) AS n
             FROM users u
             LEFT JOIN files f ON f.owner_id = u.id
             WHERE u.role = 'user'
             GROUP BY u.email
             ORDER BY n DESC, u.email ASC",
        )?;
        let shares_per_user = per_user_counts(
            &tx,
            "SELECT u.email, COUNT(sg.file_id) AS n
             FROM users u
             LEFT JOIN files f ON f.owner_id = u.id
             LEFT JOIN share_grants sg ON sg.file_id = f.id
             WHERE u.role = 'user'
             GROUP BY u.email
             ORDER BY n DESC, u.email ASC",
        )?;

        tx.commit()?;

        Ok(AdminStats {
            total_uploads,
            total_shares,
            uploads_per_user,
            shares_per_user,
        })
    }
}

fn per_user_counts(conn: &rusqlite::Connection, sql: &str) -> Result<Vec<UserCount>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![], |row| {
        Ok(UserCount {
            email: row.get(0)?,
            count: row.get(1)?,
        })
    })?;

    let mut counts = Vec::new();
    for row in rows {
        counts.push(row?);
    }
    Ok(counts)
}
