use rusqlite::params;
use uuid::Uuid;

use coffre_core::{Action, LockState, Role};

use crate::activity::append_entry_tx;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{conv_failure, ts_from_sql, ts_to_sql, uuid_from_sql, NewActivityEntry, User};

impl Database {
    /// Insert a new account. Fails with [`StoreError::Conflict`] when the
    /// email (case-insensitively) already exists.
    pub fn insert_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO users (id, email, password_hash, role, is_locked, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id.to_string(),
                user.email,
                user.password_hash,
                user.role.as_str(),
                user.lock_state.is_locked() as i32,
                ts_to_sql(&user.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict(format!(
                    "email already registered: {}",
                    user.email
                )))
            }
            Err(other) => Err(StoreError::Sqlite(other)),
        }
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, email, password_hash, role, is_locked, created_at
                 FROM users WHERE email = ?1",
                params![email],
                row_to_user,
            )
            .map_err(not_found)
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, email, password_hash, role, is_locked, created_at
                 FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .map_err(not_found)
    }

    /// Transition an account's lock state, appending the matching
    /// `lock`/`unlock` audit entry in the same transaction.
    ///
    /// Returns `false` without writing anything when the account is already
    /// in the requested state, so repeated calls stay idempotent and never
    /// duplicate audit entries.
    pub fn set_lock_state_with_log(
        &mut self,
        email: &str,
        state: LockState,
        entry: &NewActivityEntry,
    ) -> Result<bool> {
        let current = self.get_user_by_email(email)?.lock_state;
        if current == state {
            return Ok(false);
        }

        debug_assert!(matches!(entry.action, Action::Lock | Action::Unlock));

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "UPDATE users SET is_locked = ?1 WHERE email = ?2",
            params![state.is_locked() as i32, email],
        )?;
        append_entry_tx(&tx, entry)?;
        tx.commit()?;
        Ok(true)
    }

    /// List accounts ordered by email, optionally restricted to one role.
    pub fn list_users(&self, role: Option<Role>, limit: u32, offset: u32) -> Result<Vec<User>> {
        let mut users = Vec::new();
        match role {
            Some(r) => {
                let mut stmt = self.conn().prepare(
                    "SELECT id, email, password_hash, role, is_locked, created_at
                     FROM users WHERE role = ?1 ORDER BY email LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt.query_map(params![r.as_str(), limit, offset], row_to_user)?;
                for row in rows {
                    users.push(row?);
                }
            }
            None => {
                let mut stmt = self.conn().prepare(
                    "SELECT id, email, password_hash, role, is_locked, created_at
                     FROM users ORDER BY email LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt.query_map(params![limit, offset], row_to_user)?;
                for row in rows {
                    users.push(row?);
                }
            }
        }
        Ok(users)
    }

    /// Substring search over non-admin account emails.
    pub fn search_users(&self, query: &str, limit: u32, offset: u32) -> Result<Vec<User>> {
        let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
        let mut stmt = self.conn().prepare(
            "SELECT id, email, password_hash, role, is_locked, created_at
             FROM users
             WHERE role = 'user' AND email LIKE ?1 ESCAPE '\\'
             ORDER BY email LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![pattern, limit, offset], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

fn not_found(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let email: String = row.get(1)?;
    let password_hash: String = row.get(2)?;
    let role_str: String = row.get(3)?;
    let is_locked: i32 = row.get(4)?;
    let created_str: String = row.get(5)?;

    let role = Role::parse(&role_str)
        .ok_or_else(|| conv_failure(3, format!("unknown role: {role_str}")))?;

    Ok(User {
        id: uuid_from_sql(0, &id_str)?,
        email,
        password_hash,
        role,
        lock_state: if is_locked != 0 {
            LockState::Locked
        } else {
            LockState::Active
        },
        created_at: ts_from_sql(5, &created_str)?,
    })
}
