use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use coffre_core::Permission;

use crate::activity::append_entry_tx;
use crate::database::Database;
use crate::error::Result;
use crate::models::{
    conv_failure, ts_from_sql, ts_to_sql, uuid_from_sql, NewActivityEntry, ShareGrant,
    SharedFileView,
};

impl Database {
    /// Insert or replace the grant for (file, grantee) and append the
    /// `share` audit entry in one transaction. Re-sharing overwrites the
    /// permission; it never duplicates the row.
    pub fn upsert_grant_with_log(
        &mut self,
        grant: &ShareGrant,
        entry: &NewActivityEntry,
    ) -> Result<i64> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO share_grants (file_id, grantor_id, grantee_email, permission, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (file_id, grantee_email)
             DO UPDATE SET permission = excluded.permission",
            params![
                grant.file_id.to_string(),
                grant.grantor_id.to_string(),
                grant.grantee_email,
                grant.permission.as_str(),
                ts_to_sql(&grant.created_at),
            ],
        )?;
        let entry_id = append_entry_tx(&tx, entry)?;
        tx.commit()?;
        Ok(entry_id)
    }

    /// Remove a grant. Returns `false` when nothing existed; revoking a
    /// non-existent grant is a no-op, not an error.
    pub fn revoke_grant(&self, file_id: Uuid, grantee_email: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM share_grants WHERE file_id = ?1 AND grantee_email = ?2",
            params![file_id.to_string(), grantee_email],
        )?;
        Ok(affected > 0)
    }

    pub fn get_grant(&self, file_id: Uuid, grantee_email: &str) -> Result<Option<ShareGrant>> {
        let grant = self
            .conn()
            .query_row(
                "SELECT file_id, grantor_id, grantee_email, permission, created_at
                 FROM share_grants
                 WHERE file_id = ?1 AND grantee_email = ?2",
                params![file_id.to_string(), grantee_email],
                row_to_grant,
            )
            .optional()?;
        Ok(grant)
    }

    /// Every file shared with one grantee, joined with file metadata and the
    /// owner's email, newest grant first. Metadata only.
    pub fn list_shared_with(&self, grantee_email: &str) -> Result<Vec<SharedFileView>> {
        let mut stmt = self.conn().prepare(
            "SELECT f.id, f.file_name, f.file_type, f.size, u.email, sg.permission, sg.created_at
             FROM share_grants sg
             JOIN files f ON f.id = sg.file_id
             JOIN users u ON u.id = f.owner_id
             WHERE sg.grantee_email = ?1
             ORDER BY sg.created_at DESC, f.id",
        )?;
        let rows = stmt.query_map(params![grantee_email], row_to_shared_view)?;

        let mut views = Vec::new();
        for row in rows {
            views.push(row?);
        }
        Ok(views)
    }
}

fn row_to_grant(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShareGrant> {
    let file_str: String = row.get(0)?;
    let grantor_str: String = row.get(1)?;
    let grantee_email: String = row.get(2)?;
    let perm_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    let permission = Permission::parse(&perm_str)
        .ok_or_else(|| conv_failure(3, format!("unknown permission: {perm_str}")))?;

    Ok(ShareGrant {
        file_id: uuid_from_sql(0, &file_str)?,
        grantor_id: uuid_from_sql(1, &grantor_str)?,
        grantee_email,
        permission,
        created_at: ts_from_sql(4, &created_str)?,
    })
}

fn row_to_shared_view(row: &rusqlite::Row<'_>) -> rusqlite::Result<SharedFileView> {
    let file_str: String = row.get(0)?;
    let file_name: String = row.get(1)?;
    let file_type: String = row.get(2)?;
    let size: i64 = row.get(3)?;
    let owner_email: String = row.get(4)?;
    let perm_str: String = row.get(5)?;
    let shared_str: String = row.get(6)?;

    let permission = Permission::parse(&perm_str)
        .ok_or_else(|| conv_failure(5, format!("unknown permission: {perm_str}")))?;

    Ok(SharedFileView {
        file_id: uuid_from_sql(0, &file_str)?,
        file_name,
        file_type,
        size,
        owner_email,
        permission,
        shared_at: ts_from_sql(6, &shared_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coffre_core::{Action, LockState, Role};

    use crate::models::{FileRecord, User};

    fn seed_user(db: &Database, email: &str) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "$argon2id$test".to_string(),
            role: Role::User,
            lock_state: LockState::Active,
            created_at: Utc::now(),
        };
        db.insert_user(&user).unwrap();
        user.id
    }

    fn seed_file(db: &mut Database, owner_id: Uuid, name: &str) -> FileRecord {
        let file = FileRecord {
            id: Uuid::new_v4(),
            owner_id,
            file_name: name.to_string(),
            file_type: "text/plain".to_string(),
            size: 42,
            content_hash: "cd".repeat(32),
            created_at: Utc::now(),
        };
        let entry = NewActivityEntry::new("a@x.com", Action::Upload, name);
        db.insert_file_with_log(&file, &entry).unwrap();
        file
    }

    fn grant(file_id: Uuid, grantor_id: Uuid, grantee: &str, permission: Permission) -> ShareGrant {
        ShareGrant {
            file_id,
            grantor_id,
            grantee_email: grantee.to_string(),
            permission,
            created_at: Utc::now(),
        }
    }

    fn share_entry(grantee: &str) -> NewActivityEntry {
        NewActivityEntry::new("a@x.com", Action::Share, grantee)
    }

    #[test]
    fn upsert_replaces_permission_without_duplicating() {
        let mut db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "a@x.com");
        seed_user(&db, "b@x.com");
        let file = seed_file(&mut db, owner, "report.pdf");

        db.upsert_grant_with_log(
            &grant(file.id, owner, "b@x.com", Permission::View),
            &share_entry("b@x.com"),
        )
        .unwrap();
        db.upsert_grant_with_log(
            &grant(file.id, owner, "b@x.com", Permission::ViewDownload),
            &share_entry("b@x.com"),
        )
        .unwrap();

        let stored = db.get_grant(file.id, "b@x.com").unwrap().unwrap();
        assert_eq!(stored.permission, Permission::ViewDownload);

        let shared = db.list_shared_with("b@x.com").unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].owner_email, "a@x.com");
    }

    #[test]
    fn revoke_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "a@x.com");
        seed_user(&db, "b@x.com");
        let file = seed_file(&mut db, owner, "report.pdf");

        db.upsert_grant_with_log(
            &grant(file.id, owner, "b@x.com", Permission::View),
            &share_entry("b@x.com"),
        )
        .unwrap();

        assert!(db.revoke_grant(file.id, "b@x.com").unwrap());
        assert!(!db.revoke_grant(file.id, "b@x.com").unwrap());
        assert!(db.get_grant(file.id, "b@x.com").unwrap().is_none());
    }

    #[test]
    fn delete_cascades_grants() {
        let mut db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "a@x.com");
        seed_user(&db, "b@x.com");
        let file = seed_file(&mut db, owner, "report.pdf");

        db.upsert_grant_with_log(
            &grant(file.id, owner, "b@x.com", Permission::ViewDownload),
            &share_entry("b@x.com"),
        )
        .unwrap();
        assert_eq!(db.list_shared_with("b@x.com").unwrap().len(), 1);

        let del = NewActivityEntry::new("a@x.com", Action::Delete, "report.pdf");
        db.delete_file_with_log(file.id, &del).unwrap();

        assert!(db.list_shared_with("b@x.com").unwrap().is_empty());
        assert!(db.get_grant(file.id, "b@x.com").unwrap().is_none());
    }
}
