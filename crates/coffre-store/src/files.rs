use rusqlite::params;
use uuid::Uuid;

use crate::activity::append_entry_tx;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ts_from_sql, ts_to_sql, uuid_from_sql, FileRecord, NewActivityEntry};

impl Database {
    /// Insert file metadata and its `upload` audit entry in one transaction.
    ///
    /// Fails with [`StoreError::Conflict`] when the owner already has a file
    /// of the same name. Returns the audit entry id.
    pub fn insert_file_with_log(
        &mut self,
        file: &FileRecord,
        entry: &NewActivityEntry,
    ) -> Result<i64> {
        let tx = self.conn_mut().transaction()?;

        let inserted = tx.execute(
            "INSERT INTO files (id, owner_id, file_name, file_type, size, content_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                file.id.to_string(),
                file.owner_id.to_string(),
                file.file_name,
                file.file_type,
                file.size,
                file.content_hash,
                ts_to_sql(&file.created_at),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::Conflict(format!(
                    "file name already exists: {}",
                    file.file_name
                )));
            }
            Err(other) => return Err(StoreError::Sqlite(other)),
        }

        let entry_id = append_entry_tx(&tx, entry)?;
        tx.commit()?;
        Ok(entry_id)
    }

    pub fn get_file(&self, id: Uuid) -> Result<FileRecord> {
        self.conn()
            .query_row(
                "SELECT id, owner_id, file_name, file_type, size, content_hash, created_at
                 FROM files WHERE id = ?1",
                params![id.to_string()],
                row_to_file,
            )
            .map_err(not_found)
    }

    /// Resolve a file by its owner and name (the client-facing key for
    /// delete and share).
    pub fn get_file_by_owner_and_name(&self, owner_id: Uuid, file_name: &str) -> Result<FileRecord> {
        self.conn()
            .query_row(
                "SELECT id, owner_id, file_name, file_type, size, content_hash, created_at
                 FROM files WHERE owner_id = ?1 AND file_name = ?2",
                params![owner_id.to_string(), file_name],
                row_to_file,
            )
            .map_err(not_found)
    }

    /// Metadata for every file owned by one user, newest first.
    pub fn list_owned(&self, owner_id: Uuid) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, owner_id, file_name, file_type, size, content_hash, created_at
             FROM files
             WHERE owner_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![owner_id.to_string()], row_to_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    /// Delete a file row (grants cascade) and append the `delete` audit
    /// entry in one transaction. The caller unlinks the vault blob after
    /// commit.
    pub fn delete_file_with_log(&mut self, id: Uuid, entry: &NewActivityEntry) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        let affected = tx.execute("DELETE FROM files WHERE id = ?1", params![id.to_string()])?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        append_entry_tx(&tx, entry)?;
        tx.commit()?;
        Ok(())
    }
}

fn not_found(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let id_str: String = row.get(0)?;
    let owner_str: String = row.get(1)?;
    let file_name: String = row.get(2)?;
    let file_type: String = row.get(3)?;
    let size: i64 = row.get(4)?;
    let content_hash: String = row.get(5)?;
    let created_str: String = row.get(6)?;

    Ok(FileRecord {
        id: uuid_from_sql(0, &id_str)?,
        owner_id: uuid_from_sql(1, &owner_str)?,
        file_name,
        file_type,
        size,
        content_hash,
        created_at: ts_from_sql(6, &created_str)?,
    })
}
