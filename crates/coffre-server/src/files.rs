//! File store service.
//!
//! Orchestrates one client-visible file operation end to end: lock gate,
//! permission check, vault I/O, and the metadata + audit transaction. The
//! blob is written before the metadata commits, so a client disconnecting
//! mid-upload can never leave a half-visible file; a failed commit removes
//! the orphan blob again.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use coffre_core::crypto::content_hash;
use coffre_core::Action;
use coffre_store::{FileRecord, NewActivityEntry, SharedDatabase, SharedFileView, StoreError};

use crate::audit::AuditLog;
use crate::auth::AuthedUser;
use crate::error::ServerError;
use crate::sharing::{AccessKind, ShareEngine};
use crate::vault::Vault;

#[derive(Clone)]
pub struct FileStore {
    db: SharedDatabase,
    vault: Vault,
    shares: ShareEngine,
    audit: AuditLog,
}

impl FileStore {
    pub fn new(db: SharedDatabase, vault: Vault, shares: ShareEngine, audit: AuditLog) -> Self {
        Self {
            db,
            vault,
            shares,
            audit,
        }
    }

    /// Store a new file for `owner`: encrypt content into the vault, then
    /// commit metadata and the `upload` audit entry in one transaction.
    pub async fn upload(
        &self,
        owner: &AuthedUser,
        file_name: &str,
        file_type: &str,
        bytes: &[u8],
    ) -> Result<FileRecord, ServerError> {
        validate_file_name(file_name)?;

        {
            let db = self.db.lock();
            let owner_row = db.get_user_by_id(owner.id)?;
            if owner_row.lock_state.is_locked() {
                return Err(ServerError::AccessDenied("account is locked".to_string()));
            }
        }

        let file = FileRecord {
            id: Uuid::new_v4(),
            owner_id: owner.id,
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            size: bytes.len() as i64,
            content_hash: content_hash(bytes),
            created_at: Utc::now(),
        };

        // Size limits are enforced here too; an oversized payload never
        // reaches the database.
        self.vault.store(file.id, bytes).await?;

        let entry = NewActivityEntry::new(owner.email.clone(), Action::Upload, file_name);
        let committed = self.db.lock().insert_file_with_log(&file, &entry);
        if let Err(e) = committed {
            // Roll the blob back: the file must not exist without its row.
            self.vault.remove(file.id).await;
            return Err(ServerError::from(e));
        }

        info!(file = %file.id, owner = %owner.email, size = file.size, "file uploaded");
        Ok(file)
    }

    /// Fetch metadata and decrypted content for previewing. Requires the
    /// `view` capability; previews are not audited.
    pub async fn preview(
        &self,
        file_id: Uuid,
        requester: &AuthedUser,
    ) -> Result<(FileRecord, Vec<u8>), ServerError> {
        let file = self.authorize(file_id, requester, AccessKind::View)?;
        let content = self.vault.load(file.id, &file.content_hash).await?;
        Ok((file, content))
    }

    /// Fetch the raw bytes. Requires the `download` capability and emits a
    /// `download` audit entry before the bytes are released.
    pub async fn download(
        &self,
        file_id: Uuid,
        requester: &AuthedUser,
    ) -> Result<(FileRecord, Vec<u8>), ServerError> {
        let file = self.authorize(file_id, requester, AccessKind::Download)?;
        let content = self.vault.load(file.id, &file.content_hash).await?;

        let entry = NewActivityEntry::new(
            requester.email.clone(),
            Action::Download,
            file.file_name.clone(),
        );
        self.audit.record(&entry).await?;

        Ok((file, content))
    }

    /// Delete a file. Owner-only; the row delete, the grant cascade, and
    /// the `delete` audit entry commit together, then the blob is unlinked.
    pub async fn delete(&self, file_id: Uuid, requester: &AuthedUser) -> Result<(), ServerError> {
        let file_name;
        {
            let mut db = self.db.lock();
            let file = db.get_file(file_id)?;
            if file.owner_id != requester.id {
                return Err(ServerError::AccessDenied(
                    "only the owner may delete a file".to_string(),
                ));
            }
            file_name = file.file_name.clone();

            let entry = NewActivityEntry::new(
                requester.email.clone(),
                Action::Delete,
                file_name.clone(),
            );
            db.delete_file_with_log(file_id, &entry)?;
        }

        self.vault.remove(file_id).await;
        info!(file = %file_id, owner = %requester.email, name = %file_name, "file deleted");
        Ok(())
    }

    /// Resolve one of the requester's own files by name.
    pub fn resolve_owned(
        &self,
        requester: &AuthedUser,
        file_name: &str,
    ) -> Result<FileRecord, ServerError> {
        self.db
            .lock()
            .get_file_by_owner_and_name(requester.id, file_name)
            .map_err(|e| match e {
                StoreError::NotFound => {
                    ServerError::NotFound(format!("no owned file named '{file_name}'"))
                }
                other => ServerError::from(other),
            })
    }

    /// Metadata for every file the user owns.
    pub fn list_owned(&self, owner: &AuthedUser) -> Result<Vec<FileRecord>, ServerError> {
        Ok(self.db.lock().list_owned(owner.id)?)
    }

    /// Metadata for every file shared with the user.
    pub fn list_shared_with(&self, email: &str) -> Result<Vec<SharedFileView>, ServerError> {
        Ok(self.db.lock().list_shared_with(email)?)
    }

    fn authorize(
        &self,
        file_id: Uuid,
        requester: &AuthedUser,
        kind: AccessKind,
    ) -> Result<FileRecord, ServerError> {
        if !self.shares.check_permission(file_id, requester, kind)? {
            return Err(ServerError::AccessDenied(
                "no permission on this file".to_string(),
            ));
        }
        Ok(self.db.lock().get_file(file_id)?)
    }
}

fn validate_file_name(name: &str) -> Result<(), ServerError> {
    if name.is_empty() {
        return Err(ServerError::InvalidInput("empty file name".to_string()));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(ServerError::InvalidInput(format!(
            "invalid file name: {name}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coffre_core::crypto::generate_symmetric_key;
    use coffre_core::{LockState, Permission, Role};
    use coffre_store::activity::ActivityFilter;
    use coffre_store::{Database, User};
    use tempfile::TempDir;

    async fn setup() -> (FileStore, ShareEngine, SharedDatabase, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = SharedDatabase::new(Database::open_in_memory().unwrap());
        let vault = Vault::new(dir.path().to_path_buf(), generate_symmetric_key(), 1024)
            .await
            .unwrap();
        let shares = ShareEngine::new(db.clone());
        let files = FileStore::new(
            db.clone(),
            vault,
            shares.clone(),
            AuditLog::new(db.clone()),
        );
        (files, shares, db, dir)
    }

    fn seed_user(db: &SharedDatabase, email: &str) -> AuthedUser {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "$argon2id$test".to_string(),
            role: Role::User,
            lock_state: LockState::Active,
            created_at: Utc::now(),
        };
        db.lock().insert_user(&user).unwrap();
        AuthedUser {
            id: user.id,
            email: user.email,
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn upload_then_owner_preview_and_download() {
        let (files, _shares, db, _dir) = setup().await;
        let alice = seed_user(&db, "a@x.com");

        let file = files
            .upload(&alice, "report.pdf", "application/pdf", b"pdf bytes")
            .await
            .unwrap();

        // Owner capability is implicit: no grant rows exist.
        let (_, preview) = files.preview(file.id, &alice).await.unwrap();
        assert_eq!(preview, b"pdf bytes");
        let (meta, content) = files.download(file.id, &alice).await.unwrap();
        assert_eq!(meta.size, 9);
        assert_eq!(content, b"pdf bytes");

        let entries = db
            .lock()
            .query_entries(&ActivityFilter::default(), 10, 0)
            .unwrap();
        let actions: Vec<Action> = entries.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![Action::Download, Action::Upload]);
    }

    #[tokio::test]
    async fn locked_owner_cannot_upload() {
        let (files, _shares, db, _dir) = setup().await;
        let alice = seed_user(&db, "a@x.com");
        db.lock()
            .set_lock_state_with_log(
                "a@x.com",
                LockState::Locked,
                &NewActivityEntry::new("a@x.com", Action::Lock, "locked by admin"),
            )
            .unwrap();

        let err = files
            .upload(&alice, "report.pdf", "application/pdf", b"bytes")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn oversized_upload_leaves_no_trace() {
        let (files, _shares, db, dir) = setup().await;
        let alice = seed_user(&db, "a@x.com");

        let err = files
            .upload(&alice, "big.bin", "application/octet-stream", &vec![0u8; 4096])
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::PayloadTooLarge { .. }));

        assert!(files.list_owned(&alice).unwrap().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(db
            .lock()
            .query_entries(&ActivityFilter::default(), 10, 0)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn duplicate_name_rolls_back_blob() {
        let (files, _shares, db, dir) = setup().await;
        let alice = seed_user(&db, "a@x.com");

        files
            .upload(&alice, "report.pdf", "application/pdf", b"v1")
            .await
            .unwrap();
        let err = files
            .upload(&alice, "report.pdf", "application/pdf", b"v2")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Conflict(_)));

        // Only the first upload's blob remains.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn grantee_capabilities_follow_the_grant() {
        let (files, shares, db, _dir) = setup().await;
        let alice = seed_user(&db, "a@x.com");
        let bob = seed_user(&db, "b@x.com");

        let file = files
            .upload(&alice, "report.pdf", "application/pdf", b"pdf bytes")
            .await
            .unwrap();
        shares
            .share(&alice, "report.pdf", "b@x.com", Permission::View)
            .unwrap();

        // View grant: preview succeeds, download is denied.
        assert!(files.preview(file.id, &bob).await.is_ok());
        let err = files.download(file.id, &bob).await.unwrap_err();
        assert!(matches!(err, ServerError::AccessDenied(_)));

        // No grant at all: everything is denied.
        let carol = seed_user(&db, "carol@x.com");
        let err = files.preview(file.id, &carol).await.unwrap_err();
        assert!(matches!(err, ServerError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn delete_is_owner_only_and_cascades() {
        let (files, shares, db, dir) = setup().await;
        let alice = seed_user(&db, "a@x.com");
        let bob = seed_user(&db, "b@x.com");

        let file = files
            .upload(&alice, "report.pdf", "application/pdf", b"pdf bytes")
            .await
            .unwrap();
        shares
            .share(&alice, "report.pdf", "b@x.com", Permission::ViewDownload)
            .unwrap();

        let err = files.delete(file.id, &bob).await.unwrap_err();
        assert!(matches!(err, ServerError::AccessDenied(_)));

        files.delete(file.id, &alice).await.unwrap();
        assert!(files.list_shared_with("b@x.com").unwrap().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(matches!(
            files.preview(file.id, &alice).await.unwrap_err(),
            ServerError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn traversal_names_rejected() {
        let (files, _shares, db, _dir) = setup().await;
        let alice = seed_user(&db, "a@x.com");

        for name in ["", "../etc/passwd", "a/b.txt", "c\\d.txt"] {
            let err = files
                .upload(&alice, name, "text/plain", b"x")
                .await
                .unwrap_err();
            assert!(matches!(err, ServerError::InvalidInput(_)), "name: {name}");
        }
    }
}
