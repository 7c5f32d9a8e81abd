//! Sharing and permission engine.
//!
//! Grants are keyed by (file, grantee): re-sharing replaces the permission,
//! never duplicates it. Ownership is an implicit capability: the owner
//! passes every permission check without any grant row.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use coffre_core::{Action, Permission};
use coffre_store::{NewActivityEntry, ShareGrant, SharedDatabase, StoreError};

use crate::auth::{normalize_email, AuthedUser};
use crate::error::ServerError;

/// Capability being requested against a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    View,
    Download,
}

#[derive(Clone)]
pub struct ShareEngine {
    db: SharedDatabase,
}

impl ShareEngine {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Grant (or re-grant) a permission on one of the grantor's files.
    ///
    /// The grantee must be a registered, non-admin account distinct from
    /// the grantor. The grant upsert and its `share` audit entry commit in
    /// one transaction.
    pub fn share(
        &self,
        grantor: &AuthedUser,
        file_name: &str,
        grantee_email: &str,
        permission: Permission,
    ) -> Result<ShareGrant, ServerError> {
        let grantee_email = normalize_email(grantee_email)?;
        if grantee_email == grantor.email {
            return Err(ServerError::InvalidInput(
                "cannot share a file with yourself".to_string(),
            ));
        }

        let mut db = self.db.lock();

        let grantor_row = db.get_user_by_id(grantor.id)?;
        if grantor_row.lock_state.is_locked() {
            return Err(ServerError::AccessDenied("account is locked".to_string()));
        }

        let file = db
            .get_file_by_owner_and_name(grantor.id, file_name)
            .map_err(|e| match e {
                StoreError::NotFound => {
                    ServerError::NotFound(format!("no owned file named '{file_name}'"))
                }
                other => ServerError::from(other),
            })?;

        let grantee = db.get_user_by_email(&grantee_email).map_err(|e| match e {
            StoreError::NotFound => {
                ServerError::NotFound(format!("recipient not registered: {grantee_email}"))
            }
            other => ServerError::from(other),
        })?;
        if grantee.role.is_admin() {
            return Err(ServerError::AccessDenied(
                "cannot share files with an admin account".to_string(),
            ));
        }

        let grant = ShareGrant {
            file_id: file.id,
            grantor_id: grantor.id,
            grantee_email: grantee_email.clone(),
            permission,
            created_at: Utc::now(),
        };
        let entry = NewActivityEntry::new(
            grantor.email.clone(),
            Action::Share,
            format!("shared '{file_name}' with {grantee_email}"),
        );
        db.upsert_grant_with_log(&grant, &entry)?;

        info!(
            file = %file.id,
            grantor = %grantor.email,
            grantee = %grantee_email,
            permission = permission.as_str(),
            "share granted"
        );
        Ok(grant)
    }

    /// Revoke a grant on one of the grantor's files. Idempotent: revoking a
    /// grant that does not exist is a success and writes nothing.
    pub fn revoke(
        &self,
        grantor: &AuthedUser,
        file_name: &str,
        grantee_email: &str,
    ) -> Result<(), ServerError> {
        let grantee_email = normalize_email(grantee_email)?;
        let db = self.db.lock();

        let file = db
            .get_file_by_owner_and_name(grantor.id, file_name)
            .map_err(|e| match e {
                StoreError::NotFound => {
                    ServerError::NotFound(format!("no owned file named '{file_name}'"))
                }
                other => ServerError::from(other),
            })?;

        let removed = db.revoke_grant(file.id, &grantee_email)?;
        if removed {
            info!(file = %file.id, grantee = %grantee_email, "share revoked");
        }
        Ok(())
    }

    /// Does `user` hold the requested capability on the file?
    ///
    /// Owners always do; grantees only when their grant covers it.
    pub fn check_permission(
        &self,
        file_id: Uuid,
        user: &AuthedUser,
        requested: AccessKind,
    ) -> Result<bool, ServerError> {
        let db = self.db.lock();
        let file = db.get_file(file_id)?;
        if file.owner_id == user.id {
            return Ok(true);
        }

        let allowed = match db.get_grant(file_id, &user.email)? {
            Some(grant) => match requested {
                AccessKind::View => grant.permission.allows_view(),
                AccessKind::Download => grant.permission.allows_download(),
            },
            None => false,
        };
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coffre_core::{LockState, Role};
    use coffre_store::activity::ActivityFilter;
    use coffre_store::{Database, FileRecord, User};

    fn seed_user(db: &SharedDatabase, email: &str, role: Role) -> AuthedUser {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "$argon2id$test".to_string(),
            role,
            lock_state: LockState::Active,
            created_at: Utc::now(),
        };
        db.lock().insert_user(&user).unwrap();
        AuthedUser {
            id: user.id,
            email: user.email,
            role,
        }
    }

    fn seed_file(db: &SharedDatabase, owner: &AuthedUser, name: &str) -> FileRecord {
        let file = FileRecord {
            id: Uuid::new_v4(),
            owner_id: owner.id,
            file_name: name.to_string(),
            file_type: "application/pdf".to_string(),
            size: 9,
            content_hash: "ab".repeat(32),
            created_at: Utc::now(),
        };
        db.lock()
            .insert_file_with_log(
                &file,
                &NewActivityEntry::new(owner.email.clone(), Action::Upload, name),
            )
            .unwrap();
        file
    }

    fn setup() -> (ShareEngine, SharedDatabase) {
        let db = SharedDatabase::new(Database::open_in_memory().unwrap());
        (ShareEngine::new(db.clone()), db)
    }

    #[test]
    fn owner_always_passes_permission_checks() {
        let (shares, db) = setup();
        let alice = seed_user(&db, "a@x.com", Role::User);
        let file = seed_file(&db, &alice, "report.pdf");

        assert!(shares
            .check_permission(file.id, &alice, AccessKind::View)
            .unwrap());
        assert!(shares
            .check_permission(file.id, &alice, AccessKind::Download)
            .unwrap());
    }

    #[test]
    fn view_grant_never_allows_download() {
        let (shares, db) = setup();
        let alice = seed_user(&db, "a@x.com", Role::User);
        let bob = seed_user(&db, "b@x.com", Role::User);
        let file = seed_file(&db, &alice, "report.pdf");

        shares
            .share(&alice, "report.pdf", "b@x.com", Permission::View)
            .unwrap();

        assert!(shares
            .check_permission(file.id, &bob, AccessKind::View)
            .unwrap());
        assert!(!shares
            .check_permission(file.id, &bob, AccessKind::Download)
            .unwrap());
    }

    #[test]
    fn reshare_overwrites_permission() {
        let (shares, db) = setup();
        let alice = seed_user(&db, "a@x.com", Role::User);
        let bob = seed_user(&db, "b@x.com", Role::User);
        let file = seed_file(&db, &alice, "report.pdf");

        shares
            .share(&alice, "report.pdf", "b@x.com", Permission::View)
            .unwrap();
        shares
            .share(&alice, "report.pdf", "B@X.com", Permission::ViewDownload)
            .unwrap();

        assert!(shares
            .check_permission(file.id, &bob, AccessKind::Download)
            .unwrap());
        assert_eq!(db.lock().list_shared_with("b@x.com").unwrap().len(), 1);
    }

    #[test]
    fn share_requires_registered_non_admin_recipient() {
        let (shares, db) = setup();
        let alice = seed_user(&db, "a@x.com", Role::User);
        seed_user(&db, "root@x.com", Role::Admin);
        seed_file(&db, &alice, "report.pdf");

        assert!(matches!(
            shares.share(&alice, "report.pdf", "ghost@x.com", Permission::View),
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            shares.share(&alice, "report.pdf", "root@x.com", Permission::View),
            Err(ServerError::AccessDenied(_))
        ));
        assert!(matches!(
            shares.share(&alice, "report.pdf", "a@x.com", Permission::View),
            Err(ServerError::InvalidInput(_))
        ));
    }

    #[test]
    fn share_rejects_files_the_grantor_does_not_own() {
        let (shares, db) = setup();
        let alice = seed_user(&db, "a@x.com", Role::User);
        let bob = seed_user(&db, "b@x.com", Role::User);
        seed_file(&db, &alice, "report.pdf");

        // Bob cannot grant on Alice's file: the name does not resolve in
        // his namespace.
        assert!(matches!(
            shares.share(&bob, "report.pdf", "a@x.com", Permission::View),
            Err(ServerError::NotFound(_))
        ));
    }

    #[test]
    fn locked_grantor_cannot_share() {
        let (shares, db) = setup();
        let alice = seed_user(&db, "a@x.com", Role::User);
        seed_user(&db, "b@x.com", Role::User);
        seed_file(&db, &alice, "report.pdf");

        db.lock()
            .set_lock_state_with_log(
                "a@x.com",
                LockState::Locked,
                &NewActivityEntry::new("a@x.com", Action::Lock, "locked by admin"),
            )
            .unwrap();

        assert!(matches!(
            shares.share(&alice, "report.pdf", "b@x.com", Permission::View),
            Err(ServerError::AccessDenied(_))
        ));
    }

    #[test]
    fn revoke_is_idempotent_and_unaudited_when_noop() {
        let (shares, db) = setup();
        let alice = seed_user(&db, "a@x.com", Role::User);
        seed_user(&db, "b@x.com", Role::User);
        seed_file(&db, &alice, "report.pdf");

        let before = db
            .lock()
            .query_entries(&ActivityFilter::default(), 50, 0)
            .unwrap()
            .len();

        shares.revoke(&alice, "report.pdf", "b@x.com").unwrap();
        shares.revoke(&alice, "report.pdf", "b@x.com").unwrap();

        let after = db
            .lock()
            .query_entries(&ActivityFilter::default(), 50, 0)
            .unwrap()
            .len();
        assert_eq!(before, after);
    }
}
