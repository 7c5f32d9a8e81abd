//! Authentication: Argon2id password hashing, opaque bearer tokens, and the
//! login/registration flows.
//!
//! Sessions resolve a token to an identity only; every request re-reads the
//! account row so role and lock state are always current. The login path is
//! where the lock gate and the detector meet: a locked account is rejected
//! before credentials are checked, and a suspicious account is auto-locked
//! and rejected even when the password is correct.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use password_hash::{PasswordHash, SaltString};
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use coffre_core::{Action, LockState, Role};
use coffre_store::{NewActivityEntry, SharedDatabase, StoreError, User};

use crate::audit::AuditLog;
use crate::detector::SuspiciousDetector;
use crate::error::ServerError;
use crate::locks::LockManager;

/// Sessions idle out after a day; the background sweeper evicts them.
const SESSION_TTL: Duration = Duration::from_secs(24 * 3600);

/// Request-scoped identity resolved from a bearer token. Passed explicitly
/// into every service call; the core holds no ambient session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthedUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Lowercase and shape-check an email address.
pub fn normalize_email(email: &str) -> Result<String, ServerError> {
    let email = email.trim().to_lowercase();
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || email.contains(char::is_whitespace) {
        return Err(ServerError::InvalidInput(format!(
            "malformed email address: {email}"
        )));
    }
    Ok(email)
}

pub fn hash_password(password: &str) -> Result<String, ServerError> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ServerError::Internal(format!("password hashing failed: {e}")))?;
    Ok(phc.to_string())
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Session manager
// ---------------------------------------------------------------------------

struct Session {
    user: AuthedUser,
    issued_at: Instant,
}

/// In-memory bearer-token table: token -> identity.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Issue a fresh opaque token for the given identity.
    pub async fn issue(&self, user: AuthedUser) -> String {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let mut sessions = self.sessions.write().await;
        sessions.insert(
            token.clone(),
            Session {
                user,
                issued_at: Instant::now(),
            },
        );
        token
    }

    /// Resolve a token to its identity, if the session is still live.
    pub async fn resolve(&self, token: &str) -> Option<AuthedUser> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(token)?;
        if session.issued_at.elapsed() > SESSION_TTL {
            return None;
        }
        Some(session.user.clone())
    }

    /// Evict expired sessions.
    pub async fn purge_expired(&self) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.issued_at.elapsed() <= SESSION_TTL);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "Purged expired sessions");
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Auth service
// ---------------------------------------------------------------------------

/// Successful login result.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub access_token: String,
    pub role: Role,
}

#[derive(Clone)]
pub struct AuthService {
    db: SharedDatabase,
    sessions: SessionManager,
    audit: AuditLog,
    detector: SuspiciousDetector,
    locks: LockManager,
}

impl AuthService {
    pub fn new(
        db: SharedDatabase,
        sessions: SessionManager,
        audit: AuditLog,
        detector: SuspiciousDetector,
        locks: LockManager,
    ) -> Self {
        Self {
            db,
            sessions,
            audit,
            detector,
            locks,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Register a new `user`-role account.
    pub fn register(&self, email: &str, password: &str) -> Result<User, ServerError> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(ServerError::InvalidInput("empty password".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.clone(),
            password_hash: hash_password(password)?,
            role: Role::User,
            lock_state: LockState::Active,
            created_at: Utc::now(),
        };
        self.db.lock().insert_user(&user)?;

        info!(user = %email, "account registered");
        Ok(user)
    }

    /// Authenticate and issue a bearer token.
    ///
    /// Order matters: the lock gate and the suspicion gate run before the
    /// password check, so a locked account is denied regardless of
    /// credential correctness, and the denial itself lands in the audit
    /// trail as `failed_login`.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginGrant, ServerError> {
        let email = normalize_email(email)?;

        // Bind the lookup result first so the store guard is released
        // before any await below.
        let lookup = self.db.lock().get_user_by_email(&email);
        let user = match lookup {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                self.record_failure(&email, "unknown account").await?;
                return Err(ServerError::Unauthorized("invalid credentials".to_string()));
            }
            Err(other) => return Err(ServerError::from(other)),
        };

        if user.lock_state.is_locked() {
            self.record_failure(&email, "locked").await?;
            return Err(ServerError::AccountLocked);
        }

        // Aggregates may have crossed a threshold since the last attempt;
        // the gate closes here even when the password is correct.
        if self.detector.is_suspicious(&email)? {
            self.detector.enforce_auto_lock(&email, &self.locks);
            self.record_failure(&email, "locked").await?;
            return Err(ServerError::AccountLocked);
        }

        if !verify_password(&user.password_hash, password) {
            self.record_failure(&email, "invalid password").await?;
            self.detector.enforce_auto_lock(&email, &self.locks);
            return Err(ServerError::Unauthorized("invalid credentials".to_string()));
        }

        self.audit
            .record(&NewActivityEntry::new(email.clone(), Action::Login, ""))
            .await?;

        let authed = AuthedUser {
            id: user.id,
            email: user.email,
            role: user.role,
        };
        let access_token = self.sessions.issue(authed).await;

        Ok(LoginGrant {
            access_token,
            role: user.role,
        })
    }

    async fn record_failure(&self, email: &str, reason: &str) -> Result<(), ServerError> {
        self.audit
            .record(&NewActivityEntry::new(email, Action::FailedLogin, reason))
            .await?;
        Ok(())
    }

    /// Create the bootstrap admin account when it does not exist yet.
    pub fn ensure_admin(&self, email: &str, password: &str) -> Result<(), ServerError> {
        let email = normalize_email(email)?;
        match self.db.lock().get_user_by_email(&email) {
            Ok(_) => return Ok(()),
            Err(StoreError::NotFound) => {}
            Err(other) => return Err(ServerError::from(other)),
        }

        let admin = User {
            id: Uuid::new_v4(),
            email: email.clone(),
            password_hash: hash_password(password)?,
            role: Role::Admin,
            lock_state: LockState::Active,
            created_at: Utc::now(),
        };
        self.db.lock().insert_user(&admin)?;
        info!(user = %email, "bootstrap admin created");
        Ok(())
    }
}
