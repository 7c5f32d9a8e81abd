//! HTTP API.
//!
//! Thin axum handlers over the service layer. Every route outside `/auth/*`
//! resolves the bearer token to a fresh account row, so role and lock state
//! are current at request time; admin routes additionally require the admin
//! role (403 otherwise, never a silent empty result).

pub mod admin;
pub mod auth;
pub mod files;
pub mod share;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method},
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use coffre_core::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use coffre_store::{Database, SharedDatabase};

use crate::audit::AuditLog;
use crate::auth::{AuthService, AuthedUser, SessionManager};
use crate::config::ServerConfig;
use crate::detector::SuspiciousDetector;
use crate::error::ServerError;
use crate::files::FileStore;
use crate::locks::LockManager;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::sharing::ShareEngine;
use crate::vault::Vault;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub db: SharedDatabase,
    pub auth: AuthService,
    pub files: FileStore,
    pub shares: ShareEngine,
    pub audit: AuditLog,
    pub detector: SuspiciousDetector,
    pub locks: LockManager,
    pub sessions: SessionManager,
    pub limiter: RateLimiter,
}

/// Wire up the full service stack from configuration.
pub async fn build_state(config: ServerConfig) -> anyhow::Result<AppState> {
    if config.master_key == [0u8; 32] {
        warn!("COFFRE_MASTER_KEY not set; using the all-zero development key");
    }

    let database = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    let db = SharedDatabase::new(database);

    let vault = Vault::new(
        config.vault_path.clone(),
        config.master_key,
        config.max_file_size,
    )
    .await?;

    let sessions = SessionManager::new();
    let audit = AuditLog::new(db.clone());
    let locks = LockManager::new(db.clone());
    let detector = SuspiciousDetector::new(db.clone(), config.detector.clone());
    let shares = ShareEngine::new(db.clone());
    let files = FileStore::new(db.clone(), vault, shares.clone(), audit.clone());
    let auth = AuthService::new(
        db.clone(),
        sessions.clone(),
        audit.clone(),
        detector.clone(),
        locks.clone(),
    );

    auth.ensure_admin(&config.admin_email, &config.admin_password)?;

    Ok(AppState {
        config: Arc::new(config),
        db,
        auth,
        files,
        shares,
        audit,
        detector,
        locks,
        sessions,
        limiter: RateLimiter::default(),
    })
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    // Ciphertext overhead plus multipart framing on top of the payload cap.
    let body_limit = state.config.max_file_size + 64 * 1024;

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/files/upload", post(files::upload))
        .route("/files/my-files", get(files::my_files))
        .route("/files/preview", get(files::preview))
        .route("/files/download", get(files::download))
        .route("/files/delete-file", delete(files::delete_file))
        .route("/share/share-file", post(share::share_file))
        .route("/share/revoke", delete(share::revoke))
        .route("/share/shared-files", get(share::shared_files))
        .route("/admin/users", get(admin::users))
        .route("/admin/search-users", get(admin::search_users))
        .route("/admin/stats", get(admin::stats))
        .route("/admin/activity-log", get(admin::activity_log))
        .route("/admin/user-activity", get(admin::user_activity))
        .route("/admin/suspicious-activity", get(admin::suspicious_activity))
        .route("/admin/lock-user", put(admin::lock_user))
        .route("/admin/unlock-user", put(admin::unlock_user))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(_state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Resolve the bearer token to a live, non-locked account.
///
/// The session only proves who the caller is; role and lock state come from
/// a fresh store read so an admin lock takes effect on the very next
/// request, open sessions included.
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<AuthedUser, ServerError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ServerError::Unauthorized("missing bearer token".to_string()))?;
    let session = state
        .sessions
        .resolve(token)
        .await
        .ok_or_else(|| ServerError::Unauthorized("invalid or expired token".to_string()))?;

    let user = state
        .db
        .lock()
        .get_user_by_id(session.id)
        .map_err(|_| ServerError::Unauthorized("account no longer exists".to_string()))?;

    if user.lock_state.is_locked() {
        return Err(ServerError::AccessDenied("account is locked".to_string()));
    }

    Ok(AuthedUser {
        id: user.id,
        email: user.email,
        role: user.role,
    })
}

/// As [`require_user`], additionally requiring the admin role.
pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<AuthedUser, ServerError> {
    let user = require_user(state, headers).await?;
    if !user.role.is_admin() {
        return Err(ServerError::AccessDenied("admins only".to_string()));
    }
    Ok(user)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get("authorization")?.to_str().ok()?;
    auth.strip_prefix("Bearer ").filter(|t| !t.is_empty())
}

/// Clamp 1-based page / page-size query parameters to (limit, offset).
pub fn page_bounds(page: Option<u32>, limit: Option<u32>) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    (limit, (page - 1).saturating_mul(limit))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
