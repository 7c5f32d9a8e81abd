use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use coffre_core::Permission;
use coffre_store::{ShareGrant, SharedFileView};

use crate::error::ServerError;

use super::{require_user, AppState};

#[derive(Deserialize)]
pub struct ShareRequest {
    pub file_name: String,
    pub shared_with_email: String,
    pub permission: String,
}

#[derive(Serialize)]
pub struct ShareResponse {
    pub grant: ShareGrant,
}

#[derive(Deserialize)]
pub struct RevokeQuery {
    pub file_name: String,
    pub shared_with_email: String,
}

#[derive(Serialize)]
pub struct SharedFilesResponse {
    pub shared_files: Vec<SharedFileView>,
}

pub async fn share_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ShareRequest>,
) -> Result<Json<ShareResponse>, ServerError> {
    let user = require_user(&state, &headers).await?;

    let permission = Permission::parse(&req.permission).ok_or_else(|| {
        ServerError::InvalidInput(format!("unsupported permission: {}", req.permission))
    })?;

    let grant = state
        .shares
        .share(&user, &req.file_name, &req.shared_with_email, permission)?;

    // The grant committed; a threshold crossing only gates future requests.
    state.detector.enforce_auto_lock(&user.email, &state.locks);

    Ok(Json(ShareResponse { grant }))
}

pub async fn revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RevokeQuery>,
) -> Result<StatusCode, ServerError> {
    let user = require_user(&state, &headers).await?;
    state
        .shares
        .revoke(&user, &query.file_name, &query.shared_with_email)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn shared_files(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SharedFilesResponse>, ServerError> {
    let user = require_user(&state, &headers).await?;
    let shared_files = state.files.list_shared_with(&user.email)?;
    Ok(Json(SharedFilesResponse { shared_files }))
}
