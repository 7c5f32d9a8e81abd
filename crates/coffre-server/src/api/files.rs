use axum::{
    extract::{Multipart, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use coffre_store::FileRecord;

use crate::error::ServerError;

use super::{require_user, AppState};

#[derive(Serialize)]
pub struct UploadResponse {
    pub file: FileRecord,
}

#[derive(Serialize)]
pub struct MyFilesResponse {
    pub files: Vec<FileRecord>,
}

#[derive(Deserialize)]
pub struct FileIdQuery {
    pub file_id: Uuid,
}

#[derive(Deserialize)]
pub struct FileNameQuery {
    pub file_name: String,
}

#[derive(Serialize)]
pub struct PreviewResponse {
    pub file_name: String,
    pub file_type: String,
    pub content_base64: String,
}

pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let user = require_user(&state, &headers).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::InvalidInput(format!("multipart error: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ServerError::InvalidInput("missing file name".to_string()))?;
        let file_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::InvalidInput(format!("failed to read upload: {e}")))?;

        let file = state
            .files
            .upload(&user, &file_name, &file_type, &data)
            .await?;

        // The upload committed; a threshold crossing only gates future
        // requests.
        state.detector.enforce_auto_lock(&user.email, &state.locks);

        return Ok(Json(UploadResponse { file }));
    }

    Err(ServerError::InvalidInput(
        "missing 'file' field in multipart form".to_string(),
    ))
}

pub async fn my_files(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MyFilesResponse>, ServerError> {
    let user = require_user(&state, &headers).await?;
    let files = state.files.list_owned(&user)?;
    Ok(Json(MyFilesResponse { files }))
}

pub async fn preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FileIdQuery>,
) -> Result<Json<PreviewResponse>, ServerError> {
    let user = require_user(&state, &headers).await?;
    let (file, content) = state.files.preview(query.file_id, &user).await?;
    Ok(Json(PreviewResponse {
        file_name: file.file_name,
        file_type: file.file_type,
        content_base64: base64::engine::general_purpose::STANDARD.encode(content),
    }))
}

pub async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FileIdQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let user = require_user(&state, &headers).await?;
    let (file, content) = state.files.download(query.file_id, &user).await?;

    let disposition = format!("attachment; filename=\"{}\"", file.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, file.file_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    ))
}

pub async fn delete_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FileNameQuery>,
) -> Result<StatusCode, ServerError> {
    let user = require_user(&state, &headers).await?;
    let file = state.files.resolve_owned(&user, &query.file_name)?;
    state.files.delete(file.id, &user).await?;
    state.detector.enforce_auto_lock(&user.email, &state.locks);
    Ok(StatusCode::NO_CONTENT)
}
