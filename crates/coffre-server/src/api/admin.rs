use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use coffre_core::{Action, Role};
use coffre_store::activity::ActivityFilter;
use coffre_store::stats::AdminStats;
use coffre_store::{ActivityAggregate, ActivityEntry, User};

use crate::error::ServerError;

use super::{page_bounds, require_admin, AppState};

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct ActivityLogQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub action: Option<String>,
    pub date: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct UserActivityQuery {
    pub email: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct SuspiciousQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Serialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
}

#[derive(Serialize)]
pub struct ActivityLogResponse {
    pub logs: Vec<ActivityEntry>,
}

#[derive(Serialize)]
pub struct UserActivityResponse {
    pub email: String,
    pub logs: Vec<ActivityEntry>,
}

#[derive(Serialize)]
pub struct SuspiciousResponse {
    pub suspicious_summary: Vec<ActivityAggregate>,
    /// Flagged accounts that are already locked.
    pub blocked_users: Vec<String>,
}

#[derive(Serialize)]
pub struct LockResponse {
    pub email: String,
    pub changed: bool,
    pub message: String,
}

pub async fn users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<UsersResponse>, ServerError> {
    require_admin(&state, &headers).await?;
    let (limit, offset) = page_bounds(query.page, query.limit);
    let users = state.db.lock().list_users(Some(Role::User), limit, offset)?;
    Ok(Json(UsersResponse { users }))
}

pub async fn search_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Json<UsersResponse>, ServerError> {
    require_admin(&state, &headers).await?;
    let (limit, offset) = page_bounds(query.page, query.limit);
    let users = state.db.lock().search_users(&query.query, limit, offset)?;
    Ok(Json(UsersResponse { users }))
}

pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdminStats>, ServerError> {
    require_admin(&state, &headers).await?;
    let stats = state.db.lock().admin_stats()?;
    Ok(Json(stats))
}

pub async fn activity_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ActivityLogQuery>,
) -> Result<Json<ActivityLogResponse>, ServerError> {
    require_admin(&state, &headers).await?;
    let (limit, offset) = page_bounds(query.page, query.limit);

    let filter = ActivityFilter {
        action: query.action.as_deref().map(parse_action).transpose()?,
        date: query.date.as_deref().map(parse_day).transpose()?,
        email: query.email.map(|e| e.trim().to_lowercase()),
    };
    let logs = state.audit.query(&filter, limit, offset)?;
    Ok(Json(ActivityLogResponse { logs }))
}

pub async fn user_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserActivityQuery>,
) -> Result<Json<UserActivityResponse>, ServerError> {
    require_admin(&state, &headers).await?;
    let (limit, offset) = page_bounds(query.page, query.limit);

    let email = query.email.trim().to_lowercase();
    let filter = ActivityFilter {
        email: Some(email.clone()),
        ..Default::default()
    };
    let logs = state.audit.query(&filter, limit, offset)?;
    Ok(Json(UserActivityResponse { email, logs }))
}

pub async fn suspicious_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SuspiciousQuery>,
) -> Result<Json<SuspiciousResponse>, ServerError> {
    require_admin(&state, &headers).await?;
    let (limit, offset) = page_bounds(query.page, query.limit);

    let start = query
        .start_date
        .as_deref()
        .map(parse_day)
        .transpose()?
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    let end = query
        .end_date
        .as_deref()
        .map(parse_day)
        .transpose()?
        .and_then(|d| d.and_hms_micro_opt(23, 59, 59, 999_999))
        .map(|dt| dt.and_utc());

    let suspicious_summary = state.detector.summarize(start, end, limit, offset)?;

    let mut blocked_users: Vec<String> = Vec::new();
    {
        let db = state.db.lock();
        for agg in &suspicious_summary {
            if blocked_users.contains(&agg.user_email) {
                continue;
            }
            if let Ok(user) = db.get_user_by_email(&agg.user_email) {
                if user.lock_state.is_locked() {
                    blocked_users.push(agg.user_email.clone());
                }
            }
        }
    }

    Ok(Json(SuspiciousResponse {
        suspicious_summary,
        blocked_users,
    }))
}

pub async fn lock_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EmailQuery>,
) -> Result<Json<LockResponse>, ServerError> {
    let admin = require_admin(&state, &headers).await?;
    let email = query.email.trim().to_lowercase();
    let changed = state.locks.lock(&email, &admin.email)?;
    Ok(Json(LockResponse {
        message: format!("user '{email}' is locked"),
        email,
        changed,
    }))
}

pub async fn unlock_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EmailQuery>,
) -> Result<Json<LockResponse>, ServerError> {
    let admin = require_admin(&state, &headers).await?;
    let email = query.email.trim().to_lowercase();
    let changed = state.locks.unlock(&email, &admin.email)?;
    Ok(Json(LockResponse {
        message: format!("user '{email}' is active"),
        email,
        changed,
    }))
}

fn parse_action(s: &str) -> Result<Action, ServerError> {
    Action::parse(s).ok_or_else(|| ServerError::InvalidInput(format!("unknown action: {s}")))
}

fn parse_day(s: &str) -> Result<NaiveDate, ServerError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ServerError::InvalidInput(format!("invalid date (want YYYY-MM-DD): {s}")))
}
