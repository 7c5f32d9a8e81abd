//! End-to-end scenarios over the full service stack: registration, login,
//! upload, sharing, anomaly-driven locking, and the admin surface, wired
//! through `api::build_state` exactly as the binary does.

use axum::http::HeaderMap;
use tempfile::TempDir;

use coffre_core::{Action, Permission};
use coffre_server::api::{self, require_admin, require_user, AppState};
use coffre_server::config::ServerConfig;
use coffre_server::error::ServerError;
use coffre_store::activity::ActivityFilter;

async fn test_state() -> (AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut config = ServerConfig::default();
    config.db_path = Some(dir.path().join("coffre.db"));
    config.vault_path = dir.path().join("vault");
    config.max_file_size = 1024 * 1024;
    let state = api::build_state(config).await.unwrap();
    (state, dir)
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", format!("Bearer {token}").parse().unwrap());
    headers
}

async fn login_token(state: &AppState, email: &str, password: &str) -> String {
    state.auth.login(email, password).await.unwrap().access_token
}

#[tokio::test]
async fn share_view_scenario() {
    let (state, _dir) = test_state().await;

    state.auth.register("a@x.com", "password-a").unwrap();
    state.auth.register("b@x.com", "password-b").unwrap();

    let token_a = login_token(&state, "a@x.com", "password-a").await;
    let alice = require_user(&state, &bearer(&token_a)).await.unwrap();

    let file = state
        .files
        .upload(&alice, "report.pdf", "application/pdf", b"%PDF-1.7 ...")
        .await
        .unwrap();

    state
        .shares
        .share(&alice, "report.pdf", "b@x.com", Permission::View)
        .unwrap();

    let token_b = login_token(&state, "b@x.com", "password-b").await;
    let bob = require_user(&state, &bearer(&token_b)).await.unwrap();

    // View grant: preview succeeds, the download-only operation is denied.
    let (meta, content) = state.files.preview(file.id, &bob).await.unwrap();
    assert_eq!(meta.file_name, "report.pdf");
    assert_eq!(content, b"%PDF-1.7 ...");

    let err = state.files.download(file.id, &bob).await.unwrap_err();
    assert!(matches!(err, ServerError::AccessDenied(_)));

    // The owner's capabilities are implicit and unaffected by grants.
    assert!(state.files.download(file.id, &alice).await.is_ok());
}

#[tokio::test]
async fn failed_login_burst_locks_the_account() {
    let (state, _dir) = test_state().await;
    state.auth.register("c@x.com", "correct-horse").unwrap();

    for _ in 0..5 {
        let err = state.auth.login("c@x.com", "wrong").await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::Unauthorized(_) | ServerError::AccountLocked
        ));
    }

    assert!(state.detector.is_suspicious("c@x.com").unwrap());

    // Correct password no longer helps.
    let err = state.auth.login("c@x.com", "correct-horse").await.unwrap_err();
    assert!(matches!(err, ServerError::AccountLocked));

    // The denial is in the trail with the lock reason.
    let entries = state
        .audit
        .query(&ActivityFilter::default(), 50, 0)
        .unwrap();
    assert_eq!(entries[0].action, Action::FailedLogin);
    assert_eq!(entries[0].metadata, "locked");
    let lock_entry = entries.iter().find(|e| e.action == Action::Lock).unwrap();
    assert!(lock_entry.metadata.contains("system"));
}

#[tokio::test]
async fn admin_unlock_restores_access() {
    let (state, _dir) = test_state().await;
    state.auth.register("c@x.com", "correct-horse").unwrap();

    for _ in 0..5 {
        let _ = state.auth.login("c@x.com", "wrong").await;
    }
    assert!(state.locks.is_locked("c@x.com").unwrap());

    let admin_token = login_token(&state, "admin@coffre.local", "coffre-admin").await;
    let admin = require_admin(&state, &bearer(&admin_token)).await.unwrap();
    assert!(state.locks.unlock("c@x.com", &admin.email).unwrap());

    // Correct credentials now succeed and produce a `login` entry.
    let grant = state.auth.login("c@x.com", "correct-horse").await.unwrap();
    assert!(!grant.access_token.is_empty());

    let entries = state
        .audit
        .query(&ActivityFilter::default(), 5, 0)
        .unwrap();
    assert_eq!(entries[0].action, Action::Login);
    assert_eq!(entries[0].user_email, "c@x.com");
}

#[tokio::test]
async fn lock_takes_effect_on_live_sessions() {
    let (state, _dir) = test_state().await;
    state.auth.register("d@x.com", "password-d").unwrap();

    let token = login_token(&state, "d@x.com", "password-d").await;
    assert!(require_user(&state, &bearer(&token)).await.is_ok());

    state.locks.lock("d@x.com", "admin@coffre.local").unwrap();

    // No stale "active" read: the very next request is rejected.
    let err = require_user(&state, &bearer(&token)).await.unwrap_err();
    assert!(matches!(err, ServerError::AccessDenied(_)));
}

#[tokio::test]
async fn non_admin_is_rejected_from_admin_surface() {
    let (state, _dir) = test_state().await;
    state.auth.register("d@x.com", "password-d").unwrap();

    let token = login_token(&state, "d@x.com", "password-d").await;
    let err = require_admin(&state, &bearer(&token)).await.unwrap_err();
    assert!(matches!(err, ServerError::AccessDenied(_)));

    let err = require_user(&state, &bearer("bogus-token")).await.unwrap_err();
    assert!(matches!(err, ServerError::Unauthorized(_)));
}

#[tokio::test]
async fn audit_completeness_across_a_session() {
    let (state, _dir) = test_state().await;
    state.auth.register("a@x.com", "password-a").unwrap();
    state.auth.register("b@x.com", "password-b").unwrap();

    let token = login_token(&state, "a@x.com", "password-a").await;
    let alice = require_user(&state, &bearer(&token)).await.unwrap();

    let file = state
        .files
        .upload(&alice, "notes.txt", "text/plain", b"hello")
        .await
        .unwrap();
    state
        .shares
        .share(&alice, "notes.txt", "b@x.com", Permission::ViewDownload)
        .unwrap();
    state.files.download(file.id, &alice).await.unwrap();
    state.files.delete(file.id, &alice).await.unwrap();

    let entries = state
        .audit
        .query(
            &ActivityFilter {
                email: Some("a@x.com".to_string()),
                ..Default::default()
            },
            50,
            0,
        )
        .unwrap();

    // Exactly one entry per audited action, newest first.
    let actions: Vec<Action> = entries.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            Action::Delete,
            Action::Download,
            Action::Share,
            Action::Upload,
            Action::Login,
        ]
    );

    // Deleting cascaded the grant.
    assert!(state.files.list_shared_with("b@x.com").unwrap().is_empty());
}

#[tokio::test]
async fn admin_stats_reflect_uploads_and_shares() {
    let (state, _dir) = test_state().await;
    state.auth.register("a@x.com", "password-a").unwrap();
    state.auth.register("b@x.com", "password-b").unwrap();

    let token = login_token(&state, "a@x.com", "password-a").await;
    let alice = require_user(&state, &bearer(&token)).await.unwrap();

    state
        .files
        .upload(&alice, "one.txt", "text/plain", b"1")
        .await
        .unwrap();
    state
        .files
        .upload(&alice, "two.txt", "text/plain", b"2")
        .await
        .unwrap();
    state
        .shares
        .share(&alice, "one.txt", "b@x.com", Permission::View)
        .unwrap();

    let stats = state.db.lock().admin_stats().unwrap();
    assert_eq!(stats.total_uploads, 2);
    assert_eq!(stats.total_shares, 1);
    assert_eq!(stats.uploads_per_user[0].email, "a@x.com");
    assert_eq!(stats.uploads_per_user[0].count, 2);
}
