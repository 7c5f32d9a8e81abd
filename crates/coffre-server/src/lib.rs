//! # coffre-server
//!
//! The access-control and anomaly-detection core of the Coffre encrypted
//! file-sharing service:
//!
//! - **REST API** (axum) for registration/login, file upload/download,
//!   sharing, and the admin surface
//! - **Vault**: file content encrypted at rest (XChaCha20-Poly1305), stored
//!   as opaque blobs keyed by file id
//! - **Audit log**: every security-relevant action appended immutably,
//!   transactionally with the mutation it records
//! - **Suspicious-activity detector** deriving per-(user, action) aggregates
//!   from the trail, with configurable thresholds
//! - **Account lock manager**: the single writer of lock state, driving both
//!   admin locks and detector auto-locks
//! - **Per-IP rate limiting** to protect against abuse

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod detector;
pub mod error;
pub mod files;
pub mod locks;
pub mod rate_limit;
pub mod sharing;
pub mod vault;
