//! # coffre-store
//!
//! SQLite persistence for the Coffre access-control core.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model: users, file metadata, share grants, and the append-only activity
//! log. Mutations that must be audited (upload, share, delete, lock state
//! changes) run the business write and the log append inside a single
//! transaction, so no committed change can exist without its audit entry.

pub mod activity;
pub mod database;
pub mod files;
pub mod migrations;
pub mod models;
pub mod shares;
pub mod stats;
pub mod users;

mod error;

pub use database::{Database, SharedDatabase};
pub use error::StoreError;
pub use models::*;
