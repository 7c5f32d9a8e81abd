//! # coffre-core
//!
//! Shared domain vocabulary for the Coffre file-sharing core: the closed
//! role/permission/action enums used by the access-control layer, the
//! XChaCha20-Poly1305 helpers that encrypt file content at rest, and the
//! protocol constants every other crate agrees on.
//!
//! This crate performs no I/O.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod types;

pub use error::CryptoError;
pub use types::{Action, LockState, Permission, Role};
