//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development. Suspicious-activity thresholds are
//! policy, not code, so they live here too.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use coffre_core::constants::MAX_FILE_SIZE;
use coffre_core::crypto::{self, SymmetricKey};
use coffre_core::Action;

/// Threshold for one audited action: the count that flips a user to
/// suspicious when reached within the trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionThreshold {
    pub threshold: u32,
    pub window: Duration,
}

/// Per-action anomaly thresholds consulted by the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Env: `COFFRE_FAILED_LOGIN_THRESHOLD` / `COFFRE_FAILED_LOGIN_WINDOW_SECS`
    /// Default: 5 within 15 minutes.
    pub failed_login: ActionThreshold,

    /// Env: `COFFRE_UPLOAD_THRESHOLD` / `COFFRE_UPLOAD_WINDOW_SECS`
    /// Default: 100 within 1 minute.
    pub upload: ActionThreshold,

    /// Env: `COFFRE_SHARE_THRESHOLD` / `COFFRE_SHARE_WINDOW_SECS`
    /// Default: 50 within 1 minute.
    pub share: ActionThreshold,

    /// Env: `COFFRE_DELETE_THRESHOLD` / `COFFRE_DELETE_WINDOW_SECS`
    /// Default: 25 within 1 day.
    pub delete: ActionThreshold,
}

impl DetectorConfig {
    /// The threshold watching a given action, if any. Only these four
    /// actions participate in anomaly detection.
    pub fn threshold_for(&self, action: Action) -> Option<ActionThreshold> {
        match action {
            Action::FailedLogin => Some(self.failed_login),
            Action::Upload => Some(self.upload),
            Action::Share => Some(self.share),
            Action::Delete => Some(self.delete),
            _ => None,
        }
    }

    /// Actions the detector watches.
    pub fn watched_actions(&self) -> [Action; 4] {
        [Action::FailedLogin, Action::Upload, Action::Share, Action::Delete]
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            failed_login: ActionThreshold {
                threshold: 5,
                window: Duration::from_secs(15 * 60),
            },
            upload: ActionThreshold {
                threshold: 100,
                window: Duration::from_secs(60),
            },
            share: ActionThreshold {
                threshold: 50,
                window: Duration::from_secs(60),
            },
            delete: ActionThreshold {
                threshold: 25,
                window: Duration::from_secs(24 * 3600),
            },
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file. Empty means the platform data directory.
    /// Env: `COFFRE_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Filesystem path where encrypted file content is stored.
    /// Env: `COFFRE_VAULT_PATH`
    /// Default: `./vault`
    pub vault_path: PathBuf,

    /// Master key for content encryption (hex-encoded, 64 chars).
    /// Env: `COFFRE_MASTER_KEY`
    /// Default: all-zeros (development only).
    pub master_key: SymmetricKey,

    /// Maximum upload size in bytes.
    /// Env: `COFFRE_MAX_FILE_SIZE`
    /// Default: 50 MiB.
    pub max_file_size: usize,

    /// Bootstrap admin account created on first start when missing.
    /// Env: `COFFRE_ADMIN_EMAIL` / `COFFRE_ADMIN_PASSWORD`
    /// Default: `admin@coffre.local` / `coffre-admin` (development only).
    pub admin_email: String,
    pub admin_password: String,

    /// Anomaly thresholds.
    pub detector: DetectorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            db_path: None,
            vault_path: PathBuf::from("./vault"),
            master_key: [0u8; 32],
            max_file_size: MAX_FILE_SIZE,
            admin_email: "admin@coffre.local".to_string(),
            admin_password: "coffre-admin".to_string(),
            detector: DetectorConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("COFFRE_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(path) = std::env::var("COFFRE_VAULT_PATH") {
            config.vault_path = PathBuf::from(path);
        }

        if let Ok(hex_key) = std::env::var("COFFRE_MASTER_KEY") {
            match crypto::key_from_hex(&hex_key) {
                Ok(key) => config.master_key = key,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid COFFRE_MASTER_KEY, using default (dev-only)");
                }
            }
        }

        if let Ok(val) = std::env::var("COFFRE_MAX_FILE_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_file_size = n;
            }
        }

        if let Ok(email) = std::env::var("COFFRE_ADMIN_EMAIL") {
            if !email.is_empty() {
                config.admin_email = email;
            }
        }
        if let Ok(pw) = std::env::var("COFFRE_ADMIN_PASSWORD") {
            if !pw.is_empty() {
                config.admin_password = pw;
            }
        }

        config.detector.failed_login =
            threshold_from_env("COFFRE_FAILED_LOGIN", config.detector.failed_login);
        config.detector.upload = threshold_from_env("COFFRE_UPLOAD", config.detector.upload);
        config.detector.share = threshold_from_env("COFFRE_SHARE", config.detector.share);
        config.detector.delete = threshold_from_env("COFFRE_DELETE", config.detector.delete);

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn threshold_from_env(prefix: &str, default: ActionThreshold) -> ActionThreshold {
    let mut out = default;
    if let Ok(val) = std::env::var(format!("{prefix}_THRESHOLD")) {
        match val.parse::<u32>() {
            Ok(n) if n > 0 => out.threshold = n,
            _ => tracing::warn!(var = %format!("{prefix}_THRESHOLD"), value = %val, "Invalid threshold, using default"),
        }
    }
    if let Ok(val) = std::env::var(format!("{prefix}_WINDOW_SECS")) {
        match val.parse::<u64>() {
            Ok(n) if n > 0 => out.window = Duration::from_secs(n),
            _ => tracing::warn!(var = %format!("{prefix}_WINDOW_SECS"), value = %val, "Invalid window, using default"),
        }
    }
    out
}
