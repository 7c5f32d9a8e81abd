//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `users`, `files`, `share_grants`, and
//! `activity_log`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,          -- UUID v4
    email         TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password_hash TEXT NOT NULL,                      -- Argon2id PHC string
    role          TEXT NOT NULL DEFAULT 'user',       -- 'user' | 'admin'
    is_locked     INTEGER NOT NULL DEFAULT 0,         -- boolean 0/1
    created_at    TEXT NOT NULL                       -- ISO-8601 / RFC-3339
);

CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

-- ----------------------------------------------------------------
-- Files (metadata only; encrypted content lives in the vault dir)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS files (
    id           TEXT PRIMARY KEY NOT NULL,           -- UUID v4
    owner_id     TEXT NOT NULL,                       -- FK -> users(id)
    file_name    TEXT NOT NULL,
    file_type    TEXT NOT NULL,                       -- MIME string
    size         INTEGER NOT NULL,                    -- plaintext bytes
    content_hash TEXT NOT NULL,                       -- BLAKE3 of plaintext, hex
    created_at   TEXT NOT NULL,

    FOREIGN KEY (owner_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_files_owner ON files(owner_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_files_owner_name ON files(owner_id, file_name);

-- ----------------------------------------------------------------
-- Share grants: at most one per (file, grantee); re-share overwrites
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS share_grants (
    file_id       TEXT NOT NULL,                      -- FK -> files(id)
    grantor_id    TEXT NOT NULL,                      -- FK -> users(id)
    grantee_email TEXT NOT NULL COLLATE NOCASE,
    permission    TEXT NOT NULL,                      -- 'view' | 'download' | 'view_download'
    created_at    TEXT NOT NULL,

    PRIMARY KEY (file_id, grantee_email),
    FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_share_grants_grantee ON share_grants(grantee_email);

-- ----------------------------------------------------------------
-- Activity log: append-only; rowid is the pagination tie-breaker
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS activity_log (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_email TEXT NOT NULL COLLATE NOCASE,
    action     TEXT NOT NULL,
    metadata   TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activity_created
    ON activity_log(created_at DESC, id DESC);
CREATE INDEX IF NOT EXISTS idx_activity_user_action
    ON activity_log(user_email, action, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
