/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Maximum upload size in bytes (50 MiB)
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default page size for paginated listings
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Hard cap on a caller-supplied page size
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Key derivation context (BLAKE3) for deriving the vault key from a passphrase
pub const KDF_CONTEXT_VAULT_KEY: &str = "coffre-vault-key-v1";
