//! Encrypted content vault.
//!
//! File bytes never touch disk in the clear: content is sealed with
//! XChaCha20-Poly1305 under the server master key and stored in one flat
//! directory, keyed by the file's UUID. Metadata lives in the store; this
//! layer only ever sees opaque ciphertext files.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use coffre_core::crypto::{self, SymmetricKey};

use crate::error::ServerError;

#[derive(Debug, Clone)]
pub struct Vault {
    base_path: PathBuf,
    key: SymmetricKey,
    max_size: usize,
}

impl Vault {
    pub async fn new(
        base_path: PathBuf,
        key: SymmetricKey,
        max_size: usize,
    ) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::Unavailable(format!(
                "Failed to create vault directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Vault initialized");

        Ok(Self {
            base_path,
            key,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Encrypt and persist plaintext under the given file id.
    pub async fn store(&self, id: Uuid, plaintext: &[u8]) -> Result<(), ServerError> {
        if plaintext.is_empty() {
            return Err(ServerError::InvalidInput("empty file content".to_string()));
        }
        if plaintext.len() > self.max_size {
            return Err(ServerError::PayloadTooLarge {
                size: plaintext.len(),
                max: self.max_size,
            });
        }

        let sealed = crypto::encrypt(&self.key, plaintext)
            .map_err(|e| ServerError::Internal(format!("encrypt failed for {id}: {e}")))?;

        let path = self.blob_path(id);
        fs::write(&path, &sealed)
            .await
            .map_err(|e| ServerError::Unavailable(format!("Failed to write blob {id}: {e}")))?;

        debug!(id = %id, size = plaintext.len(), "Stored encrypted blob");
        Ok(())
    }

    /// Read, decrypt, and integrity-check content for the given file id.
    ///
    /// `expected_hash` is the BLAKE3 hash recorded at upload; a mismatch
    /// after successful decryption means the vault and metadata disagree.
    pub async fn load(&self, id: Uuid, expected_hash: &str) -> Result<Vec<u8>, ServerError> {
        let path = self.blob_path(id);

        if !path.exists() {
            return Err(ServerError::NotFound(format!("content missing for file {id}")));
        }

        let sealed = fs::read(&path)
            .await
            .map_err(|e| ServerError::Unavailable(format!("Failed to read blob {id}: {e}")))?;

        let plaintext = crypto::decrypt(&self.key, &sealed)
            .map_err(|e| ServerError::Internal(format!("decrypt failed for {id}: {e}")))?;

        if crypto::content_hash(&plaintext) != expected_hash {
            return Err(ServerError::Internal(format!(
                "content hash mismatch for file {id}"
            )));
        }

        debug!(id = %id, size = plaintext.len(), "Retrieved blob");
        Ok(plaintext)
    }

    /// Remove the blob for a deleted file. Tolerates a missing blob: the
    /// metadata row is already gone, so there is nothing left to protect.
    pub async fn remove(&self, id: Uuid) {
        let path = self.blob_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => debug!(id = %id, "Deleted blob"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(id = %id, "Blob already absent on delete");
            }
            Err(e) => warn!(id = %id, error = %e, "Failed to delete blob"),
        }
    }

    // Blob names are UUID renderings, so the path cannot escape the base
    // directory.
    fn blob_path(&self, id: Uuid) -> PathBuf {
        self.base_path.join(id.to_string())
    }
}
