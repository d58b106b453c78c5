//! Filesystem storage for receipt images.
//!
//! Files are content-addressed: the name is the SHA-256 of the bytes plus
//! the image extension, so storing the same image twice yields the same
//! reference and never overwrites different content.

use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use boxlane_core::{BlobRef, BlobStore, BlobStoreError, ImageType};

/// Receipt images stored under one directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Blob name for `bytes`.
    fn file_name(bytes: &[u8], image_type: ImageType) -> String {
        let digest = Sha256::digest(bytes);
        format!("{}.{}", hex::encode(digest), image_type.extension())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, bytes: &[u8], image_type: ImageType) -> Result<BlobRef, BlobStoreError> {
        let name = Self::file_name(bytes, image_type);
        let path = self.root.join(&name);

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| BlobStoreError(format!("create {}: {e}", self.root.display())))?;

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(BlobRef::new(name));
        }

        // Write under a temporary name so a crash never leaves a truncated blob.
        let partial = self.root.join(format!("{name}.partial"));
        tokio::fs::write(&partial, bytes)
            .await
            .map_err(|e| BlobStoreError(format!("write {}: {e}", partial.display())))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| BlobStoreError(format!("rename {}: {e}", path.display())))?;

        tracing::debug!(blob = %name, size = bytes.len(), "Stored receipt image");
        Ok(BlobRef::new(name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn scratch_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("boxlane-blobs-{label}-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_store_is_content_addressed() {
        let dir = scratch_dir("addr");
        let store = FsBlobStore::new(&dir);

        let first = store.store(PNG, ImageType::Png).await.unwrap();
        let second = store.store(PNG, ImageType::Png).await.unwrap();
        assert_eq!(first, second);
        assert!(first.as_str().ends_with(".png"));

        let written = tokio::fs::read(dir.join(first.as_str())).await.unwrap();
        assert_eq!(written, PNG);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[test]
    fn test_file_name_is_hex_digest() {
        let name = FsBlobStore::file_name(b"abc", ImageType::Jpeg);
        assert_eq!(
            name,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad.jpg"
        );
    }
}
