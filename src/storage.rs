use std::path::PathBuf;

use anyhow::Context;
use axum::async_trait;
use bytes::Bytes;

/// Seam for media file persistence. Keys are relative paths such as
/// `recipe/<uuid>.png`; the production backend writes them under the
/// configured media root, where they are served back via `/media`.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl StorageClient for MediaStorage {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create media dir {}", parent.display()))?;
        }
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write media file {}", path.display()))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        let path = self.root.join(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Already gone is fine.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove media file {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("recipebook-storage-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn put_then_read_back() {
        let root = temp_root();
        let storage = MediaStorage::new(root.clone());
        storage
            .put_object("recipe/test.png", Bytes::from_static(b"png-bytes"))
            .await
            .expect("put should succeed");

        let on_disk = tokio::fs::read(root.join("recipe/test.png"))
            .await
            .expect("file should exist");
        assert_eq!(on_disk, b"png-bytes");

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let root = temp_root();
        let storage = MediaStorage::new(root.clone());
        storage
            .put_object("recipe/gone.jpg", Bytes::from_static(b"x"))
            .await
            .expect("put should succeed");
        storage
            .delete_object("recipe/gone.jpg")
            .await
            .expect("delete should succeed");
        assert!(!root.join("recipe/gone.jpg").exists());

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let storage = MediaStorage::new(temp_root());
        storage
            .delete_object("recipe/never-existed.webp")
            .await
            .expect("deleting a missing key should not error");
    }
}
