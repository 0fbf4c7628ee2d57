use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::ObjectStore;
use crate::error::StorageError;

/// Object store on the local filesystem. Each container is a directory under
/// `root`; object names may contain `/` and map to nested paths.
#[derive(Debug, Clone)]
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `container/name` under the root, rejecting anything that
    /// could escape it.
    fn object_path(&self, container: &str, name: &str) -> Result<PathBuf, StorageError> {
        if container.is_empty()
            || !container
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(StorageError::InvalidName(container.to_string()));
        }

        let relative = Path::new(name);
        let valid = !name.is_empty()
            && !name.contains('\\')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidName(name.to_string()));
        }

        Ok(self.root.join(container).join(relative))
    }

    async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    /// Writes to a sibling temp file and renames it into place, so readers
    /// never observe a partially written object.
    async fn put(&self, container: &str, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.object_path(container, name)?;
        Self::ensure_parent(&path).await?;

        let tmp = path.with_file_name(format!(
            ".{}.tmp-{}",
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("object"),
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StorageError::Io {
                path: tmp.clone(),
                source: e,
            })?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::Io { path, source: e });
        }
        Ok(())
    }

    async fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(container, name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                container: container.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(StorageError::Io { path, source: e }),
        }
    }

    async fn delete(&self, container: &str, name: &str) -> Result<bool, StorageError> {
        let path = self.object_path(container, name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io { path, source: e }),
        }
    }

    async fn copy(
        &self,
        from_container: &str,
        name: &str,
        to_container: &str,
        to_name: &str,
    ) -> Result<(), StorageError> {
        let bytes = self.get(from_container, name).await?;
        self.put(to_container, to_name, &bytes).await
    }

    async fn exists(&self, container: &str, name: &str) -> Result<bool, StorageError> {
        let path = self.object_path(container, name)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::Io { path, source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = FileObjectStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip_nested_name() {
        let (_dir, store) = store();
        store
            .put("documents", "job-1/20260101_000000_a.pdf", b"%PDF-1.4")
            .await
            .unwrap();

        let bytes = store
            .get("documents", "job-1/20260101_000000_a.pdf")
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.4");
        assert!(store
            .root()
            .join("documents/job-1/20260101_000000_a.pdf")
            .exists());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.get("documents", "nope.pdf").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_reports_whether_removed() {
        let (_dir, store) = store();
        store.put("documents", "a.txt", b"x").await.unwrap();
        assert!(store.delete("documents", "a.txt").await.unwrap());
        assert!(!store.delete("documents", "a.txt").await.unwrap());
        assert!(!store.exists("documents", "a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_keeps_original() {
        let (_dir, store) = store();
        store.put("documents", "j/a.png", b"img").await.unwrap();
        store
            .copy("documents", "j/a.png", "processed", "j/processed_a.png")
            .await
            .unwrap();
        assert!(store.exists("documents", "j/a.png").await.unwrap());
        assert_eq!(
            store.get("processed", "j/processed_a.png").await.unwrap(),
            b"img"
        );
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() {
        let (_dir, store) = store();
        for name in ["../etc/passwd", "/abs/path", "a/../../b", "", "a\\b"] {
            let err = store.put("documents", name, b"x").await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidName(_)), "{}", name);
        }
        let err = store.put("../up", "a", b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidName(_)));
    }

    #[tokio::test]
    async fn test_put_overwrites_and_leaves_no_temp_files() {
        let (_dir, store) = store();
        store.put("documents", "a.txt", b"one").await.unwrap();
        store.put("documents", "a.txt", b"two").await.unwrap();
        assert_eq!(store.get("documents", "a.txt").await.unwrap(), b"two");

        let entries: Vec<_> = std::fs::read_dir(store.root().join("documents"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }
}
