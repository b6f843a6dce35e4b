//! Local-directory object store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::store::{ObjectStore, StoreError, StoreResult};

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Stores objects as plain files under a root directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// The root is created if absent.
    pub fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        Ok(Self { root })
    }

    fn object_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn upload_file(&self, path: &Path) -> StoreResult<()> {
        let name = path
            .file_name()
            .ok_or_else(|| StoreError::Other(format!("not a file path: {}", path.display())))?;
        let dest = self.root.join(name);
        std::fs::copy(path, &dest).map_err(|e| io_err(path, e))?;
        debug!(src = %path.display(), dest = %dest.display(), "file uploaded");
        Ok(())
    }

    async fn upload_directory(&self, dir: &Path, prefix: &str) -> StoreResult<()> {
        for entry in WalkDir::new(dir) {
            let entry = entry.map_err(|e| StoreError::Other(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| StoreError::Other(e.to_string()))?;
            let dest = self.root.join(prefix).join(rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            std::fs::copy(entry.path(), &dest).map_err(|e| io_err(entry.path(), e))?;
        }
        debug!(dir = %dir.display(), prefix, "directory uploaded");
        Ok(())
    }

    async fn delete_file(&self, name: &str) -> StoreResult<()> {
        let path = self.object_path(name);
        std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    async fn file_exists(&self, name: &str) -> bool {
        self.object_path(name).is_file()
    }

    async fn list_files(&self) -> Vec<String> {
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "listing failed, returning partial result");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                names.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn upload_exists_list_delete() {
        let work = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let store = FsStore::new(root.path()).unwrap();

        let file = work.path().join("result_0.txt");
        write(&file, "10 plus 20 is 30");

        store.upload_file(&file).await.unwrap();
        assert!(store.file_exists("result_0.txt").await);
        assert_eq!(store.list_files().await, vec!["result_0.txt"]);

        store.delete_file("result_0.txt").await.unwrap();
        assert!(!store.file_exists("result_0.txt").await);
        assert!(store.list_files().await.is_empty());
    }

    #[tokio::test]
    async fn upload_directory_preserves_structure() {
        let work = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let store = FsStore::new(root.path()).unwrap();

        write(&work.path().join("a.txt"), "a");
        write(&work.path().join("sub/b.txt"), "b");

        store.upload_directory(work.path(), "renders").await.unwrap();
        assert_eq!(
            store.list_files().await,
            vec!["renders/a.txt", "renders/sub/b.txt"]
        );
        assert!(store.file_exists("renders/sub/b.txt").await);
    }

    #[tokio::test]
    async fn missing_file_operations_degrade() {
        let root = tempfile::tempdir().unwrap();
        let store = FsStore::new(root.path()).unwrap();

        assert!(!store.file_exists("ghost.txt").await);
        assert!(store.delete_file("ghost.txt").await.is_err());
        assert!(store.upload_file(Path::new("/no/such/file")).await.is_err());
    }
}
