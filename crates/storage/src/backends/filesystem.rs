//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::BackendClient;
use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Bytes escaped in file names. `%` is escaped so encoding stays injective.
const FILE_NAME: &AsciiSet = &CONTROLS.add(b'/').add(b'\\').add(b'%');

const MAX_FILE_NAME: usize = 255;

/// Map a name to a single file name.
///
/// Encoded names never start with `%s`, so the hashed form for names over
/// `NAME_MAX` cannot collide with an encoded one.
fn file_name(name: &str) -> String {
    let encoded = utf8_percent_encode(name, FILE_NAME).to_string();
    if encoded.len() <= MAX_FILE_NAME {
        return encoded;
    }
    format!("%sha256-{:x}", Sha256::digest(name.as_bytes()))
}

/// Local filesystem backend. Each name maps to one flat file directly under
/// `root`, so a name may be a prefix of another (`a/b` and `a/b/c`).
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Get the full path for a name, with path traversal protection.
    ///
    /// Runs on the blocking pool since it canonicalizes and stats paths.
    async fn key_path(&self, name: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &name))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Returns an error if the name would escape the storage root, including
    /// through a symlinked ancestor directory.
    fn key_path_sync(root: &Path, name: &str) -> StorageResult<PathBuf> {
        if name.is_empty() || name.starts_with('/') || name.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {name}"
            )));
        }

        for component in Path::new(name).components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {name}"
                )));
            }
        }

        let path = root.join(file_name(name));
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Walk up to the nearest existing ancestor (or the path itself) and
        // make sure it resolves inside the root.
        let mut candidate = Some(path.as_path());
        while let Some(current) = candidate {
            match std::fs::symlink_metadata(current) {
                Ok(_) => {
                    let canonical = current.canonicalize().map_err(|_| {
                        StorageError::InvalidKey(format!("symlink target missing or invalid: {name}"))
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {name}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    candidate = current.parent();
                }
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat path: {err}"),
                    )));
                }
            }
        }

        Ok(path)
    }
}

#[async_trait]
impl BackendClient for FilesystemBackend {
    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn upload(&self, name: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(name).await?;

        // Temp file + fsync + rename; the UUID keeps concurrent writers apart
        let temp_path = self.root.join(format!(".tmp.{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn download(&self, name: &str) -> StorageResult<Bytes> {
        let path = self.key_path(name).await?;
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Bytes::from(data))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn health_check(&self) -> StorageResult<()> {
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(StorageError::Config(format!(
                "storage root is not a directory: {}",
                self.root.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_upload_download_nested_name() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        backend
            .upload("uber-usi/labrat", Bytes::from_static(b"sha256:abc"))
            .await
            .unwrap();
        let data = backend.download("uber-usi/labrat").await.unwrap();
        assert_eq!(&data[..], b"sha256:abc");
        assert!(temp.path().join("uber-usi%2Flabrat").is_file());
    }

    #[tokio::test]
    async fn test_name_may_prefix_another() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        backend
            .upload("uber-usi/labrat", Bytes::from_static(b"sha256:aa"))
            .await
            .unwrap();
        backend
            .upload("uber-usi/labrat/v2", Bytes::from_static(b"sha256:bb"))
            .await
            .unwrap();
        backend
            .upload("uber-usi", Bytes::from_static(b"sha256:cc"))
            .await
            .unwrap();

        assert_eq!(&backend.download("uber-usi/labrat").await.unwrap()[..], b"sha256:aa");
        assert_eq!(&backend.download("uber-usi/labrat/v2").await.unwrap()[..], b"sha256:bb");
        assert_eq!(&backend.download("uber-usi").await.unwrap()[..], b"sha256:cc");
    }

    #[test]
    fn test_file_name_encoding() {
        assert_eq!(file_name("uber-usi/labrat"), "uber-usi%2Flabrat");
        // Distinct names stay distinct once encoded.
        assert_ne!(file_name("a%2Fb"), file_name("a/b"));

        let long = "x/".repeat(200);
        let hashed = file_name(&long);
        assert!(hashed.starts_with("%sha256-"));
        assert!(hashed.len() <= MAX_FILE_NAME);
    }

    #[tokio::test]
    async fn test_long_name_round_trips() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();
        let name = format!("uber-usi/{}", "a/".repeat(150));

        backend
            .upload(&name, Bytes::from_static(b"sha256:dd"))
            .await
            .unwrap();
        assert_eq!(&backend.download(&name).await.unwrap()[..], b"sha256:dd");
    }

    #[tokio::test]
    async fn test_upload_overwrites() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        backend.upload("t", Bytes::from_static(b"one")).await.unwrap();
        backend.upload("t", Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(&backend.download("t").await.unwrap()[..], b"two");
    }

    #[tokio::test]
    async fn test_download_missing_is_not_found() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path()).await.unwrap();

        let err = backend.download("missing/tag").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let temp = tempdir().unwrap();
        let backend = FilesystemBackend::new(temp.path().join("root"))
            .await
            .unwrap();

        for name in ["../escape", "/etc/passwd", "a/../../b", ""] {
            let err = backend
                .upload(name, Bytes::from_static(b"x"))
                .await
                .unwrap_err();
            assert!(
                matches!(err, StorageError::InvalidKey(_)),
                "expected InvalidKey for {name:?}, got {err:?}"
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rejects_symlink_out_of_root() {
        let temp = tempdir().unwrap();
        let outside = temp.path().join("outside");
        std::fs::write(&outside, b"sha256:secret").unwrap();
        let root = temp.path().join("root");
        let backend = FilesystemBackend::new(&root).await.unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let err = backend.download("link").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        let err = backend
            .upload("link", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert_eq!(std::fs::read(&outside).unwrap(), b"sha256:secret");
    }
}
