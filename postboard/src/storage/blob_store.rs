//! Filesystem blob storage
//!
//! Stores uploaded images under generated keys of the form
//! `<40 random lowercase alphanumerics>.<extension>`.
//! Files are organized in a two-level directory structure for performance.
//!
//! Example: key "abcd1234....png" is stored at "posts/ab/cd/abcd1234....png"

use super::{BlobStorage, StoredBlob};
use crate::config::IMAGE_KEY_RANDOM_CHARS;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const MAX_EXTENSION_LEN: usize = 5;
const MAX_KEY_ATTEMPTS: usize = 3;
const TEMP_SUFFIX: &str = ".tmp";

/// Blob store rooted at a directory
#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Create a new blob store at the given root directory
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Initialize the blob store (create directory if needed)
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        tracing::info!("Blob store initialized at: {:?}", self.root);
        Ok(())
    }

    /// Get blob store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get file path for a key
    fn get_path(&self, key: &str) -> Result<PathBuf> {
        if !is_valid_key(key) {
            return Err(AppError::BlobStore(format!("Invalid blob key: {:?}", key)));
        }

        // Two-level directory structure: posts/ab/cd/abcd1234...
        let prefix1 = &key[0..2];
        let prefix2 = &key[2..4];
        Ok(self.root.join(prefix1).join(prefix2).join(key))
    }

    async fn write_new(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.get_path(key)?;

        // Create parent directories
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to temp file first (atomic write)
        let temp_path = temp_path_for(&path, key);
        if let Err(e) = write_atomic(&temp_path, &path, data).await {
            match fs::remove_file(&temp_path).await {
                Ok(()) => {}
                Err(cleanup) if cleanup.kind() == ErrorKind::NotFound => {}
                Err(cleanup) => {
                    tracing::warn!("Could not remove temp file {:?}: {}", temp_path, cleanup);
                }
            }
            return Err(e.into());
        }

        Ok(())
    }

    fn scan_directory<'a>(
        &'a self,
        dir: &'a Path,
        files: &'a mut Vec<ScannedFile>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if !fs::try_exists(dir).await? {
                return Ok(());
            }

            let mut entries = fs::read_dir(dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let metadata = entry.metadata().await?;

                if metadata.is_dir() {
                    self.scan_directory(&path, files).await?;
                } else if metadata.is_file() {
                    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    let name = name.to_string();

                    files.push(ScannedFile {
                        name,
                        modified_at: DateTime::<Utc>::from(metadata.modified()?),
                        path,
                    });
                }
            }

            Ok(())
        })
    }

    async fn scan(&self) -> Result<Vec<ScannedFile>> {
        let mut files = Vec::new();
        self.scan_directory(&self.root, &mut files).await?;
        Ok(files)
    }
}

/// A regular file found under the store root
struct ScannedFile {
    path: PathBuf,
    name: String,
    modified_at: DateTime<Utc>,
}

impl ScannedFile {
    /// Temp file left by an interrupted `write_new`
    fn is_partial_write(&self) -> bool {
        self.name
            .strip_suffix(TEMP_SUFFIX)
            .is_some_and(is_valid_key)
    }
}

fn temp_path_for(path: &Path, key: &str) -> PathBuf {
    path.with_file_name(format!("{}{}", key, TEMP_SUFFIX))
}

async fn write_atomic(temp_path: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;

    // Rename to final location
    fs::rename(temp_path, path).await
}

#[async_trait]
impl BlobStorage for BlobStore {
    /// Write data under a freshly generated key
    async fn put(&self, data: &[u8], extension: &str) -> Result<String> {
        if !is_valid_extension(extension) {
            return Err(AppError::BlobStore(format!("Invalid extension: {:?}", extension)));
        }

        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = generate_key(extension);

            if self.exists(&key).await? {
                tracing::warn!("Generated blob key already taken: {}", key);
                continue;
            }

            self.write_new(&key, data).await?;
            tracing::debug!("Wrote blob: {} ({} bytes)", key, data.len());
            return Ok(key);
        }

        Err(AppError::BlobStore(
            "Could not generate an unused blob key".to_string(),
        ))
    }

    /// Read data from blob store
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.get_path(key)?;

        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AppError::BlobStore(format!("Blob not found: {}", key)));
            }
            Err(e) => return Err(e.into()),
        };

        let mut data = Vec::new();
        file.read_to_end(&mut data).await?;

        tracing::debug!("Read blob: {} ({} bytes)", key, data.len());

        Ok(data)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.get_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.get_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted blob: {}", key);
                Ok(())
            }
            // Already deleted
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<StoredBlob>> {
        // Leftover temp files and foreign files are not blobs
        let blobs = self
            .scan()
            .await?
            .into_iter()
            .filter(|file| is_valid_key(&file.name))
            .map(|file| StoredBlob {
                key: file.name,
                modified_at: file.modified_at,
            })
            .collect();
        Ok(blobs)
    }

    async fn purge_partial_writes(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;

        for file in self.scan().await? {
            if !file.is_partial_write() || file.modified_at > older_than {
                continue;
            }

            match fs::remove_file(&file.path).await {
                Ok(()) => {
                    tracing::debug!("Removed partial write: {}", file.name);
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(removed)
    }
}

fn generate_key(extension: &str) -> String {
    let stem: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(IMAGE_KEY_RANDOM_CHARS)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}.{}", stem, extension)
}

fn is_valid_extension(extension: &str) -> bool {
    !extension.is_empty()
        && extension.len() <= MAX_EXTENSION_LEN
        && extension
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

fn is_valid_key(key: &str) -> bool {
    let Some((stem, extension)) = key.split_once('.') else {
        return false;
    };

    stem.len() == IMAGE_KEY_RANDOM_CHARS
        && stem
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && is_valid_extension(extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store() -> (BlobStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = BlobStore::new(temp_dir.path().join("posts"));
        store.initialize().await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_put_and_read() {
        let (store, _temp) = create_test_store().await;

        let data = b"Hello, World!";
        let key = store.put(data, "png").await.unwrap();

        assert!(key.ends_with(".png"));
        assert_eq!(key.len(), IMAGE_KEY_RANDOM_CHARS + 4);

        let read_data = store.read(&key).await.unwrap();
        assert_eq!(data, read_data.as_slice());
    }

    #[tokio::test]
    async fn test_same_bytes_get_distinct_keys() {
        let (store, _temp) = create_test_store().await;

        let key1 = store.put(b"Same data", "jpg").await.unwrap();
        let key2 = store.put(b"Same data", "jpg").await.unwrap();
        assert_ne!(key1, key2);

        // Removing one copy leaves the other intact
        store.delete(&key1).await.unwrap();
        assert_eq!(store.read(&key2).await.unwrap(), b"Same data");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _temp) = create_test_store().await;

        let key = store.put(b"Delete test", "png").await.unwrap();
        assert!(store.exists(&key).await.unwrap());

        store.delete(&key).await.unwrap();
        assert!(!store.exists(&key).await.unwrap());

        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_blob() {
        let (store, _temp) = create_test_store().await;

        let missing = generate_key("png");
        let result = store.read(&missing).await;
        assert!(matches!(result, Err(AppError::BlobStore(_))));
    }

    #[tokio::test]
    async fn test_rejects_invalid_keys() {
        let (store, _temp) = create_test_store().await;

        let invalid = vec![
            String::new(),
            "ab".to_string(),
            "../../etc/passwd".to_string(),
            "nonexistent".to_string(),
            format!("{}.png", "A".repeat(40)),
            format!("{}.png/..", "a".repeat(40)),
        ];

        for key in &invalid {
            assert!(store.exists(key).await.is_err(), "accepted {:?}", key);
            assert!(store.delete(key).await.is_err(), "accepted {:?}", key);
        }

        assert!(store.put(b"data", "../x").await.is_err());
        assert!(store.put(b"data", "").await.is_err());
    }

    #[tokio::test]
    async fn test_directory_structure() {
        let (store, _temp) = create_test_store().await;

        let key = store.put(b"Directory test", "png").await.unwrap();

        let path = store.get_path(&key).unwrap();
        assert!(path.exists());

        // Check two-level structure
        let parent = path.parent().unwrap();
        let grandparent = parent.parent().unwrap();

        assert_eq!(parent.file_name().unwrap(), &key[2..4]);
        assert_eq!(grandparent.file_name().unwrap(), &key[0..2]);
        assert_eq!(grandparent.parent().unwrap(), store.root());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_temp_file() {
        let (store, _temp) = create_test_store().await;

        // A directory squatting on the final path makes the rename fail
        let key = generate_key("png");
        let path = store.get_path(&key).unwrap();
        fs::create_dir_all(&path).await.unwrap();

        assert!(store.write_new(&key, b"never lands").await.is_err());
        assert!(!temp_path_for(&path, &key).exists());
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn test_purge_partial_writes() {
        let (store, _temp) = create_test_store().await;

        let kept = store.put(b"Finished write", "png").await.unwrap();
        let key = generate_key("jpg");
        let path = store.get_path(&key).unwrap();
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        let partial = temp_path_for(&path, &key);
        fs::write(&partial, b"half an ima").await.unwrap();
        let foreign = path.with_file_name("leftover.tmp");
        fs::write(&foreign, b"not ours").await.unwrap();

        // Too recent
        let removed = store.purge_partial_writes(Utc::now() - chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(removed, 0);
        assert!(partial.exists());

        let removed = store.purge_partial_writes(Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!partial.exists());
        assert!(foreign.exists());
        assert!(store.exists(&kept).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_skips_foreign_files() {
        let (store, _temp) = create_test_store().await;

        let key1 = store.put(b"Data 1", "png").await.unwrap();
        let key2 = store.put(b"Data 2", "jpg").await.unwrap();

        // Simulated leftover of an interrupted write
        let stray = store.get_path(&key1).unwrap().with_file_name("leftover.tmp");
        fs::write(&stray, b"partial").await.unwrap();

        let mut keys: Vec<String> = store.list().await.unwrap().into_iter().map(|b| b.key).collect();
        keys.sort();

        let mut expected = vec![key1, key2];
        expected.sort();
        assert_eq!(keys, expected);
    }
}
