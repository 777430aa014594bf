//! Object storage interface for raw observation files (MinIO/S3 compatible).

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use object_store::{
    aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory, path::Path, ObjectStore,
    RetryConfig,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;
use tracing::{debug, info, instrument};

use wx_common::{WxError, WxResult};

/// Configuration for object storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
    /// Serve files from a local directory instead of S3
    #[serde(default)]
    pub local_root: Option<String>,
    /// Retry attempts for transient request failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_max_retries() -> usize {
    5
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".to_string(),
            bucket: "weather-raw".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "eu-north-1".to_string(),
            allow_http: true,
            local_root: None,
            max_retries: default_max_retries(),
        }
    }
}

/// Object storage client for raw observation files.
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    /// Create a new object storage client from config.
    pub fn new(config: &ObjectStorageConfig) -> WxResult<Self> {
        if let Some(root) = &config.local_root {
            let store = LocalFileSystem::new_with_prefix(root).map_err(|e| {
                WxError::StorageError(format!("Failed to open local root {}: {}", root, e))
            })?;
            return Ok(Self::from_store(Arc::new(store), root.clone()));
        }

        let retry = RetryConfig {
            max_retries: config.max_retries,
            ..Default::default()
        };

        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region)
            .with_retry(retry);

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| WxError::StorageError(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self::from_store(Arc::new(store), config.bucket.clone()))
    }

    /// Wrap an existing store.
    pub fn from_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Process-local store, used by tests and dry runs.
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(InMemory::new()), "memory")
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Write bytes to a path in the bucket.
    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> WxResult<()> {
        let location = Path::from(path);
        debug!(size = data.len(), "Writing object");

        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| WxError::StorageError(format!("Failed to write {}: {}", path, e)))?;

        Ok(())
    }

    /// Read bytes from a path.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get(&self, path: &str) -> WxResult<Bytes> {
        let location = Path::from(path);

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| read_error(path, e))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| WxError::StorageError(format!("Failed to read bytes: {}", e)))?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Check if an object exists.
    pub async fn exists(&self, path: &str) -> WxResult<bool> {
        let location = Path::from(path);

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(WxError::StorageError(format!(
                "Failed to check {}: {}",
                path, e
            ))),
        }
    }

    /// List objects with a given prefix.
    pub async fn list(&self, prefix: &str) -> WxResult<Vec<String>> {
        let prefix_path = Path::from(prefix);
        let mut paths = Vec::new();

        let mut stream = self.store.list(Some(&prefix_path));
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| WxError::StorageError(format!("List failed: {}", e)))?
        {
            paths.push(meta.location.to_string());
        }

        Ok(paths)
    }

    /// List keys under `prefix` ending with `extension`, sorted.
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn list_matching_files(&self, prefix: &str, extension: &str) -> WxResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .list(prefix)
            .await?
            .into_iter()
            .filter(|key| key.ends_with(extension))
            .collect();
        keys.sort();

        info!(count = keys.len(), prefix = %prefix, extension = %extension, "Listed raw files");
        Ok(keys)
    }

    /// Stream the non-empty lines of an object.
    ///
    /// The body is read incrementally; nothing is buffered beyond the current line.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn stream_lines(&self, path: &str) -> WxResult<BoxStream<'static, WxResult<String>>> {
        let location = Path::from(path);
        debug!("Streaming object lines");

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| read_error(path, e))?;

        let body = result
            .into_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let lines = LinesStream::new(StreamReader::new(body).lines())
            .map_err(WxError::from)
            .try_filter(|line| futures::future::ready(!line.trim().is_empty()));

        Ok(lines.boxed())
    }

    /// SHA-256 hex digest of an object's content, computed by streaming the body.
    ///
    /// Independent of the store's ETag, which is not a content digest for
    /// multipart uploads.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn content_hash(&self, path: &str) -> WxResult<String> {
        let location = Path::from(path);

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| read_error(path, e))?;

        let mut body = result.into_stream();
        let mut hasher = Sha256::new();
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| WxError::StorageError(format!("Failed to read {}: {}", path, e)))?
        {
            hasher.update(&chunk);
        }

        let digest = hex::encode(hasher.finalize());
        debug!(digest = %digest, "Computed content hash");
        Ok(digest)
    }

    /// Delete an object.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn delete(&self, path: &str) -> WxResult<()> {
        let location = Path::from(path);

        self.store
            .delete(&location)
            .await
            .map_err(|e| WxError::StorageError(format!("Failed to delete {}: {}", path, e)))?;

        Ok(())
    }
}

/// SHA-256 hex digest of an in-memory buffer, same encoding as [`ObjectStorage::content_hash`].
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn read_error(path: &str, err: object_store::Error) -> WxError {
    match err {
        object_store::Error::NotFound { .. } => WxError::NotFound(path.to_string()),
        e => WxError::StorageError(format!("Failed to read {}: {}", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> ObjectStorage {
        let storage = ObjectStorage::in_memory();
        storage
            .put("raw/InfoClimat/2024.jsonl", Bytes::from_static(b"{\"a\":1}\n\n{\"a\":2}\r\n"))
            .await
            .unwrap();
        storage
            .put("raw/Ichtegem_011024/day.jsonl", Bytes::from_static(b"{}\n"))
            .await
            .unwrap();
        storage
            .put("raw/notes.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        storage
    }

    #[tokio::test]
    async fn test_list_matching_files_filters_extension() {
        let storage = seeded().await;
        let keys = storage.list_matching_files("raw", ".jsonl").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "raw/Ichtegem_011024/day.jsonl".to_string(),
                "raw/InfoClimat/2024.jsonl".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_lines_skips_blank_lines() {
        let storage = seeded().await;
        let lines: Vec<String> = storage
            .stream_lines("raw/InfoClimat/2024.jsonl")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(lines, vec!["{\"a\":1}".to_string(), "{\"a\":2}".to_string()]);
    }

    #[tokio::test]
    async fn test_content_hash_is_deterministic() {
        let storage = seeded().await;
        let first = storage.content_hash("raw/notes.txt").await.unwrap();
        let second = storage.content_hash("raw/notes.txt").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, hash_bytes(b"hello"));
        assert_eq!(
            first,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn test_content_hash_changes_with_content() {
        let storage = seeded().await;
        let before = storage.content_hash("raw/notes.txt").await.unwrap();
        storage
            .put("raw/notes.txt", Bytes::from_static(b"hello!"))
            .await
            .unwrap();
        let after = storage.content_hash("raw/notes.txt").await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let storage = seeded().await;
        let err = storage.content_hash("raw/missing.jsonl").await.unwrap_err();
        assert!(matches!(err, WxError::NotFound(_)));
        assert!(!storage.exists("raw/missing.jsonl").await.unwrap());
    }
}
