//! In-memory `ObjectStorage` double used by tests, analogous to
//! `registry::memory::MemoryRegistry` and `container_runtime::fake`. Stores
//! blobs keyed by object key and returns the same fixed-prefix public URL
//! shape spec §4.6 specifies, so round-trip tests can fetch by URL.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::errors::ObjectStorageError;
use super::ObjectStorage;

pub struct MemoryObjectStorage {
    bucket: String,
    prefix: String,
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryObjectStorage {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    fn public_url(&self, object_key: &str) -> String {
        format!("https://storage.memory/{}/{}/{}", self.bucket, self.prefix, object_key)
    }
}

impl Default for MemoryObjectStorage {
    fn default() -> Self {
        Self::new(crate::config::LOG_BUCKET, crate::config::LOG_BUCKET_PREFIX)
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(&self, object_key: &str, content: &str) -> Result<String, ObjectStorageError> {
        self.blobs
            .lock()
            .expect("memory object storage mutex poisoned")
            .insert(object_key.to_string(), content.to_string());
        Ok(self.public_url(object_key))
    }

    async fn fetch(&self, object_key: &str) -> Result<String, ObjectStorageError> {
        self.blobs
            .lock()
            .expect("memory object storage mutex poisoned")
            .get(object_key)
            .cloned()
            .ok_or_else(|| ObjectStorageError::CannotGetObjectFile {
                bucket_name: self.bucket.clone(),
                file_name: object_key.to_string(),
                raw_error_message: "no such object".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_fetch_round_trips_by_url() {
        let storage = MemoryObjectStorage::default();
        let url = storage.upload("job-1.txt", "hello world").await.unwrap();
        assert!(url.starts_with("https://storage.memory/"));
        let object_key = url.rsplit('/').next().unwrap();
        let fetched = storage.fetch(object_key).await.unwrap();
        assert_eq!(fetched, "hello world");
    }

    #[tokio::test]
    async fn fetch_missing_object_errors() {
        let storage = MemoryObjectStorage::default();
        assert!(storage.fetch("nope.txt").await.is_err());
    }
}
