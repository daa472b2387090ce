//! Artifact Sink (C3): uploads text blobs (container logs) to a fixed
//! bucket and returns a public URL (spec §4.6). Grounded on the teacher's
//! `ObjectStorage` trait shape, narrowed to the one operation the worker
//! actually needs.

pub mod errors;
pub mod google_object_storage;
pub mod memory;

use async_trait::async_trait;

use self::errors::ObjectStorageError;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Uploads `content` under `object_key`, overwriting if it already
    /// exists, and returns the public URL spec §4.6 specifies:
    /// `https://storage.<provider>/<bucket>/<prefix>/<filename>`.
    async fn upload(&self, object_key: &str, content: &str) -> Result<String, ObjectStorageError>;

    /// Round-trip counterpart used by tests (spec §8 "upload(x, f);
    /// fetch(url_of(f)) == x").
    async fn fetch(&self, object_key: &str) -> Result<String, ObjectStorageError>;
}
