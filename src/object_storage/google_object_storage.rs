//! GCS-backed `ObjectStorage`, adapted from the teacher's `GoogleOS`
//! (originally wrapping an internal `ObjectStorageService`) to call the
//! `google-cloud-storage` crate directly — the teacher already depends on
//! it elsewhere in the cloud-provider stack, so no new crate is introduced.

use async_trait::async_trait;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};

use super::errors::ObjectStorageError;
use super::ObjectStorage;

pub struct GoogleOS {
    client: Client,
    bucket_name: String,
    prefix: String,
}

impl GoogleOS {
    pub async fn new(bucket_name: impl Into<String>, prefix: impl Into<String>) -> Result<Self, ObjectStorageError> {
        let bucket_name = bucket_name.into();
        let config = ClientConfig::default().with_auth().await.map_err(|e| ObjectStorageError::CannotUploadFile {
            bucket_name: bucket_name.clone(),
            file_name: String::new(),
            raw_error_message: e.to_string(),
        })?;
        Ok(Self {
            client: Client::new(config),
            bucket_name,
            prefix: prefix.into(),
        })
    }

    fn object_key(&self, filename: &str) -> String {
        format!("{}/{}", self.prefix, filename)
    }

    fn public_url(&self, filename: &str) -> String {
        format!(
            "https://storage.googleapis.com/{}/{}",
            self.bucket_name,
            self.object_key(filename)
        )
    }
}

#[async_trait]
impl ObjectStorage for GoogleOS {
    async fn upload(&self, object_key: &str, content: &str) -> Result<String, ObjectStorageError> {
        let key = self.object_key(object_key);
        let upload_type = UploadType::Simple(Media::new(key.clone()));
        self.client
            .upload_object(
                &UploadObjectRequest {
                    bucket: self.bucket_name.clone(),
                    ..Default::default()
                },
                content.as_bytes().to_vec(),
                &upload_type,
            )
            .await
            .map_err(|e| ObjectStorageError::CannotUploadFile {
                bucket_name: self.bucket_name.clone(),
                file_name: object_key.to_string(),
                raw_error_message: e.to_string(),
            })?;
        Ok(self.public_url(object_key))
    }

    async fn fetch(&self, object_key: &str) -> Result<String, ObjectStorageError> {
        let key = self.object_key(object_key);
        let bytes = self
            .client
            .download_object(
                &GetObjectRequest {
                    bucket: self.bucket_name.clone(),
                    object: key,
                    ..Default::default()
                },
                &Range::default(),
            )
            .await
            .map_err(|e| ObjectStorageError::CannotGetObjectFile {
                bucket_name: self.bucket_name.clone(),
                file_name: object_key.to_string(),
                raw_error_message: e.to_string(),
            })?;
        String::from_utf8(bytes).map_err(|e| ObjectStorageError::CannotGetObjectFile {
            bucket_name: self.bucket_name.clone(),
            file_name: object_key.to_string(),
            raw_error_message: e.to_string(),
        })
    }
}
