//! Shipping local files to object storage.
//!
//! Uploads overwrite whatever is stored under the key. Nothing is retried
//! here: failures are reported back so the caller (and ultimately the
//! external scheduler) decides what to do.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload, WriteMultipart};
use tokio::io::AsyncReadExt;

use crate::error::UploadError;
use crate::keys::ObjectKey;

/// Part size used for multipart uploads
pub const MULTIPART_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Parts of a single file allowed in flight at once
const MAX_PARTS_IN_FLIGHT: usize = 4;

/// Puts a local file under an object key, replacing any existing object.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload `local_path` to `key` and return the number of bytes sent.
    async fn upload(&self, local_path: &Path, key: &ObjectKey) -> Result<u64, UploadError>;
}

/// [`Uploader`] backed by an [`ObjectStore`].
///
/// Files up to `multipart_threshold` bytes go out as a single put. Larger
/// files use a multipart upload, which only becomes visible once completed
/// and is aborted on failure, so a failed upload never leaves a truncated
/// object behind.
#[derive(Debug, Clone)]
pub struct ObjectStoreUploader {
    object_store: Arc<dyn ObjectStore>,
    multipart_threshold: u64,
}

impl ObjectStoreUploader {
    pub fn new(object_store: Arc<dyn ObjectStore>, multipart_threshold: u64) -> Self {
        Self {
            object_store,
            multipart_threshold,
        }
    }

    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.object_store
    }

    async fn put_single(&self, local_path: &Path, location: &ObjectPath) -> Result<(), UploadError> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(UploadError::Read)?;
        self.object_store
            .put(location, PutPayload::from(data))
            .await?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        local_path: &Path,
        location: &ObjectPath,
    ) -> Result<(), UploadError> {
        let mut file = tokio::fs::File::open(local_path)
            .await
            .map_err(UploadError::Read)?;

        let upload = self.object_store.put_multipart(location).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, MULTIPART_CHUNK_SIZE);
        let mut buffer = vec![0u8; MULTIPART_CHUNK_SIZE];

        loop {
            let read = match file.read(&mut buffer).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) => {
                    abort(writer, location).await;
                    return Err(UploadError::Read(e));
                }
            };

            if let Err(e) = writer.wait_for_capacity(MAX_PARTS_IN_FLIGHT).await {
                abort(writer, location).await;
                return Err(e.into());
            }
            writer.write(&buffer[..read]);
        }

        // Surface failed parts while the upload can still be aborted
        if let Err(e) = writer.wait_for_capacity(0).await {
            abort(writer, location).await;
            return Err(e.into());
        }
        writer.finish().await?;
        Ok(())
    }
}

async fn abort(writer: WriteMultipart, location: &ObjectPath) {
    if let Err(e) = writer.abort().await {
        tracing::warn!(key = %location, error = %e, "Failed to abort multipart upload");
    }
}

#[async_trait]
impl Uploader for ObjectStoreUploader {
    async fn upload(&self, local_path: &Path, key: &ObjectKey) -> Result<u64, UploadError> {
        let location = key.to_path()?;
        let size = tokio::fs::metadata(local_path)
            .await
            .map_err(UploadError::Read)?
            .len();

        if size > self.multipart_threshold {
            tracing::debug!(
                path = %local_path.display(),
                key = %key,
                size_bytes = size,
                "Uploading with multipart"
            );
            self.put_multipart(local_path, &location).await?;
        } else {
            self.put_single(local_path, &location).await?;
        }

        Ok(size)
    }
}
