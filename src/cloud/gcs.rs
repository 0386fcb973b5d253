//! Google Cloud Storage backend.
//!
//! - Listing uses `objects.list` with prefix and delimiter; only the first
//!   page is returned and `ListPage::truncated` reports whether more exist
//! - Reads download the object in ranged requests pinned to the generation
//!   seen when the reader was opened
//! - Writes use a resumable upload session. Data is buffered until a full
//!   chunk (a multiple of 256KB, default 8MB) is available, so memory stays
//!   around one chunk regardless of object size
//! - Content type and metadata travel on the upload's object resource
//!
//! ## Example
//!
//! ```no_run
//! use bucket_zip::cloud::gcs::{GcsCredentials, GcsStore};
//! use bucket_zip::{FolderZipper, WriteOptions};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = GcsStore::builder()
//!     .bucket("my-bucket")
//!     .credentials(GcsCredentials::Default)
//!     .chunk_size(16 * 1024 * 1024)
//!     .build()?;
//!
//! let options = WriteOptions::new().content_type("application/zip");
//! FolderZipper::new(&store).pack("photos/2024", "photos-2024.zip", &options)?;
//! # Ok(())
//! # }
//! ```

use super::{blocking_runtime, ChunkReader, ChunkSource};
use crate::error::{StoreError, StoreResult};
use crate::store::{ListPage, ObjectDescriptor, ObjectSink, ObjectStore, WriteOptions};
use bytes::Bytes;
use google_cloud_auth::credentials::CredentialsFile;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::upload::{UploadObjectRequest, UploadType};
use google_cloud_storage::http::objects::Object;
use google_cloud_storage::http::resumable_upload_client::{
    ChunkSize, ResumableUploadClient, UploadStatus, UploadedRange,
};
use google_cloud_storage::http::Error as GcsError;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// Default chunk size for uploads and ranged downloads (8MB)
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// GCS chunk alignment (256KB)
pub const CHUNK_ALIGNMENT: usize = 256 * 1024;

/// How the store authenticates against GCS
#[derive(Debug, Clone, Default)]
pub enum GcsCredentials {
    /// Application default credentials (`GOOGLE_APPLICATION_CREDENTIALS`,
    /// gcloud user credentials, or the metadata server)
    #[default]
    Default,
    /// Service account key file in JSON format
    KeyFile(PathBuf),
    /// No credentials, for public buckets and local emulators
    Anonymous,
}

impl GcsCredentials {
    async fn client_config(&self) -> StoreResult<ClientConfig> {
        match self {
            GcsCredentials::Default => ClientConfig::default()
                .with_auth()
                .await
                .map_err(config_error),
            GcsCredentials::KeyFile(path) => {
                let file = CredentialsFile::new_from_file(path.to_string_lossy().into_owned())
                    .await
                    .map_err(|e| {
                        StoreError::Config(format!(
                            "failed to load credentials from {}: {e}",
                            path.display()
                        ))
                    })?;
                ClientConfig::default()
                    .with_credentials(file)
                    .await
                    .map_err(config_error)
            }
            GcsCredentials::Anonymous => Ok(ClientConfig::default().anonymous()),
        }
    }
}

fn config_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Config(format!("failed to configure GCS client: {err}"))
}

/// Blocking GCS store bound to one bucket
pub struct GcsStore {
    client: Client,
    bucket: String,
    chunk_size: usize,
    runtime: Runtime,
}

/// Builder for [`GcsStore`]
#[derive(Debug, Clone)]
pub struct GcsStoreBuilder {
    bucket: String,
    credentials: GcsCredentials,
    endpoint: Option<String>,
    chunk_size: usize,
}

impl GcsStore {
    /// Create a builder for configuring the GCS store.
    pub fn builder() -> GcsStoreBuilder {
        GcsStoreBuilder {
            bucket: String::new(),
            credentials: GcsCredentials::Default,
            endpoint: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Wrap an already-authenticated client.
    pub fn from_client(client: Client, bucket: impl Into<String>) -> StoreResult<Self> {
        Ok(Self {
            client,
            bucket: bucket.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            runtime: blocking_runtime()?,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_request(&self, name: &str) -> GetObjectRequest {
        GetObjectRequest {
            bucket: self.bucket.clone(),
            object: name.to_string(),
            ..Default::default()
        }
    }
}

impl GcsStoreBuilder {
    /// Set the GCS bucket name.
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Set how the client authenticates.
    pub fn credentials(mut self, credentials: GcsCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Override the storage endpoint, e.g. `http://localhost:4443` for an emulator.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the upload/download chunk size.
    ///
    /// # Panics
    ///
    /// Panics if chunk_size is zero or not a multiple of 256KB.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        assert!(
            chunk_size > 0 && chunk_size % CHUNK_ALIGNMENT == 0,
            "Chunk size must be a non-zero multiple of 256KB"
        );
        self.chunk_size = chunk_size;
        self
    }

    /// Authenticate and build the store.
    pub fn build(self) -> StoreResult<GcsStore> {
        if self.bucket.is_empty() {
            return Err(StoreError::Config("GCS bucket must be set".to_string()));
        }

        let runtime = blocking_runtime()?;
        let mut config = runtime.block_on(self.credentials.client_config())?;
        if let Some(endpoint) = self.endpoint {
            config.storage_endpoint = endpoint;
        }

        Ok(GcsStore {
            client: Client::new(config),
            bucket: self.bucket,
            chunk_size: self.chunk_size,
            runtime,
        })
    }
}

impl ObjectStore for GcsStore {
    fn list(&self, prefix: &str, delimiter: &str) -> StoreResult<ListPage> {
        let request = ListObjectsRequest {
            bucket: self.bucket.clone(),
            prefix: Some(prefix.to_string()),
            delimiter: (!delimiter.is_empty()).then(|| delimiter.to_string()),
            ..Default::default()
        };

        let response = self
            .runtime
            .block_on(self.client.list_objects(&request))
            .map_err(|e| map_error(prefix, e))?;

        Ok(ListPage {
            objects: response
                .items
                .unwrap_or_default()
                .into_iter()
                .map(descriptor)
                .collect(),
            truncated: response.next_page_token.is_some(),
        })
    }

    fn open_read(&self, name: &str) -> StoreResult<Box<dyn Read + '_>> {
        let mut request = self.object_request(name);
        let object = self
            .runtime
            .block_on(self.client.get_object(&request))
            .map_err(|e| map_error(name, e))?;

        request.generation = Some(object.generation);
        Ok(Box::new(ChunkReader::new(RangedDownload {
            store: self,
            request,
            size: object.size.max(0) as u64,
            position: 0,
        })))
    }

    fn open_write(
        &self,
        name: &str,
        options: &WriteOptions,
    ) -> StoreResult<Box<dyn ObjectSink + '_>> {
        let resource = Object {
            name: name.to_string(),
            content_type: options.content_type.clone(),
            metadata: options.metadata.clone(),
            ..Default::default()
        };
        let request = UploadObjectRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };

        let uploader = self
            .runtime
            .block_on(
                self.client
                    .prepare_resumable_upload(&request, &UploadType::Multipart(Box::new(resource))),
            )
            .map_err(|e| map_error(name, e))?;

        debug!(bucket = %self.bucket, object = %name, "started resumable upload");
        Ok(Box::new(GcsObjectWriter {
            store: self,
            name: name.to_string(),
            options: options.clone(),
            uploader: Some(uploader),
            buffer: Vec::with_capacity(self.chunk_size),
            uploaded: 0,
        }))
    }
}

fn descriptor(object: Object) -> ObjectDescriptor {
    ObjectDescriptor {
        name: object.name,
        size: object.size.max(0) as u64,
        content_type: object.content_type,
        metadata: object.metadata,
    }
}

fn map_error(name: &str, err: GcsError) -> StoreError {
    match err {
        GcsError::Response(ref response) if response.code == 404 => {
            StoreError::NotFound(name.to_string())
        }
        other => StoreError::Backend(format!("GCS request for `{name}` failed: {other}")),
    }
}

/// Downloads one generation of an object, one chunk per request
struct RangedDownload<'a> {
    store: &'a GcsStore,
    request: GetObjectRequest,
    size: u64,
    position: u64,
}

impl ChunkSource for RangedDownload<'_> {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.position >= self.size {
            return Ok(None);
        }

        let last = (self.position + self.store.chunk_size as u64).min(self.size) - 1;
        let range = Range(Some(self.position), Some(last));
        let data = self
            .store
            .runtime
            .block_on(self.store.client.download_object(&self.request, &range))
            .map_err(|e| io::Error::other(map_error(&self.request.object, e)))?;

        if data.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "`{}` ended at byte {} of {}",
                    self.request.object, self.position, self.size
                ),
            ));
        }
        self.position += data.len() as u64;
        Ok(Some(Bytes::from(data)))
    }
}

/// Resumable upload sink.
///
/// Every chunk except the last must be exactly `chunk_size` bytes, so a full
/// chunk is only sent once more data is known to follow it. `close` sends the
/// remainder together with the total size, which commits the object.
pub struct GcsObjectWriter<'a> {
    store: &'a GcsStore,
    name: String,
    options: WriteOptions,
    uploader: Option<ResumableUploadClient>,
    buffer: Vec<u8>,
    uploaded: u64,
}

impl GcsObjectWriter<'_> {
    fn send(&mut self, chunk: Vec<u8>, total: Option<u64>) -> io::Result<UploadStatus> {
        let uploader = self
            .uploader
            .as_ref()
            .ok_or_else(|| io::Error::other("upload session already closed"))?;

        let len = chunk.len() as u64;
        let size = ChunkSize::new(self.uploaded, self.uploaded + len - 1, total);
        let status = self
            .store
            .runtime
            .block_on(uploader.upload_multiple_chunk(chunk, &size))
            .map_err(|e| io::Error::other(map_error(&self.name, e)))?;

        self.uploaded += len;
        Ok(status)
    }
}

impl Write for GcsObjectWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        let chunk_size = self.store.chunk_size;
        while self.buffer.len() > chunk_size {
            let rest = self.buffer.split_off(chunk_size);
            let chunk = std::mem::replace(&mut self.buffer, rest);
            let status = self.send(chunk, None)?;
            confirm_persisted(&status, self.uploaded - 1)?;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Partial chunks cannot be sent before the final one
        Ok(())
    }
}

/// An intermediate chunk must leave the session persisted through `last_byte`;
/// anything shorter would shift the offsets of every following chunk.
fn confirm_persisted(status: &UploadStatus, last_byte: u64) -> io::Result<()> {
    match status {
        UploadStatus::ResumeIncomplete(UploadedRange {
            last_byte: persisted,
            ..
        }) if *persisted >= last_byte => Ok(()),
        UploadStatus::ResumeIncomplete(range) => Err(io::Error::other(format!(
            "GCS persisted bytes {}..={} but {last_byte} were sent",
            range.first_byte, range.last_byte
        ))),
        UploadStatus::NotStarted => Err(io::Error::other(format!(
            "GCS persisted nothing after byte {last_byte} was sent"
        ))),
        UploadStatus::Ok(_) => Err(io::Error::other(
            "GCS finalized the object before the last chunk",
        )),
    }
}

impl ObjectSink for GcsObjectWriter<'_> {
    fn close(mut self: Box<Self>) -> StoreResult<ObjectDescriptor> {
        let total = self.uploaded + self.buffer.len() as u64;

        let object = if self.buffer.is_empty() {
            let uploader = self
                .uploader
                .as_ref()
                .ok_or_else(|| StoreError::Backend("upload session already closed".to_string()))?;
            self.store
                .runtime
                .block_on(uploader.upload_single_chunk(Vec::<u8>::new(), 0))
                .map_err(|e| map_error(&self.name, e))?;
            None
        } else {
            let chunk = std::mem::take(&mut self.buffer);
            match self.send(chunk, Some(total))? {
                UploadStatus::Ok(object) => Some(object),
                _ => {
                    return Err(StoreError::Backend(format!(
                        "GCS did not finalize `{}` after {} bytes",
                        self.name, total
                    )))
                }
            }
        };

        // Committed: nothing left for Drop to cancel
        self.uploader = None;
        debug!(object = %self.name, bytes = total, "finished resumable upload");

        Ok(object.map(descriptor).unwrap_or_else(|| ObjectDescriptor {
            name: self.name.clone(),
            size: total,
            content_type: self.options.content_type.clone(),
            metadata: self.options.metadata.clone(),
        }))
    }
}

impl Drop for GcsObjectWriter<'_> {
    fn drop(&mut self) {
        if let Some(uploader) = self.uploader.take() {
            warn!(object = %self.name, uploaded = self.uploaded, "cancelling unfinished GCS upload");
            if let Err(e) = self.store.runtime.block_on(uploader.cancel()) {
                warn!(object = %self.name, error = %e, "failed to cancel GCS upload");
            }
        }
    }
}
