//! AWS S3 (and S3-compatible) backend.
//!
//! - Listing uses `ListObjectsV2` with prefix and delimiter, first page only
//! - Reads stream the `GetObject` body chunk by chunk
//! - Writes use multipart upload (minimum 5MB per part, except the last part);
//!   objects smaller than one part are sent with a single `PutObject`
//! - Content type and metadata are set when the upload is created
//!
//! The S3 store supports MinIO, Cloudflare R2, DigitalOcean Spaces, Backblaze B2
//! and other S3-compatible services via a custom endpoint URL.

use super::{blocking_runtime, ChunkReader, ChunkSource};
use crate::error::{StoreError, StoreResult};
use crate::store::{ListPage, ObjectDescriptor, ObjectSink, ObjectStore, WriteOptions};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::io::{self, Read, Write};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// Default part size for S3 multipart upload (5MB - S3 minimum)
pub const DEFAULT_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum part size (5GB - S3 maximum)
pub const MAX_PART_SIZE: usize = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts (S3 limit)
pub const MAX_PARTS: usize = 10_000;

/// Blocking S3 store bound to one bucket
pub struct S3Store {
    client: Client,
    bucket: String,
    part_size: usize,
    runtime: Runtime,
}

/// Builder for [`S3Store`] with configuration options.
#[derive(Debug, Default)]
pub struct S3StoreBuilder {
    client: Option<Client>,
    bucket: String,
    endpoint_url: Option<String>,
    region: Option<String>,
    part_size: Option<usize>,
}

impl S3Store {
    /// Create a builder for configuring the S3 store.
    ///
    /// Without an explicit client, credentials and region come from the
    /// standard AWS environment (env vars, profile, IMDS).
    pub fn builder() -> S3StoreBuilder {
        S3StoreBuilder::default()
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn sdk_error(&self, key: &str, action: &str, err: impl std::error::Error) -> StoreError {
        StoreError::Backend(format!(
            "S3 {action} for `{}/{key}` failed: {}",
            self.bucket,
            DisplayErrorContext(err)
        ))
    }
}

impl S3StoreBuilder {
    /// Use an already-configured client.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the S3 bucket name.
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Custom endpoint for S3-compatible services (enables path-style addressing).
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the part size for multipart upload.
    ///
    /// # Panics
    ///
    /// Panics if part_size < 5MB or > 5GB.
    pub fn part_size(mut self, part_size: usize) -> Self {
        assert!(
            part_size >= DEFAULT_PART_SIZE,
            "Part size must be at least 5MB"
        );
        assert!(part_size <= MAX_PART_SIZE, "Part size must not exceed 5GB");
        self.part_size = Some(part_size);
        self
    }

    /// Load configuration and build the store.
    pub fn build(self) -> StoreResult<S3Store> {
        if self.bucket.is_empty() {
            return Err(StoreError::Config("S3 bucket must be set".to_string()));
        }

        let runtime = blocking_runtime()?;
        let client = match self.client {
            Some(client) => client,
            None => runtime.block_on(load_client(self.endpoint_url, self.region)),
        };

        Ok(S3Store {
            client,
            bucket: self.bucket,
            part_size: self.part_size.unwrap_or(DEFAULT_PART_SIZE),
            runtime,
        })
    }
}

async fn load_client(endpoint_url: Option<String>, region: Option<String>) -> Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }
    let sdk_config = loader.load().await;

    let mut config = aws_sdk_s3::config::Builder::from(&sdk_config);
    if let Some(url) = endpoint_url {
        config = config.endpoint_url(url).force_path_style(true);
    }
    Client::from_conf(config.build())
}

impl ObjectStore for S3Store {
    fn list(&self, prefix: &str, delimiter: &str) -> StoreResult<ListPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix);
        if !delimiter.is_empty() {
            request = request.delimiter(delimiter);
        }

        let output = self
            .runtime
            .block_on(request.send())
            .map_err(|e| self.sdk_error(prefix, "ListObjectsV2", e))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                Some(ObjectDescriptor::new(
                    key,
                    object.size().unwrap_or(0).max(0) as u64,
                ))
            })
            .collect();

        Ok(ListPage {
            objects,
            truncated: output.is_truncated().unwrap_or(false),
        })
    }

    fn open_read(&self, name: &str) -> StoreResult<Box<dyn Read + '_>> {
        let output = self
            .runtime
            .block_on(
                self.client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(name)
                    .send(),
            )
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StoreError::NotFound(name.to_string())
                } else {
                    self.sdk_error(name, "GetObject", e)
                }
            })?;

        Ok(Box::new(ChunkReader::new(BodyChunks {
            runtime: &self.runtime,
            body: output.body,
        })))
    }

    fn open_write(
        &self,
        name: &str,
        options: &WriteOptions,
    ) -> StoreResult<Box<dyn ObjectSink + '_>> {
        Ok(Box::new(S3ObjectWriter {
            store: self,
            key: name.to_string(),
            options: options.clone(),
            upload_id: None,
            parts: Vec::new(),
            buffer: Vec::with_capacity(self.part_size),
            uploaded: 0,
        }))
    }
}

struct BodyChunks<'a> {
    runtime: &'a Runtime,
    body: ByteStream,
}

impl ChunkSource for BodyChunks<'_> {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        match self.runtime.block_on(self.body.next()) {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(io::Error::other(e)),
            None => Ok(None),
        }
    }
}

/// Multipart upload sink.
///
/// The upload is created lazily with the first full part. Dropping the writer
/// before `close` aborts the upload so no orphaned parts are left behind.
pub struct S3ObjectWriter<'a> {
    store: &'a S3Store,
    key: String,
    options: WriteOptions,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
    buffer: Vec<u8>,
    uploaded: u64,
}

impl S3ObjectWriter<'_> {
    fn upload_id(&mut self) -> StoreResult<String> {
        if let Some(id) = &self.upload_id {
            return Ok(id.clone());
        }

        let store = self.store;
        let response = store
            .runtime
            .block_on(
                store
                    .client
                    .create_multipart_upload()
                    .bucket(&store.bucket)
                    .key(&self.key)
                    .set_content_type(self.options.content_type.clone())
                    .set_metadata(self.options.metadata.clone())
                    .send(),
            )
            .map_err(|e| store.sdk_error(&self.key, "CreateMultipartUpload", e))?;

        let id = response
            .upload_id()
            .ok_or_else(|| StoreError::Backend("No upload_id returned from S3".to_string()))?
            .to_string();
        debug!(bucket = %store.bucket, key = %self.key, "started multipart upload");
        self.upload_id = Some(id.clone());
        Ok(id)
    }

    fn upload_part(&mut self, data: Vec<u8>) -> StoreResult<()> {
        if self.parts.len() >= MAX_PARTS {
            return Err(StoreError::Backend(format!(
                "`{}` needs more than {MAX_PARTS} parts; raise the part size",
                self.key
            )));
        }

        let upload_id = self.upload_id()?;
        let part_number = (self.parts.len() + 1) as i32;
        let len = data.len() as u64;
        let store = self.store;

        let response = store
            .runtime
            .block_on(
                store
                    .client
                    .upload_part()
                    .bucket(&store.bucket)
                    .key(&self.key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(data))
                    .send(),
            )
            .map_err(|e| store.sdk_error(&self.key, "UploadPart", e))?;

        let etag = response.e_tag().ok_or_else(|| {
            StoreError::Backend(format!("No ETag returned for part {part_number}"))
        })?;

        self.parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .e_tag(etag)
                .build(),
        );
        self.uploaded += len;
        Ok(())
    }

    fn put_whole_object(&mut self) -> StoreResult<()> {
        let data = std::mem::take(&mut self.buffer);
        let len = data.len() as u64;
        let store = self.store;

        store
            .runtime
            .block_on(
                store
                    .client
                    .put_object()
                    .bucket(&store.bucket)
                    .key(&self.key)
                    .set_content_type(self.options.content_type.clone())
                    .set_metadata(self.options.metadata.clone())
                    .body(ByteStream::from(data))
                    .send(),
            )
            .map_err(|e| store.sdk_error(&self.key, "PutObject", e))?;

        self.uploaded = len;
        Ok(())
    }

    fn complete(&mut self) -> StoreResult<()> {
        if !self.buffer.is_empty() {
            let data = std::mem::take(&mut self.buffer);
            self.upload_part(data)?;
        }

        let upload_id = self.upload_id()?;
        let store = self.store;
        store
            .runtime
            .block_on(
                store
                    .client
                    .complete_multipart_upload()
                    .bucket(&store.bucket)
                    .key(&self.key)
                    .upload_id(upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(std::mem::take(&mut self.parts)))
                            .build(),
                    )
                    .send(),
            )
            .map_err(|e| store.sdk_error(&self.key, "CompleteMultipartUpload", e))?;

        // Committed: nothing left for Drop to abort
        self.upload_id = None;
        Ok(())
    }
}

impl Write for S3ObjectWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        if self.buffer.len() >= self.store.part_size {
            let data = std::mem::take(&mut self.buffer);
            self.upload_part(data).map_err(io::Error::other)?;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Parts below the 5MB minimum are only allowed last
        Ok(())
    }
}

impl ObjectSink for S3ObjectWriter<'_> {
    fn close(mut self: Box<Self>) -> StoreResult<ObjectDescriptor> {
        if self.upload_id.is_none() && self.parts.is_empty() {
            self.put_whole_object()?;
        } else {
            self.complete()?;
        }

        debug!(key = %self.key, bytes = self.uploaded, "finished upload");
        Ok(ObjectDescriptor {
            name: self.key.clone(),
            size: self.uploaded,
            content_type: self.options.content_type.clone(),
            metadata: self.options.metadata.clone(),
        })
    }
}

impl Drop for S3ObjectWriter<'_> {
    fn drop(&mut self) {
        let Some(upload_id) = self.upload_id.take() else {
            return;
        };

        warn!(key = %self.key, uploaded = self.uploaded, "aborting unfinished multipart upload");
        let store = self.store;
        let result = store.runtime.block_on(
            store
                .client
                .abort_multipart_upload()
                .bucket(&store.bucket)
                .key(&self.key)
                .upload_id(upload_id)
                .send(),
        );
        if let Err(e) = result {
            warn!(key = %self.key, error = %DisplayErrorContext(&e), "failed to abort multipart upload");
        }
    }
}
