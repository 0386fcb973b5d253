//! Cloud object store backends for S3 and Google Cloud Storage.
//!
//! The SDKs are async; the packing pipeline is blocking. Each store owns a
//! current-thread Tokio runtime and drives every SDK call with `block_on`, so
//! none of these types may be used from inside another async runtime.
//!
//! ## Available Stores
//!
//! - **GCS** - list, streamed download, resumable upload (requires `cloud-gcs` feature)
//! - **S3** - list, streamed download, multipart upload (requires `cloud-s3` feature)
//!
//! ## Example Usage
//!
//! ### Google Cloud Storage
//!
//! ```no_run
//! # #[cfg(feature = "cloud-gcs")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use bucket_zip::cloud::gcs::{GcsCredentials, GcsStore};
//! use bucket_zip::{FolderZipper, WriteOptions};
//!
//! let store = GcsStore::builder()
//!     .bucket("my-bucket")
//!     .credentials(GcsCredentials::KeyFile("service-account.json".into()))
//!     .build()?;
//!
//! FolderZipper::new(store).pack("exports/today", "exports/today.zip", &WriteOptions::new())?;
//! # Ok(())
//! # }
//! ```
//!
//! ### MinIO / S3-Compatible
//!
//! ```no_run
//! # #[cfg(feature = "cloud-s3")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use bucket_zip::cloud::s3::S3Store;
//! use bucket_zip::{FolderZipper, WriteOptions};
//!
//! let store = S3Store::builder()
//!     .endpoint_url("http://localhost:9000")
//!     .region("us-east-1")
//!     .bucket("my-bucket")
//!     .build()?;
//!
//! FolderZipper::new(store).pack("exports/today", "exports/today.zip", &WriteOptions::new())?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "cloud-s3")]
pub mod s3;

#[cfg(feature = "cloud-gcs")]
pub mod gcs;

use crate::error::{StoreError, StoreResult};
use bytes::{Buf, Bytes};
use std::io::{self, Read};
use tokio::runtime::{Builder, Runtime};

/// Build the runtime a cloud store uses to drive its SDK
pub(crate) fn blocking_runtime() -> StoreResult<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| StoreError::Config(format!("failed to start I/O runtime: {e}")))
}

/// Source of body chunks for [`ChunkReader`]
pub(crate) trait ChunkSource {
    /// Next non-empty chunk, or `None` at end of object
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>>;
}

/// Adapts a chunked download stream into a blocking `io::Read`
pub(crate) struct ChunkReader<S> {
    source: S,
    pending: Bytes,
    done: bool,
}

impl<S: ChunkSource> ChunkReader<S> {
    pub(crate) fn new(source: S) -> Self {
        Self {
            source,
            pending: Bytes::new(),
            done: false,
        }
    }
}

impl<S: ChunkSource> Read for ChunkReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pending.is_empty() {
            if self.done {
                return Ok(0);
            }
            match self.source.next_chunk()? {
                Some(chunk) => self.pending = chunk,
                None => self.done = true,
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}
