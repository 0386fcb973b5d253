//! # bucket-zip: Stream a Bucket Folder into a ZIP Archive
//!
//! `bucket-zip` lists the objects directly under a folder of an object store,
//! streams each one into its own ZIP entry, and writes the archive back to the
//! same store. The archive is never held in memory: entries are compressed
//! on-the-fly and handed to the store's upload stream as they are produced.
//!
//! ## Features
//!
//! - **Streaming Write**: ZIP encoder over any `io::Write`, no seeking, no temp files
//! - **Fail Fast**: every failing step is reported as its own [`PackError`] variant
//! - **Pluggable Stores**: [`ObjectStore`] trait with in-memory, GCS and S3 backends
//! - **Low Memory**: bounded by the per-entry compression buffer and upload chunk size
//!
//! ## Quick Start
//!
//! ### Packing a folder
//!
//! ```
//! use bucket_zip::{FolderZipper, MemoryStore, WriteOptions};
//!
//! let store = MemoryStore::new();
//! store.insert("invoices/2024/Jan.pdf", b"%PDF-jan".to_vec());
//! store.insert("invoices/2024/Feb.pdf", b"%PDF-feb".to_vec());
//!
//! let zipper = FolderZipper::new(store.clone());
//! let options = WriteOptions::new().content_type("application/zip");
//! let summary = zipper.pack("invoices/2024", "invoices-2024.zip", &options)?;
//!
//! assert_eq!(summary.entries, ["feb.pdf", "jan.pdf"]);
//! assert!(store.contains("invoices-2024.zip"));
//! # Ok::<(), bucket_zip::PackError>(())
//! ```
//!
//! ### Reading the archive back
//!
//! ```
//! # use bucket_zip::{FolderZipper, MemoryStore, WriteOptions};
//! use bucket_zip::StreamingZipReader;
//! use std::io::Cursor;
//!
//! # let store = MemoryStore::new();
//! # store.insert("docs/a.txt", "hello");
//! # FolderZipper::new(&store).pack("docs", "docs.zip", &WriteOptions::new()).unwrap();
//! let bytes = store.get("docs.zip").unwrap().data;
//! let mut reader = StreamingZipReader::new(Cursor::new(bytes))?;
//! assert_eq!(reader.read_entry_by_name("a.txt")?, b"hello");
//! # Ok::<(), bucket_zip::ZipError>(())
//! ```
//!
//! ### Using the encoder directly
//!
//! ```
//! use bucket_zip::StreamingZipWriter;
//! use std::io::Write;
//!
//! let mut writer = StreamingZipWriter::from_writer(Vec::new());
//! writer.create_entry("data.txt")?.write_all(b"In-memory ZIP content")?;
//!
//! // finish() returns the writer, allowing you to extract the data
//! let zip_bytes = writer.finish()?;
//! println!("Created ZIP with {} bytes", zip_bytes.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Cloud Stores
//!
//! Enable `cloud-gcs` for [`cloud::gcs::GcsStore`] or `cloud-s3` for
//! [`cloud::s3::S3Store`]. Both expose the same blocking [`ObjectStore`]
//! interface and must not be used from inside an async runtime.

pub mod error;
pub mod reader;
pub mod store;
pub mod writer;
pub mod zipper;

#[cfg(feature = "cloud")]
pub mod cloud;

pub use error::{PackError, Result, StoreError, StoreResult, ZipError};
pub use reader::{StreamingZipReader, ZipEntry};
pub use store::{
    ListPage, MemoryStore, ObjectDescriptor, ObjectSink, ObjectStore, WriteOptions,
};
pub use writer::{CompressionMethod, EntryWriter, StreamingZipWriter};
pub use zipper::{FolderZipper, PackSummary};
