//! Object store collaborator interface.
//!
//! The packing pipeline only needs three operations from a store: a one-level
//! prefix listing, a sequential read stream per object, and a sequential write
//! stream for the destination. Backends implement [`ObjectStore`]; the write
//! stream they hand out implements [`ObjectSink`].
//!
//! ## Release rules
//!
//! - Readers are plain `io::Read` values: dropping one releases it.
//! - A sink is committed by [`ObjectSink::close`], which consumes it. A sink
//!   that is dropped without `close` must not commit the object; backends
//!   abort the upload (or simply discard the buffered bytes).

pub mod memory;

pub use memory::MemoryStore;

use crate::error::StoreResult;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

/// Path separator used for folder emulation
pub const DELIMITER: &str = "/";

/// Metadata record for a stored object
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectDescriptor {
    /// Full object name, including the folder prefix
    pub name: String,
    /// Size in bytes
    pub size: u64,
    pub content_type: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl ObjectDescriptor {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            ..Default::default()
        }
    }
}

/// One page of a prefix listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Objects in the order the store returned them
    pub objects: Vec<ObjectDescriptor>,
    /// The store reported more results beyond this page
    pub truncated: bool,
}

/// Header fields applied to a destination object before its first byte is written.
///
/// # Example
///
/// ```
/// use bucket_zip::WriteOptions;
///
/// let options = WriteOptions::new()
///     .content_type("application/zip")
///     .metadata_entry("origin", "nightly-export");
/// assert_eq!(options.content_type.as_deref(), Some("application/zip"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub content_type: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content type. An empty string leaves the store's default in place.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        self.content_type = (!content_type.is_empty()).then_some(content_type);
        self
    }

    /// Replace the whole metadata mapping
    pub fn metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Add one metadata key/value pair
    pub fn metadata_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Sequential write stream for one object
pub trait ObjectSink: Write {
    /// Flush remaining bytes and commit the object, returning its descriptor.
    fn close(self: Box<Self>) -> StoreResult<ObjectDescriptor>;
}

/// Bucket-scoped object store
///
/// All methods take `&self`: one handle can serve any number of sequential
/// pack invocations.
pub trait ObjectStore {
    /// List objects whose name starts with `prefix`, truncated at the next
    /// `delimiter` after it. Only objects are returned, never the common
    /// prefixes, and only the first page the store hands back.
    fn list(&self, prefix: &str, delimiter: &str) -> StoreResult<ListPage>;

    /// Open a sequential read stream for an object
    fn open_read(&self, name: &str) -> StoreResult<Box<dyn Read + '_>>;

    /// Open a sequential write stream, applying `options` to the new object
    fn open_write(
        &self,
        name: &str,
        options: &WriteOptions,
    ) -> StoreResult<Box<dyn ObjectSink + '_>>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn list(&self, prefix: &str, delimiter: &str) -> StoreResult<ListPage> {
        (**self).list(prefix, delimiter)
    }

    fn open_read(&self, name: &str) -> StoreResult<Box<dyn Read + '_>> {
        (**self).open_read(name)
    }

    fn open_write(
        &self,
        name: &str,
        options: &WriteOptions,
    ) -> StoreResult<Box<dyn ObjectSink + '_>> {
        (**self).open_write(name, options)
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    fn list(&self, prefix: &str, delimiter: &str) -> StoreResult<ListPage> {
        (**self).list(prefix, delimiter)
    }

    fn open_read(&self, name: &str) -> StoreResult<Box<dyn Read + '_>> {
        (**self).open_read(name)
    }

    fn open_write(
        &self,
        name: &str,
        options: &WriteOptions,
    ) -> StoreResult<Box<dyn ObjectSink + '_>> {
        (**self).open_write(name, options)
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn list(&self, prefix: &str, delimiter: &str) -> StoreResult<ListPage> {
        (**self).list(prefix, delimiter)
    }

    fn open_read(&self, name: &str) -> StoreResult<Box<dyn Read + '_>> {
        (**self).open_read(name)
    }

    fn open_write(
        &self,
        name: &str,
        options: &WriteOptions,
    ) -> StoreResult<Box<dyn ObjectSink + '_>> {
        (**self).open_write(name, options)
    }
}
