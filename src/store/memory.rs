//! In-process object store.
//!
//! Keeps objects in a sorted map behind a shared lock, so clones of a
//! `MemoryStore` see the same bucket. Useful for tests, for dry runs, and for
//! packing data that is already in memory.

use super::{ListPage, ObjectDescriptor, ObjectSink, ObjectStore, WriteOptions};
use crate::error::{StoreError, StoreResult};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Stored bytes plus the header fields they were written with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl StoredObject {
    fn descriptor(&self, name: &str) -> ObjectDescriptor {
        ObjectDescriptor {
            name: name.to_string(),
            size: self.data.len() as u64,
            content_type: self.content_type.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Shared in-memory bucket
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
    page_size: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return at most `page_size` objects per listing and flag the rest as truncated
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Store an object with no content type or metadata
    pub fn insert(&self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.write_lock().insert(
            name.into(),
            StoredObject {
                data: data.into(),
                ..Default::default()
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<StoredObject> {
        self.read_lock().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<StoredObject> {
        self.write_lock().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read_lock().contains_key(name)
    }

    /// All object names in lexical order
    pub fn names(&self) -> Vec<String> {
        self.read_lock().keys().cloned().collect()
    }

    // A panic while holding the lock cannot leave the map half-updated:
    // every mutation is a single insert or remove.
    fn read_lock(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl ObjectStore for MemoryStore {
    fn list(&self, prefix: &str, delimiter: &str) -> StoreResult<ListPage> {
        let objects = self.read_lock();
        let mut matching = objects
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .filter(|(name, _)| delimiter.is_empty() || !name[prefix.len()..].contains(delimiter))
            .map(|(name, object)| object.descriptor(name));

        let mut page = ListPage::default();
        match self.page_size {
            Some(limit) => {
                page.objects = matching.by_ref().take(limit).collect();
                page.truncated = matching.next().is_some();
            }
            None => page.objects = matching.collect(),
        }
        Ok(page)
    }

    fn open_read(&self, name: &str) -> StoreResult<Box<dyn Read + '_>> {
        let object = self
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        Ok(Box::new(Cursor::new(object.data)))
    }

    fn open_write(
        &self,
        name: &str,
        options: &WriteOptions,
    ) -> StoreResult<Box<dyn ObjectSink + '_>> {
        Ok(Box::new(MemoryObjectWriter {
            store: self,
            name: name.to_string(),
            object: StoredObject {
                data: Vec::new(),
                content_type: options.content_type.clone(),
                metadata: options.metadata.clone(),
            },
        }))
    }
}

/// Buffers the object and publishes it on `close`
struct MemoryObjectWriter<'a> {
    store: &'a MemoryStore,
    name: String,
    object: StoredObject,
}

impl Write for MemoryObjectWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.object.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ObjectSink for MemoryObjectWriter<'_> {
    fn close(self: Box<Self>) -> StoreResult<ObjectDescriptor> {
        let this = *self;
        let descriptor = this.object.descriptor(&this.name);
        this.store.write_lock().insert(this.name, this.object);
        Ok(descriptor)
    }
}
