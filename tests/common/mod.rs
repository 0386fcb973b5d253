//! Shared fixtures for the pipeline tests.

#![allow(dead_code)]

use bucket_zip::{
    ListPage, MemoryStore, ObjectDescriptor, ObjectSink, ObjectStore, StoreError, StoreResult,
    WriteOptions,
};
use std::cell::{Cell, RefCell};
use std::io::{self, Read, Write};

/// Where a [`FaultyStore`] should fail
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub list: bool,
    pub open_write: bool,
    /// Fail `open_read` for this object
    pub open_read: Option<String>,
    /// Reading this object fails after the first few bytes
    pub read_midway: Option<String>,
    /// The destination stream rejects writes after this many bytes
    pub write_limit: Option<usize>,
    pub commit: bool,
}

/// Wraps a [`MemoryStore`], records every call and injects failures
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub faults: Faults,
    pub calls: RefCell<Vec<String>>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore, faults: Faults) -> Self {
        Self {
            inner,
            faults,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl ObjectStore for FaultyStore {
    fn list(&self, prefix: &str, delimiter: &str) -> StoreResult<ListPage> {
        self.record(format!("list {prefix}"));
        if self.faults.list {
            return Err(StoreError::Backend("listing refused".to_string()));
        }
        self.inner.list(prefix, delimiter)
    }

    fn open_read(&self, name: &str) -> StoreResult<Box<dyn Read + '_>> {
        self.record(format!("read {name}"));
        if self.faults.open_read.as_deref() == Some(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let reader = self.inner.open_read(name)?;
        if self.faults.read_midway.as_deref() == Some(name) {
            return Ok(Box::new(reader.take(2).chain(BrokenRead)));
        }
        Ok(reader)
    }

    fn open_write(
        &self,
        name: &str,
        options: &WriteOptions,
    ) -> StoreResult<Box<dyn ObjectSink + '_>> {
        self.record(format!("write {name}"));
        if self.faults.open_write {
            return Err(StoreError::Backend("write refused".to_string()));
        }
        Ok(Box::new(FaultySink {
            inner: self.inner.open_write(name, options)?,
            written: 0,
            limit: self.faults.write_limit,
            fail_commit: self.faults.commit,
            closed: &self.calls,
        }))
    }
}

struct BrokenRead;

impl Read for BrokenRead {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"))
    }
}

struct FaultySink<'a> {
    inner: Box<dyn ObjectSink + 'a>,
    written: usize,
    limit: Option<usize>,
    fail_commit: bool,
    closed: &'a RefCell<Vec<String>>,
}

impl Write for FaultySink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.limit.is_some_and(|limit| self.written + buf.len() > limit) {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "quota exceeded"));
        }
        self.written += buf.len();
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ObjectSink for FaultySink<'_> {
    fn close(self: Box<Self>) -> StoreResult<ObjectDescriptor> {
        self.closed.borrow_mut().push("close".to_string());
        if self.fail_commit {
            return Err(StoreError::Backend("commit refused".to_string()));
        }
        self.inner.close()
    }
}

/// Forwards to a [`MemoryStore`], counting how many write streams were opened
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub writes_opened: Cell<usize>,
}

impl ObjectStore for CountingStore {
    fn list(&self, prefix: &str, delimiter: &str) -> StoreResult<ListPage> {
        self.inner.list(prefix, delimiter)
    }

    fn open_read(&self, name: &str) -> StoreResult<Box<dyn Read + '_>> {
        self.inner.open_read(name)
    }

    fn open_write(
        &self,
        name: &str,
        options: &WriteOptions,
    ) -> StoreResult<Box<dyn ObjectSink + '_>> {
        self.writes_opened.set(self.writes_opened.get() + 1);
        self.inner.open_write(name, options)
    }
}

/// Store seeded with `prefix/name = content` for each pair
pub fn seeded(prefix: &str, files: &[(&str, &str)]) -> MemoryStore {
    let store = MemoryStore::new();
    for (name, content) in files {
        store.insert(format!("{prefix}/{name}"), *content);
    }
    store
}

/// Route pipeline logs through the test harness; `RUST_LOG=bucket_zip=debug` shows them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
