//! Folder packing pipeline: list a folder, stream every object into one ZIP
//! entry, and commit the archive to the same store.
//!
//! ```text
//! list(prefix) ──► open_write(destination) ──► for each object:
//!                                                open_read ─► create_entry ─► io::copy
//!                                             finish (central directory) ─► close (commit)
//! ```
//!
//! Nothing is buffered beyond the encoder's per-entry compression buffer and
//! whatever the store's sink keeps for its own upload chunks.

use crate::error::PackError;
use crate::store::{ObjectDescriptor, ObjectStore, WriteOptions, DELIMITER};
use crate::writer::StreamingZipWriter;
use std::collections::HashSet;
use std::io;
use tracing::{debug, info, warn};

/// Outcome of a successful [`FolderZipper::pack`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSummary {
    /// The committed destination object as reported by the store
    pub archive: ObjectDescriptor,
    /// Entry names in archive order
    pub entries: Vec<String>,
    /// Total uncompressed bytes copied from the source objects
    pub uncompressed_bytes: u64,
}

/// Packs store folders into ZIP archives.
///
/// Holds an already-authenticated store handle and nothing else, so one
/// `FolderZipper` can be reused for any number of calls.
///
/// # Example
///
/// ```
/// use bucket_zip::{FolderZipper, MemoryStore, WriteOptions};
///
/// let store = MemoryStore::new();
/// store.insert("reports/Q1.csv", "a,b\n1,2\n");
/// store.insert("reports/Q2.csv", "a,b\n3,4\n");
///
/// let zipper = FolderZipper::new(&store);
/// let summary = zipper.pack("reports", "reports.zip", &WriteOptions::new())?;
/// assert_eq!(summary.entries, ["q1.csv", "q2.csv"]);
/// # Ok::<(), bucket_zip::PackError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FolderZipper<S> {
    store: S,
}

impl<S: ObjectStore> FolderZipper<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// List the objects directly under `folder`, in store order.
    ///
    /// Only the first page returned by the store is used. Directory
    /// placeholder objects (names ending in `/`) are skipped.
    pub fn list_folder(&self, folder: &str) -> Result<Vec<ObjectDescriptor>, PackError> {
        let prefix = normalize_prefix(folder);
        let page = self
            .store
            .list(&prefix, DELIMITER)
            .map_err(|source| PackError::Listing {
                prefix: prefix.clone(),
                source,
            })?;

        if page.truncated {
            warn!(
                prefix = %prefix,
                returned = page.objects.len(),
                "listing has more pages; only the first page is archived"
            );
        }

        let objects: Vec<_> = page
            .objects
            .into_iter()
            .filter(|object| !object.name.ends_with(DELIMITER))
            .collect();

        if objects.is_empty() {
            return Err(PackError::EmptyFolder { prefix });
        }

        debug!(prefix = %prefix, count = objects.len(), "listed folder");
        Ok(objects)
    }

    /// Stream every object directly under `source_folder` into a ZIP archive
    /// stored as `destination`.
    ///
    /// Entries are named after the lower-cased file name of each object and
    /// appear in listing order. Any failure aborts the whole call; the
    /// destination is committed only when every step succeeded. Calling again
    /// with the same arguments overwrites the destination.
    ///
    /// Directory placeholder objects (names ending in `/`) are not archived
    /// and do not count as folder contents: the entry count can be lower than
    /// the raw listing, and a folder holding only its placeholder fails with
    /// [`PackError::EmptyFolder`] instead of producing an entry with an empty
    /// name.
    pub fn pack(
        &self,
        source_folder: &str,
        destination: &str,
        options: &WriteOptions,
    ) -> Result<PackSummary, PackError> {
        let objects = self.list_folder(source_folder)?;

        let sink = self
            .store
            .open_write(destination, options)
            .map_err(|source| PackError::WriteOpen {
                name: destination.to_string(),
                source,
            })?;

        // The sink is owned by the encoder from here on. Every early return
        // below drops it uncommitted; only `close` at the end commits it.
        let mut zip = StreamingZipWriter::from_writer(sink);
        let mut entries = Vec::with_capacity(objects.len());
        let mut seen = HashSet::with_capacity(objects.len());
        let mut uncompressed_bytes = 0;

        for object in &objects {
            let mut reader =
                self.store
                    .open_read(&object.name)
                    .map_err(|source| PackError::ReadOpen {
                        name: object.name.clone(),
                        source,
                    })?;

            let entry = entry_name(&object.name);
            if !seen.insert(entry.clone()) {
                warn!(object = %object.name, entry = %entry, "duplicate entry name in archive");
            }

            let mut entry_writer = zip
                .create_entry_with_hint(&entry, Some(object.size))
                .map_err(|source| PackError::EntryCreate {
                    name: object.name.clone(),
                    entry: entry.clone(),
                    source,
                })?;

            let copied =
                io::copy(&mut reader, &mut entry_writer).map_err(|source| PackError::Copy {
                    name: object.name.clone(),
                    source,
                })?;

            debug!(object = %object.name, entry = %entry, bytes = copied, "added entry");
            uncompressed_bytes += copied;
            entries.push(entry);
        }

        let sink = zip.finish().map_err(|source| PackError::ArchiveClose {
            name: destination.to_string(),
            source,
        })?;

        let archive = sink.close().map_err(|source| PackError::Commit {
            name: destination.to_string(),
            source,
        })?;

        info!(
            destination = %archive.name,
            entries = entries.len(),
            uncompressed_bytes,
            archive_bytes = archive.size,
            "packed folder"
        );

        Ok(PackSummary {
            archive,
            entries,
            uncompressed_bytes,
        })
    }
}

/// Normalize a folder reference to a listing prefix ending in exactly one `/`.
///
/// An empty folder becomes `"/"`, never the bucket root.
///
/// ```
/// use bucket_zip::zipper::normalize_prefix;
///
/// assert_eq!(normalize_prefix("exports/2024"), "exports/2024/");
/// assert_eq!(normalize_prefix("exports/2024//"), "exports/2024/");
/// assert_eq!(normalize_prefix(""), "/");
/// ```
pub fn normalize_prefix(folder: &str) -> String {
    format!("{}{DELIMITER}", folder.trim_end_matches(DELIMITER))
}

/// Archive entry name for an object: its last path component, lower-cased.
///
/// Directory structure is discarded, so two objects with the same file name in
/// different folders produce the same entry name.
///
/// ```
/// use bucket_zip::zipper::entry_name;
///
/// assert_eq!(entry_name("folder/Sub/MyFile.TXT"), "myfile.txt");
/// ```
pub fn entry_name(object_name: &str) -> String {
    object_name
        .rsplit(DELIMITER)
        .next()
        .unwrap_or(object_name)
        .to_lowercase()
}
