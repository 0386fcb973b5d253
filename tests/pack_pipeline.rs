mod common;

use bucket_zip::{
    FolderZipper, MemoryStore, PackError, StoreError, StreamingZipReader, WriteOptions, ZipError,
};
use common::{init_tracing, seeded, CountingStore, FaultyStore, Faults};
use std::io::Cursor;

fn open_archive(store: &MemoryStore, name: &str) -> StreamingZipReader<Cursor<Vec<u8>>> {
    let bytes = store.get(name).expect("archive committed").data;
    StreamingZipReader::new(Cursor::new(bytes)).unwrap()
}

fn entry_names(reader: &StreamingZipReader<Cursor<Vec<u8>>>) -> Vec<String> {
    reader.entries().iter().map(|e| e.name.clone()).collect()
}

#[test]
fn packs_every_object_in_listing_order() {
    init_tracing();
    let store = seeded("folder", &[("f1.txt", "hello"), ("f2.txt", "world")]);

    let summary = FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new())
        .unwrap();

    assert_eq!(summary.entries, ["f1.txt", "f2.txt"]);
    assert_eq!(summary.uncompressed_bytes, 10);
    assert_eq!(summary.archive.name, "out.zip");

    let mut reader = open_archive(&store, "out.zip");
    assert_eq!(entry_names(&reader), ["f1.txt", "f2.txt"]);
    assert_eq!(reader.read_entry_by_name("f1.txt").unwrap(), b"hello");
    assert_eq!(reader.read_entry_by_name("f2.txt").unwrap(), b"world");
    assert_eq!(summary.archive.size, store.get("out.zip").unwrap().data.len() as u64);
}

#[test]
fn entry_count_matches_listing() {
    let files: Vec<(String, String)> = (0..25)
        .map(|i| (format!("part-{i:02}.log"), format!("line {i}\n").repeat(i + 1)))
        .collect();
    let refs: Vec<(&str, &str)> = files
        .iter()
        .map(|(n, c)| (n.as_str(), c.as_str()))
        .collect();
    let store = seeded("logs", &refs);

    let zipper = FolderZipper::new(&store);
    let listed = zipper.list_folder("logs").unwrap();
    zipper.pack("logs", "logs.zip", &WriteOptions::new()).unwrap();

    let mut reader = open_archive(&store, "logs.zip");
    assert_eq!(reader.entries().len(), listed.len());
    for (name, content) in &files {
        assert_eq!(reader.read_entry_by_name(name).unwrap(), content.as_bytes());
    }
}

#[test]
fn entry_names_are_lowercased_file_names() {
    let store = MemoryStore::new();
    store.insert("folder/MyFile.TXT", "x");
    store.insert("folder/Report 2024.PDF", "y");

    let summary = FolderZipper::new(&store)
        .pack("folder/", "out.zip", &WriteOptions::new())
        .unwrap();
    assert_eq!(summary.entries, ["myfile.txt", "report 2024.pdf"]);
}

#[test]
fn nested_objects_and_placeholders_are_not_packed() {
    let store = seeded("folder", &[("a.txt", "a"), ("sub/b.txt", "b"), ("sub/", "")]);
    store.insert("folder/", "");
    store.insert("folderish/c.txt", "c");

    let summary = FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new())
        .unwrap();
    assert_eq!(summary.entries, ["a.txt"]);
}

#[test]
fn empty_folder_never_opens_destination() {
    let store = CountingStore::default();
    store.inner.insert("elsewhere/a.txt", "a");

    let err = FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new())
        .unwrap_err();

    assert!(matches!(err, PackError::EmptyFolder { ref prefix } if prefix == "folder/"));
    assert_eq!(store.writes_opened.get(), 0);
    assert!(!store.inner.contains("out.zip"));
}

#[test]
fn listing_failure_is_reported() {
    let store = FaultyStore::new(
        seeded("folder", &[("a.txt", "a")]),
        Faults {
            list: true,
            ..Default::default()
        },
    );

    let err = FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new())
        .unwrap_err();
    assert!(matches!(err, PackError::Listing { .. }));
    assert_eq!(store.calls(), ["list folder/"]);
}

#[test]
fn write_open_failure_reads_nothing() {
    let store = FaultyStore::new(
        seeded("folder", &[("a.txt", "a")]),
        Faults {
            open_write: true,
            ..Default::default()
        },
    );

    let err = FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new())
        .unwrap_err();
    assert!(matches!(err, PackError::WriteOpen { ref name, .. } if name == "out.zip"));
    assert_eq!(store.calls(), ["list folder/", "write out.zip"]);
}

#[test]
fn read_open_failure_names_object_and_skips_commit() {
    let inner = seeded("folder", &[("a.txt", "a"), ("b.txt", "b"), ("c.txt", "c")]);
    let store = FaultyStore::new(
        inner.clone(),
        Faults {
            open_read: Some("folder/b.txt".to_string()),
            ..Default::default()
        },
    );

    let err = FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new())
        .unwrap_err();

    match &err {
        PackError::ReadOpen { name, source } => {
            assert_eq!(name, "folder/b.txt");
            assert!(matches!(source, StoreError::NotFound(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.object(), Some("folder/b.txt"));
    assert_eq!(
        store.calls(),
        [
            "list folder/",
            "write out.zip",
            "read folder/a.txt",
            "read folder/b.txt"
        ]
    );
    assert!(!inner.contains("out.zip"));
}

#[test]
fn copy_failure_aborts_archive() {
    let inner = seeded("folder", &[("a.txt", "abcdef"), ("b.txt", "b")]);
    let store = FaultyStore::new(
        inner.clone(),
        Faults {
            read_midway: Some("folder/a.txt".to_string()),
            ..Default::default()
        },
    );

    let err = FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new())
        .unwrap_err();

    assert!(matches!(err, PackError::Copy { ref name, ref source }
        if name == "folder/a.txt" && source.kind() == std::io::ErrorKind::ConnectionReset));
    assert!(!store.calls().contains(&"read folder/b.txt".to_string()));
    assert!(!inner.contains("out.zip"));
}

#[test]
fn destination_write_failure_surfaces_as_entry_create() {
    let inner = seeded("folder", &[("a.txt", "a")]);
    let store = FaultyStore::new(
        inner.clone(),
        Faults {
            write_limit: Some(10),
            ..Default::default()
        },
    );

    let err = FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new())
        .unwrap_err();

    match err {
        PackError::EntryCreate { name, entry, source } => {
            assert_eq!(name, "folder/a.txt");
            assert_eq!(entry, "a.txt");
            assert!(matches!(source, ZipError::Io(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!inner.contains("out.zip"));
}

#[test]
fn central_directory_failure_is_archive_close() {
    // Room for the local header, data and descriptor of one entry, not the central directory
    let inner = seeded("folder", &[("a.txt", "hello")]);
    let store = FaultyStore::new(
        inner.clone(),
        Faults {
            write_limit: Some(70),
            ..Default::default()
        },
    );

    let err = FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new())
        .unwrap_err();

    assert!(matches!(err, PackError::ArchiveClose { ref name, .. } if name == "out.zip"));
    assert!(!store.calls().contains(&"close".to_string()));
    assert!(!inner.contains("out.zip"));
}

#[test]
fn commit_failure_is_reported() {
    let inner = seeded("folder", &[("a.txt", "a")]);
    let store = FaultyStore::new(
        inner.clone(),
        Faults {
            commit: true,
            ..Default::default()
        },
    );

    let err = FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new())
        .unwrap_err();

    assert!(matches!(err, PackError::Commit { .. }));
    assert_eq!(store.calls().last().map(String::as_str), Some("close"));
    assert!(!inner.contains("out.zip"));
}

#[test]
fn repeated_pack_overwrites_with_identical_bytes() {
    let store = seeded("folder", &[("f1.txt", "hello"), ("f2.txt", "world")]);
    let zipper = FolderZipper::new(&store);

    zipper.pack("folder", "out.zip", &WriteOptions::new()).unwrap();
    let first = store.get("out.zip").unwrap().data;

    store.insert("out.zip", "stale");
    zipper.pack("folder", "out.zip", &WriteOptions::new()).unwrap();
    let second = store.get("out.zip").unwrap().data;

    assert_eq!(first, second);
}

#[test]
fn archive_inside_source_folder_is_not_packed_into_itself() {
    let store = seeded("folder", &[("a.txt", "a")]);
    let zipper = FolderZipper::new(&store);

    zipper.pack("folder", "folder/all.zip", &WriteOptions::new()).unwrap();
    assert_eq!(
        entry_names(&open_archive(&store, "folder/all.zip")),
        ["a.txt"]
    );

    // A second run lists the previous archive as a regular object
    let summary = zipper.pack("folder", "folder/all.zip", &WriteOptions::new()).unwrap();
    assert_eq!(summary.entries, ["a.txt", "all.zip"]);
}

#[test]
fn content_type_and_metadata_reach_destination() {
    let store = seeded("folder", &[("a.txt", "a")]);
    let options = WriteOptions::new()
        .content_type("application/zip")
        .metadata_entry("origin", "nightly");

    let summary = FolderZipper::new(&store)
        .pack("folder", "out.zip", &options)
        .unwrap();

    let stored = store.get("out.zip").unwrap();
    assert_eq!(stored.content_type.as_deref(), Some("application/zip"));
    assert_eq!(stored.metadata.as_ref().unwrap()["origin"], "nightly");
    assert_eq!(summary.archive.content_type, stored.content_type);
}

#[test]
fn headers_absent_when_not_supplied() {
    let store = seeded("folder", &[("a.txt", "a")]);

    FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new().content_type(""))
        .unwrap();

    let stored = store.get("out.zip").unwrap();
    assert_eq!(stored.content_type, None);
    assert_eq!(stored.metadata, None);
}

#[test]
fn duplicate_entry_names_are_kept() {
    let store = MemoryStore::new();
    store.insert("folder/Notes.txt", "upper");
    store.insert("folder/notes.txt", "lower");

    let summary = FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new())
        .unwrap();
    assert_eq!(summary.entries, ["notes.txt", "notes.txt"]);

    let reader = open_archive(&store, "out.zip");
    assert_eq!(reader.entries().len(), 2);
}

#[test]
fn only_first_listing_page_is_packed() {
    init_tracing();
    let store = seeded("folder", &[("a", "1"), ("b", "2"), ("c", "3")]).with_page_size(2);

    let summary = FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new())
        .unwrap();
    assert_eq!(summary.entries, ["a", "b"]);
}

#[test]
fn large_object_streams_through() {
    let data: Vec<u8> = (0..3_000_000u32).map(|i| (i % 251) as u8).collect();
    let store = MemoryStore::new();
    store.insert("big/blob.bin", data.clone());

    let summary = FolderZipper::new(&store)
        .pack("big", "big.zip", &WriteOptions::new())
        .unwrap();
    assert_eq!(summary.uncompressed_bytes, data.len() as u64);

    let mut reader = open_archive(&store, "big.zip");
    assert_eq!(reader.read_entry_by_name("blob.bin").unwrap(), data);
}

#[test]
fn blank_folder_does_not_archive_bucket_root() {
    let store = CountingStore::default();
    store.inner.insert("secrets.env", "TOKEN=1");
    store.inner.insert("backup.sql", "-- dump");

    for folder in ["", "/", "//"] {
        let err = FolderZipper::new(&store)
            .pack(folder, "out.zip", &WriteOptions::new())
            .unwrap_err();
        assert!(matches!(err, PackError::EmptyFolder { ref prefix } if prefix == "/"));
    }
    assert_eq!(store.writes_opened.get(), 0);
    assert!(!store.inner.contains("out.zip"));
}

#[test]
fn overlong_file_name_fails_entry_creation() {
    let long_name = "n".repeat(u16::MAX as usize + 1);
    let store = MemoryStore::new();
    store.insert("folder/a.txt", "a");
    store.insert(format!("folder/{long_name}"), "too long");

    let err = FolderZipper::new(&store)
        .pack("folder", "out.zip", &WriteOptions::new())
        .unwrap_err();

    match err {
        PackError::EntryCreate { name, entry, source } => {
            assert_eq!(name, format!("folder/{long_name}"));
            assert_eq!(entry, long_name);
            assert!(matches!(source, ZipError::InvalidEntryName { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!store.contains("out.zip"));
}
