use bucket_zip::{CompressionMethod, StreamingZipReader, StreamingZipWriter};
use std::io::{Cursor, Write};

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// One stored entry whose sizes and offset live only in the ZIP64 extra field,
/// followed by a ZIP64 EOCD, its locator and a saturated classic EOCD.
fn crafted_zip64(name: &str, data: &[u8]) -> Vec<u8> {
    let crc = crc32fast::hash(data);
    let mut zip = Vec::new();

    // local file header, sizes deferred to the data descriptor
    zip.extend_from_slice(b"PK\x03\x04");
    put_u16(&mut zip, 45);
    put_u16(&mut zip, 1 << 3);
    put_u16(&mut zip, 0);
    put_u32(&mut zip, 0);
    put_u32(&mut zip, 0);
    put_u32(&mut zip, u32::MAX);
    put_u32(&mut zip, u32::MAX);
    put_u16(&mut zip, name.len() as u16);
    put_u16(&mut zip, 0);
    zip.extend_from_slice(name.as_bytes());
    zip.extend_from_slice(data);

    // ZIP64 data descriptor
    zip.extend_from_slice(b"PK\x07\x08");
    put_u32(&mut zip, crc);
    put_u64(&mut zip, data.len() as u64);
    put_u64(&mut zip, data.len() as u64);

    let cd_start = zip.len() as u64;
    zip.extend_from_slice(b"PK\x01\x02");
    put_u16(&mut zip, 45);
    put_u16(&mut zip, 45);
    put_u16(&mut zip, 1 << 3);
    put_u16(&mut zip, 0);
    put_u32(&mut zip, 0);
    put_u32(&mut zip, crc);
    put_u32(&mut zip, u32::MAX);
    put_u32(&mut zip, u32::MAX);
    put_u16(&mut zip, name.len() as u16);
    put_u16(&mut zip, 4 + 24);
    put_u16(&mut zip, 0);
    put_u16(&mut zip, 0);
    put_u16(&mut zip, 0);
    put_u32(&mut zip, 0);
    put_u32(&mut zip, u32::MAX);
    zip.extend_from_slice(name.as_bytes());
    put_u16(&mut zip, 0x0001);
    put_u16(&mut zip, 24);
    put_u64(&mut zip, data.len() as u64);
    put_u64(&mut zip, data.len() as u64);
    put_u64(&mut zip, 0);
    let cd_size = zip.len() as u64 - cd_start;

    let zip64_eocd = zip.len() as u64;
    zip.extend_from_slice(b"PK\x06\x06");
    put_u64(&mut zip, 44);
    put_u16(&mut zip, 45);
    put_u16(&mut zip, 45);
    put_u32(&mut zip, 0);
    put_u32(&mut zip, 0);
    put_u64(&mut zip, 1);
    put_u64(&mut zip, 1);
    put_u64(&mut zip, cd_size);
    put_u64(&mut zip, cd_start);

    zip.extend_from_slice(b"PK\x06\x07");
    put_u32(&mut zip, 0);
    put_u64(&mut zip, zip64_eocd);
    put_u32(&mut zip, 1);

    zip.extend_from_slice(b"PK\x05\x06");
    put_u16(&mut zip, 0);
    put_u16(&mut zip, 0);
    put_u16(&mut zip, 0xFFFF);
    put_u16(&mut zip, 0xFFFF);
    put_u32(&mut zip, u32::MAX);
    put_u32(&mut zip, u32::MAX);
    put_u16(&mut zip, 0);

    zip
}

#[test]
fn reads_sizes_and_offset_from_zip64_extra_field() {
    let zip = crafted_zip64("a.txt", b"hello");

    let mut reader = StreamingZipReader::new(Cursor::new(zip)).expect("should open crafted zip64");
    let entries = reader.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "a.txt");
    assert_eq!(entries[0].uncompressed_size, 5);
    assert_eq!(entries[0].compressed_size, 5);
    assert_eq!(entries[0].offset, 0);

    assert_eq!(reader.read_entry_by_name("a.txt").unwrap(), b"hello");
}

#[test]
fn reads_crafted_zip64_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zip64.zip");
    std::fs::write(&path, crafted_zip64("report.csv", b"a,b\n1,2\n")).unwrap();

    let mut reader = StreamingZipReader::open(&path).unwrap();
    assert_eq!(reader.read_entry_by_name("report.csv").unwrap(), b"a,b\n1,2\n");
}

#[test]
fn writer_switches_to_zip64_past_entry_limit() {
    const ENTRIES: usize = 0xFFFF + 1;

    let mut writer =
        StreamingZipWriter::from_writer_with_method(Vec::new(), CompressionMethod::Stored, 0);
    for i in 0..ENTRIES {
        writer.start_entry_with_hint(&format!("{i}.txt"), Some(0)).unwrap();
    }
    writer
        .create_entry("last.txt")
        .unwrap()
        .write_all(b"still readable")
        .unwrap();
    let zip = writer.finish().unwrap();

    let mut reader = StreamingZipReader::new(Cursor::new(zip)).unwrap();
    assert_eq!(reader.entries().len(), ENTRIES + 1);
    assert_eq!(reader.entries()[0].name, "0.txt");
    assert_eq!(
        reader.read_entry_by_name("last.txt").unwrap(),
        b"still readable"
    );
}
