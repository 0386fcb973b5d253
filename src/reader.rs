//! ZIP reader over any `Read + Seek` source
//!
//! Reads the central directory once, then decompresses entries on demand.
//! Used to inspect archives produced by [`FolderZipper`](crate::FolderZipper),
//! whether downloaded into memory or saved to disk.

use crate::error::{Result, ZipError};
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;
const ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06064b50;
const ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR: [u8; 4] = [0x50, 0x4b, 0x06, 0x07];
const END_OF_CENTRAL_DIRECTORY_MARKER: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

/// EOCD is at least 22 bytes, preceded by at most a 65535 byte comment
const EOCD_SEARCH_WINDOW: u64 = 65557;

/// Entry in the ZIP central directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    pub name: String,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_method: u16,
    pub offset: u64,
}

/// ZIP archive reader
pub struct StreamingZipReader<R> {
    source: R,
    entries: Vec<ZipEntry>,
}

impl StreamingZipReader<BufReader<File>> {
    /// Open a ZIP file on disk and read its central directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> StreamingZipReader<R> {
    /// Read the central directory of an archive held by `source`
    pub fn new(mut source: R) -> Result<Self> {
        let entries = read_central_directory(&mut source)?;
        Ok(Self { source, entries })
    }

    /// Entries in central directory order (the order they were written)
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Find the first entry with the given name
    pub fn find_entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Read an entry's decompressed data into a vector, checking its CRC-32
    pub fn read_entry(&mut self, entry: &ZipEntry) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(entry.uncompressed_size.min(64 * 1024 * 1024) as usize);
        self.read_entry_streaming(entry)?.read_to_end(&mut data)?;

        let actual = crc32fast::hash(&data);
        if actual != entry.crc32 {
            return Err(ZipError::ChecksumMismatch {
                name: entry.name.clone(),
                expected: entry.crc32,
                actual,
            });
        }
        Ok(data)
    }

    /// Read an entry by name
    pub fn read_entry_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find_entry(name)
            .ok_or_else(|| ZipError::EntryNotFound(name.to_string()))?
            .clone();

        self.read_entry(&entry)
    }

    /// Get a reader that decompresses an entry on-the-fly (no CRC check)
    pub fn read_entry_streaming(&mut self, entry: &ZipEntry) -> Result<Box<dyn Read + '_>> {
        self.source.seek(SeekFrom::Start(entry.offset))?;

        if read_u32_le(&mut self.source)? != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(ZipError::InvalidFormat(
                "Invalid local file header signature".to_string(),
            ));
        }

        // version, flags, method, time, date, crc, sizes: all taken from the central directory
        self.source.seek(SeekFrom::Current(22))?;
        let filename_len = read_u16_le(&mut self.source)? as i64;
        let extra_len = read_u16_le(&mut self.source)? as i64;
        self.source
            .seek(SeekFrom::Current(filename_len + extra_len))?;

        let limited_reader = (&mut self.source).take(entry.compressed_size);
        match entry.compression_method {
            0 => Ok(Box::new(limited_reader)),
            8 => Ok(Box::new(DeflateDecoder::new(limited_reader))),
            method => Err(ZipError::UnsupportedCompression(method)),
        }
    }
}

fn read_central_directory<R: Read + Seek>(source: &mut R) -> Result<Vec<ZipEntry>> {
    let eocd_offset = find_eocd(source)?;
    source.seek(SeekFrom::Start(eocd_offset))?;

    let signature = read_u32_le(source)?;
    if signature != END_OF_CENTRAL_DIRECTORY_SIGNATURE {
        return Err(ZipError::InvalidFormat(format!(
            "Invalid end of central directory signature: 0x{:08x}",
            signature
        )));
    }

    // disk number, disk with central dir, entries on this disk
    source.seek(SeekFrom::Current(6))?;
    let total_entries_16 = read_u16_le(source)?;
    let cd_size_32 = read_u32_le(source)?;
    let cd_offset_32 = read_u32_le(source)?;

    let (total_entries, cd_offset) =
        if total_entries_16 == 0xFFFF || cd_size_32 == u32::MAX || cd_offset_32 == u32::MAX {
            read_zip64_eocd(source, eocd_offset)?
        } else {
            (total_entries_16 as u64, cd_offset_32 as u64)
        };

    source.seek(SeekFrom::Start(cd_offset))?;

    let mut entries = Vec::with_capacity(total_entries.min(u16::MAX as u64) as usize);
    for _ in 0..total_entries {
        if read_u32_le(source)? != CENTRAL_DIRECTORY_SIGNATURE {
            return Err(ZipError::InvalidFormat(
                "Invalid central directory header signature".to_string(),
            ));
        }

        // version made by, version needed, flags
        source.seek(SeekFrom::Current(6))?;
        let compression_method = read_u16_le(source)?;
        // mod time, mod date
        source.seek(SeekFrom::Current(4))?;
        let crc32 = read_u32_le(source)?;
        let compressed_size_32 = read_u32_le(source)?;
        let uncompressed_size_32 = read_u32_le(source)?;
        let filename_len = read_u16_le(source)? as usize;
        let extra_len = read_u16_le(source)? as usize;
        let comment_len = read_u16_le(source)? as i64;
        // disk number, internal attributes, external attributes
        source.seek(SeekFrom::Current(8))?;
        let offset_32 = read_u32_le(source)?;

        let mut filename_buf = vec![0u8; filename_len];
        source.read_exact(&mut filename_buf)?;
        let name = String::from_utf8_lossy(&filename_buf).into_owned();

        let mut extra_buf = vec![0u8; extra_len];
        source.read_exact(&mut extra_buf)?;
        source.seek(SeekFrom::Current(comment_len))?;

        let mut uncompressed_size = uncompressed_size_32 as u64;
        let mut compressed_size = compressed_size_32 as u64;
        let mut offset = offset_32 as u64;

        // ZIP64 extra field holds only the values whose 32-bit slot is saturated, in this order
        if let Some(mut zip64) = find_extra_field(&extra_buf, 0x0001) {
            if uncompressed_size_32 == u32::MAX {
                uncompressed_size = take_u64_le(&mut zip64)?;
            }
            if compressed_size_32 == u32::MAX {
                compressed_size = take_u64_le(&mut zip64)?;
            }
            if offset_32 == u32::MAX {
                offset = take_u64_le(&mut zip64)?;
            }
        }

        entries.push(ZipEntry {
            name,
            crc32,
            compressed_size,
            uncompressed_size,
            compression_method,
            offset,
        });
    }

    Ok(entries)
}

/// Locate the ZIP64 EOCD through its locator and return (total entries, central dir offset)
fn read_zip64_eocd<R: Read + Seek>(source: &mut R, eocd_offset: u64) -> Result<(u64, u64)> {
    // The locator is 20 bytes and sits right before the classic EOCD
    let locator_offset = eocd_offset
        .checked_sub(20)
        .ok_or_else(|| ZipError::InvalidFormat("ZIP64 EOCD locator not found".to_string()))?;
    source.seek(SeekFrom::Start(locator_offset))?;

    let mut locator = [0u8; 20];
    source.read_exact(&mut locator)?;
    if locator[..4] != ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR {
        return Err(ZipError::InvalidFormat(
            "ZIP64 EOCD locator not found".to_string(),
        ));
    }
    let mut rest = &locator[8..16];
    let zip64_eocd_offset = take_u64_le(&mut rest)?;

    source.seek(SeekFrom::Start(zip64_eocd_offset))?;
    let signature = read_u32_le(source)?;
    if signature != ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE {
        return Err(ZipError::InvalidFormat(format!(
            "Invalid ZIP64 EOCD signature: 0x{:08x}",
            signature
        )));
    }

    // record size (8), versions (4), disk numbers (8), entries on this disk (8)
    source.seek(SeekFrom::Current(28))?;
    let total_entries = read_u64_le(source)?;
    let _cd_size = read_u64_le(source)?;
    let cd_offset = read_u64_le(source)?;

    Ok((total_entries, cd_offset))
}

/// Find the end of central directory record by scanning back from the end
fn find_eocd<R: Read + Seek>(source: &mut R) -> Result<u64> {
    let size = source.seek(SeekFrom::End(0))?;
    let search_start = size.saturating_sub(EOCD_SEARCH_WINDOW);
    source.seek(SeekFrom::Start(search_start))?;

    let mut buffer = Vec::new();
    source.read_to_end(&mut buffer)?;

    buffer
        .windows(4)
        .rposition(|w| w == END_OF_CENTRAL_DIRECTORY_MARKER)
        .map(|i| search_start + i as u64)
        .ok_or_else(|| ZipError::InvalidFormat("End of central directory not found".to_string()))
}

fn find_extra_field(mut extra: &[u8], wanted: u16) -> Option<&[u8]> {
    while extra.len() >= 4 {
        let id = u16::from_le_bytes([extra[0], extra[1]]);
        let len = u16::from_le_bytes([extra[2], extra[3]]) as usize;
        let body = extra.get(4..4 + len)?;
        if id == wanted {
            return Some(body);
        }
        extra = &extra[4 + len..];
    }
    None
}

fn take_u64_le(data: &mut &[u8]) -> Result<u64> {
    let (head, tail) = data
        .split_first_chunk::<8>()
        .ok_or_else(|| ZipError::InvalidFormat("Truncated ZIP64 field".to_string()))?;
    *data = tail;
    Ok(u64::from_le_bytes(*head))
}

fn read_u16_le<R: Read>(source: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    source.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_le<R: Read>(source: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64_le<R: Read>(source: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    source.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
