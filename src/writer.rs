//! Streaming ZIP writer that compresses data on-the-fly
//!
//! The output only needs to implement [`Write`]: offsets for the central
//! directory are tracked by counting bytes, so object store uploads, pipes and
//! sockets work the same as files. Every entry uses a data descriptor (general
//! purpose bit 3), which means sizes and CRC never have to be known upfront.

use crate::error::{Result, ZipError};
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Default DEFLATE level
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
const FLAG_UTF8: u16 = 1 << 11;
const VERSION_DEFAULT: u16 = 20;
const VERSION_ZIP64: u16 = 45;

/// Compression method to use for ZIP entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    /// No compression (stored)
    Stored,
    /// DEFLATE compression (most common)
    #[default]
    Deflate,
}

impl CompressionMethod {
    pub(crate) fn to_zip_method(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
        }
    }
}

/// Finished entry, kept for the central directory
struct FinishedEntry {
    name: String,
    flags: u16,
    local_header_offset: u64,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    compression_method: u16,
}

impl FinishedEntry {
    fn needs_zip64(&self) -> bool {
        needs_zip64_field(self.uncompressed_size)
            || needs_zip64_field(self.compressed_size)
            || needs_zip64_field(self.local_header_offset)
    }
}

/// Output wrapper that remembers how many bytes went through it
struct CountingWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streaming ZIP writer that compresses data on-the-fly
pub struct StreamingZipWriter<W: Write> {
    output: CountingWriter<W>,
    entries: Vec<FinishedEntry>,
    current_entry: Option<CurrentEntry>,
    compression_level: u32,
    compression_method: CompressionMethod,
}

struct CurrentEntry {
    name: String,
    flags: u16,
    local_header_offset: u64,
    encoder: Box<dyn CompressorWrite>,
    counter: CrcCounter,
    compression_method: u16,
}

trait CompressorWrite: Write {
    fn finish_compression(self: Box<Self>) -> Result<CompressedBuffer>;
    fn get_buffer_mut(&mut self) -> &mut CompressedBuffer;
}

struct DeflateCompressor {
    encoder: DeflateEncoder<CompressedBuffer>,
}

impl Write for DeflateCompressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl CompressorWrite for DeflateCompressor {
    fn finish_compression(self: Box<Self>) -> Result<CompressedBuffer> {
        Ok(self.encoder.finish()?)
    }

    fn get_buffer_mut(&mut self) -> &mut CompressedBuffer {
        self.encoder.get_mut()
    }
}

/// Pass-through "compressor" for the stored method
struct StoredCompressor {
    buffer: CompressedBuffer,
}

impl Write for StoredCompressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CompressorWrite for StoredCompressor {
    fn finish_compression(self: Box<Self>) -> Result<CompressedBuffer> {
        Ok(self.buffer)
    }

    fn get_buffer_mut(&mut self) -> &mut CompressedBuffer {
        &mut self.buffer
    }
}

/// Metadata tracker for CRC and byte counts
struct CrcCounter {
    crc: Crc32,
    uncompressed_count: u64,
    compressed_count: u64,
}

impl CrcCounter {
    fn new() -> Self {
        Self {
            crc: Crc32::new(),
            uncompressed_count: 0,
            compressed_count: 0,
        }
    }

    fn update_uncompressed(&mut self, data: &[u8]) {
        self.crc.update(data);
        self.uncompressed_count += data.len() as u64;
    }

    fn add_compressed(&mut self, count: u64) {
        self.compressed_count += count;
    }

    fn finalize(&self) -> u32 {
        self.crc.clone().finalize()
    }
}

/// Buffered writer for compressed data with adaptive sizing
///
/// Capacity and flush threshold follow the expected entry size, so small
/// objects do not reserve megabytes and large ones are not flushed in tiny
/// writes (which matters when every flush becomes an upload call).
struct CompressedBuffer {
    buffer: Vec<u8>,
    flush_threshold: usize,
}

impl CompressedBuffer {
    /// - Tiny files (<10KB): 8KB initial, 256KB threshold
    /// - Small files (<100KB): 32KB initial, 512KB threshold
    /// - Medium files (<1MB): 128KB initial, 2MB threshold
    /// - Large files (<10MB): 256KB initial, 4MB threshold
    /// - Very large or unknown: 512KB initial, 8MB threshold
    fn with_size_hint(size_hint: Option<u64>) -> Self {
        let (initial_capacity, flush_threshold) = match size_hint {
            Some(size) if size < 10_000 => (8 * 1024, 256 * 1024),
            Some(size) if size < 100_000 => (32 * 1024, 512 * 1024),
            Some(size) if size < 1_000_000 => (128 * 1024, 2 * 1024 * 1024),
            Some(size) if size < 10_000_000 => (256 * 1024, 4 * 1024 * 1024),
            _ => (512 * 1024, 8 * 1024 * 1024),
        };

        Self {
            buffer: Vec::with_capacity(initial_capacity),
            flush_threshold,
        }
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    fn should_flush(&self) -> bool {
        self.buffer.len() >= self.flush_threshold
    }
}

impl Write for CompressedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// `io::Write` handle for the entry most recently started on a
/// [`StreamingZipWriter`]. Returned by [`StreamingZipWriter::create_entry`].
///
/// Dropping the handle does not finish the entry; the next `create_entry` or
/// [`StreamingZipWriter::finish`] does.
pub struct EntryWriter<'a, W: Write> {
    zip: &'a mut StreamingZipWriter<W>,
}

impl<W: Write> Write for EntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.zip.write_data(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StreamingZipWriter<File> {
    /// Create a new ZIP file on disk with DEFLATE at the default level
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_writer(File::create(path)?))
    }
}

impl<W: Write> StreamingZipWriter<W> {
    /// Create a ZIP writer over an arbitrary writer using DEFLATE at the default level
    pub fn from_writer(writer: W) -> Self {
        Self::from_writer_with_method(
            writer,
            CompressionMethod::Deflate,
            DEFAULT_COMPRESSION_LEVEL,
        )
    }

    /// Create a ZIP writer with specified compression method and level
    ///
    /// # Arguments
    /// * `writer` - Any writer; seeking is never required
    /// * `method` - Compression method to use (Deflate or Stored)
    /// * `compression_level` - DEFLATE level (0-9), ignored for Stored
    pub fn from_writer_with_method(
        writer: W,
        method: CompressionMethod,
        compression_level: u32,
    ) -> Self {
        Self {
            output: CountingWriter::new(writer),
            entries: Vec::new(),
            current_entry: None,
            compression_level,
            compression_method: method,
        }
    }

    /// Number of entries started so far, including the one being written
    pub fn entry_count(&self) -> usize {
        self.entries.len() + usize::from(self.current_entry.is_some())
    }

    /// Bytes written to the underlying writer so far
    pub fn bytes_written(&self) -> u64 {
        self.output.position
    }

    /// Start a new entry (file) in the ZIP
    pub fn start_entry(&mut self, name: &str) -> Result<()> {
        self.start_entry_with_hint(name, None)
    }

    /// Start a new entry with size hint for optimized buffering
    ///
    /// The hint only sizes the compression buffer; a wrong hint costs memory
    /// or extra flushes, never correctness.
    pub fn start_entry_with_hint(&mut self, name: &str, size_hint: Option<u64>) -> Result<()> {
        if name.len() > u16::MAX as usize {
            return Err(ZipError::InvalidEntryName {
                name: name.to_string(),
                reason: "name longer than 65535 bytes",
            });
        }

        // Finish previous entry if any
        self.finish_current_entry()?;

        let local_header_offset = self.output.position;
        let compression_method = self.compression_method.to_zip_method();
        let flags = if name.is_ascii() {
            FLAG_DATA_DESCRIPTOR
        } else {
            FLAG_DATA_DESCRIPTOR | FLAG_UTF8
        };

        // Local file header; CRC and sizes follow in the data descriptor
        let out = &mut self.output;
        out.write_all(&[0x50, 0x4b, 0x03, 0x04])?; // signature
        out.write_all(&VERSION_DEFAULT.to_le_bytes())?; // version needed
        out.write_all(&flags.to_le_bytes())?; // general purpose bit flag
        out.write_all(&compression_method.to_le_bytes())?; // compression method
        out.write_all(&[0, 0, 0, 0])?; // mod time/date
        out.write_all(&0u32.to_le_bytes())?; // crc32 placeholder
        out.write_all(&0u32.to_le_bytes())?; // compressed size placeholder
        out.write_all(&0u32.to_le_bytes())?; // uncompressed size placeholder
        out.write_all(&(name.len() as u16).to_le_bytes())?;
        out.write_all(&0u16.to_le_bytes())?; // extra len
        out.write_all(name.as_bytes())?;

        let buffer = CompressedBuffer::with_size_hint(size_hint);
        let encoder: Box<dyn CompressorWrite> = match self.compression_method {
            CompressionMethod::Deflate => Box::new(DeflateCompressor {
                encoder: DeflateEncoder::new(buffer, Compression::new(self.compression_level)),
            }),
            CompressionMethod::Stored => Box::new(StoredCompressor { buffer }),
        };

        self.current_entry = Some(CurrentEntry {
            name: name.to_string(),
            flags,
            local_header_offset,
            encoder,
            counter: CrcCounter::new(),
            compression_method,
        });

        Ok(())
    }

    /// Start a new entry and return an `io::Write` handle for its contents
    pub fn create_entry(&mut self, name: &str) -> Result<EntryWriter<'_, W>> {
        self.create_entry_with_hint(name, None)
    }

    /// Like [`create_entry`](Self::create_entry), with a size hint for buffering
    pub fn create_entry_with_hint(
        &mut self,
        name: &str,
        size_hint: Option<u64>,
    ) -> Result<EntryWriter<'_, W>> {
        self.start_entry_with_hint(name, size_hint)?;
        Ok(EntryWriter { zip: self })
    }

    /// Write uncompressed data to the current entry
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let entry = self
            .current_entry
            .as_mut()
            .ok_or(ZipError::NoEntryStarted)?;

        entry.counter.update_uncompressed(data);
        entry.encoder.write_all(data)?;

        // Hand compressed bytes to the output once enough have accumulated
        let buffer = entry.encoder.get_buffer_mut();
        if buffer.should_flush() {
            let compressed_data = buffer.take();
            self.output.write_all(&compressed_data)?;
            entry.counter.add_compressed(compressed_data.len() as u64);
        }

        Ok(())
    }

    /// Finish current entry and write data descriptor
    fn finish_current_entry(&mut self) -> Result<()> {
        let Some(mut entry) = self.current_entry.take() else {
            return Ok(());
        };

        let mut buffer = entry.encoder.finish_compression()?;
        let remaining_data = buffer.take();
        if !remaining_data.is_empty() {
            self.output.write_all(&remaining_data)?;
            entry.counter.add_compressed(remaining_data.len() as u64);
        }

        let crc = entry.counter.finalize();
        let compressed_size = entry.counter.compressed_count;
        let uncompressed_size = entry.counter.uncompressed_count;

        write_data_descriptor(&mut self.output, crc, compressed_size, uncompressed_size)?;

        self.entries.push(FinishedEntry {
            name: entry.name,
            flags: entry.flags,
            local_header_offset: entry.local_header_offset,
            crc32: crc,
            compressed_size,
            uncompressed_size,
            compression_method: entry.compression_method,
        });

        Ok(())
    }

    /// Finish ZIP file (write central directory and return the writer)
    ///
    /// Until this returns `Ok` the output is not a valid archive.
    pub fn finish(mut self) -> Result<W> {
        self.finish_current_entry()?;

        let central_dir_offset = self.output.position;
        for entry in &self.entries {
            write_central_directory_header(&mut self.output, entry)?;
        }
        let central_dir_size = self.output.position - central_dir_offset;
        let entry_count = self.entries.len() as u64;

        let need_zip64 = self.entries.len() >= u16::MAX as usize
            || central_dir_size >= u32::MAX as u64
            || central_dir_offset >= u32::MAX as u64;

        let out = &mut self.output;
        if need_zip64 {
            let zip64_eocd_offset = out.position;

            // ZIP64 end of central directory record
            out.write_all(&[0x50, 0x4b, 0x06, 0x06])?;
            out.write_all(&44u64.to_le_bytes())?; // size of remaining record
            out.write_all(&VERSION_ZIP64.to_le_bytes())?; // version made by
            out.write_all(&VERSION_ZIP64.to_le_bytes())?; // version needed
            out.write_all(&0u32.to_le_bytes())?; // disk number
            out.write_all(&0u32.to_le_bytes())?; // disk with central dir
            out.write_all(&entry_count.to_le_bytes())?; // entries on this disk
            out.write_all(&entry_count.to_le_bytes())?; // total entries
            out.write_all(&central_dir_size.to_le_bytes())?;
            out.write_all(&central_dir_offset.to_le_bytes())?;

            // ZIP64 end of central directory locator
            out.write_all(&[0x50, 0x4b, 0x06, 0x07])?;
            out.write_all(&0u32.to_le_bytes())?; // disk with ZIP64 EOCD
            out.write_all(&zip64_eocd_offset.to_le_bytes())?;
            out.write_all(&1u32.to_le_bytes())?; // total number of disks
        }

        // End of central directory (classic)
        let entries_16 = if need_zip64 { 0xFFFF } else { entry_count as u16 };
        out.write_all(&[0x50, 0x4b, 0x05, 0x06])?;
        out.write_all(&0u16.to_le_bytes())?; // disk number
        out.write_all(&0u16.to_le_bytes())?; // disk with central dir
        out.write_all(&entries_16.to_le_bytes())?;
        out.write_all(&entries_16.to_le_bytes())?;
        out.write_all(&clamp_u32(central_dir_size, need_zip64).to_le_bytes())?;
        out.write_all(&clamp_u32(central_dir_offset, need_zip64).to_le_bytes())?;
        out.write_all(&0u16.to_le_bytes())?; // comment len

        out.flush()?;
        Ok(self.output.inner)
    }
}

/// A saturated 32-bit slot tells readers to look in the ZIP64 extra field
fn needs_zip64_field(value: u64) -> bool {
    value >= u32::MAX as u64
}

/// Data descriptor, with 64-bit sizes whenever the central directory will use ZIP64 for them
fn write_data_descriptor<W: Write>(
    out: &mut W,
    crc: u32,
    compressed_size: u64,
    uncompressed_size: u64,
) -> Result<()> {
    out.write_all(&[0x50, 0x4b, 0x07, 0x08])?;
    out.write_all(&crc.to_le_bytes())?;
    if needs_zip64_field(compressed_size) || needs_zip64_field(uncompressed_size) {
        out.write_all(&compressed_size.to_le_bytes())?;
        out.write_all(&uncompressed_size.to_le_bytes())?;
    } else {
        out.write_all(&(compressed_size as u32).to_le_bytes())?;
        out.write_all(&(uncompressed_size as u32).to_le_bytes())?;
    }
    Ok(())
}

fn clamp_u32(value: u64, force_marker: bool) -> u32 {
    if force_marker || needs_zip64_field(value) {
        u32::MAX
    } else {
        value as u32
    }
}

fn write_central_directory_header<W: Write>(out: &mut W, entry: &FinishedEntry) -> Result<()> {
    let zip64 = entry.needs_zip64();
    let version = if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT };

    // ZIP64 extra field (0x0001): only the values whose 32-bit slot is saturated, in format order
    let mut extra_field: Vec<u8> = Vec::new();
    if zip64 {
        let mut data: Vec<u8> = Vec::with_capacity(24);
        if needs_zip64_field(entry.uncompressed_size) {
            data.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
        }
        if needs_zip64_field(entry.compressed_size) {
            data.extend_from_slice(&entry.compressed_size.to_le_bytes());
        }
        if needs_zip64_field(entry.local_header_offset) {
            data.extend_from_slice(&entry.local_header_offset.to_le_bytes());
        }
        extra_field.extend_from_slice(&0x0001u16.to_le_bytes());
        extra_field.extend_from_slice(&(data.len() as u16).to_le_bytes());
        extra_field.extend_from_slice(&data);
    }

    out.write_all(&[0x50, 0x4b, 0x01, 0x02])?; // central dir sig
    out.write_all(&version.to_le_bytes())?; // version made by
    out.write_all(&version.to_le_bytes())?; // version needed
    out.write_all(&entry.flags.to_le_bytes())?;
    out.write_all(&entry.compression_method.to_le_bytes())?;
    out.write_all(&[0, 0, 0, 0])?; // mod time/date
    out.write_all(&entry.crc32.to_le_bytes())?;
    out.write_all(&clamp_u32(entry.compressed_size, false).to_le_bytes())?;
    out.write_all(&clamp_u32(entry.uncompressed_size, false).to_le_bytes())?;
    out.write_all(&(entry.name.len() as u16).to_le_bytes())?;
    out.write_all(&(extra_field.len() as u16).to_le_bytes())?;
    out.write_all(&0u16.to_le_bytes())?; // file comment len
    out.write_all(&0u16.to_le_bytes())?; // disk number start
    out.write_all(&0u16.to_le_bytes())?; // internal attrs
    out.write_all(&0u32.to_le_bytes())?; // external attrs
    out.write_all(&clamp_u32(entry.local_header_offset, false).to_le_bytes())?;
    out.write_all(entry.name.as_bytes())?;
    out.write_all(&extra_field)?;
    Ok(())
}
