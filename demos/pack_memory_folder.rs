//! Pack an in-memory folder and list the resulting archive.
//!
//! Run with:
//! ```bash
//! RUST_LOG=bucket_zip=debug cargo run --example pack_memory_folder
//! ```

use bucket_zip::{FolderZipper, MemoryStore, StreamingZipReader, WriteOptions};
use std::io::Cursor;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let store = MemoryStore::new();
    store.insert("invoices/2024/", "");
    store.insert("invoices/2024/January.PDF", b"%PDF-1.7 january".to_vec());
    store.insert("invoices/2024/February.PDF", b"%PDF-1.7 february".to_vec());
    store.insert("invoices/2024/summary.csv", "month,total\njan,100\nfeb,120\n");
    store.insert("invoices/2024/drafts/march.pdf", b"%PDF-1.7 draft".to_vec());

    let zipper = FolderZipper::new(&store);
    let options = WriteOptions::new()
        .content_type("application/zip")
        .metadata_entry("year", "2024");
    let summary = zipper.pack("invoices/2024", "invoices/2024.zip", &options)?;

    println!(
        "{}: {} bytes, {} entries",
        summary.archive.name,
        summary.archive.size,
        summary.entries.len()
    );

    let archive = store.get("invoices/2024.zip").map(|o| o.data).unwrap_or_default();
    let reader = StreamingZipReader::new(Cursor::new(archive))?;
    for entry in reader.entries() {
        println!(
            "  {:<20} {:>6} -> {:>6} bytes",
            entry.name, entry.uncompressed_size, entry.compressed_size
        );
    }
    Ok(())
}
