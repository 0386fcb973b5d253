//! Pack a Google Cloud Storage folder into a ZIP stored in the same bucket.
//!
//! Run with:
//! ```bash
//! export GCS_BUCKET="my-bucket"
//! export GOOGLE_APPLICATION_CREDENTIALS="service-account.json"   # optional
//! cargo run --example pack_gcs_folder --features cloud-gcs -- exports/2024 exports/2024.zip
//! ```
//!
//! Set `RUST_LOG=bucket_zip=debug` to see one line per archived object.

use bucket_zip::cloud::gcs::{GcsCredentials, GcsStore};
use bucket_zip::{FolderZipper, WriteOptions};
use std::env;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = env::args().skip(1);
    let (Some(source), Some(destination)) = (args.next(), args.next()) else {
        eprintln!("usage: pack_gcs_folder <source-folder> <destination-object>");
        std::process::exit(2);
    };

    let bucket = env::var("GCS_BUCKET")?;
    let credentials = match env::var_os("GOOGLE_APPLICATION_CREDENTIALS") {
        Some(path) => GcsCredentials::KeyFile(path.into()),
        None => GcsCredentials::Default,
    };

    let store = GcsStore::builder()
        .bucket(&bucket)
        .credentials(credentials)
        .build()?;

    let options = WriteOptions::new()
        .content_type("application/zip")
        .metadata_entry("source-folder", &source);

    let summary = FolderZipper::new(store).pack(&source, &destination, &options)?;

    println!(
        "gs://{bucket}/{} ({} entries, {} bytes from {} bytes of input)",
        summary.archive.name,
        summary.entries.len(),
        summary.archive.size,
        summary.uncompressed_bytes
    );
    Ok(())
}
