//! Pack an S3 (or MinIO) folder into a ZIP stored in the same bucket.
//!
//! Run with:
//! ```bash
//! export AWS_ACCESS_KEY_ID="your-key"
//! export AWS_SECRET_ACCESS_KEY="your-secret"
//! export S3_BUCKET="my-bucket"
//! export S3_ENDPOINT="http://localhost:9000"   # optional, for MinIO
//! cargo run --example pack_s3_folder --features cloud-s3 -- reports reports.zip
//! ```

use bucket_zip::cloud::s3::S3Store;
use bucket_zip::{FolderZipper, PackError, WriteOptions};
use std::env;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = env::args().skip(1);
    let (Some(source), Some(destination)) = (args.next(), args.next()) else {
        eprintln!("usage: pack_s3_folder <source-folder> <destination-object>");
        std::process::exit(2);
    };

    let mut builder = S3Store::builder().bucket(env::var("S3_BUCKET")?);
    if let Ok(endpoint) = env::var("S3_ENDPOINT") {
        builder = builder.endpoint_url(endpoint);
    }
    if let Ok(region) = env::var("AWS_REGION") {
        builder = builder.region(region);
    }
    let store = builder.build()?;

    let options = WriteOptions::new().content_type("application/zip");
    match FolderZipper::new(&store).pack(&source, &destination, &options) {
        Ok(summary) => {
            println!(
                "s3://{}/{}: {:?}",
                store.bucket(),
                summary.archive.name,
                summary.entries
            );
            Ok(())
        }
        Err(PackError::EmptyFolder { prefix }) => {
            eprintln!("nothing to pack under `{prefix}`");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
