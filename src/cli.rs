use clap::{Args, Parser, Subcommand};
use parcel_config::{Compression, Overrides};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "parcel", version)]
#[command(about = "Package a folder into an archive and keep it in sync with an S3 bucket")]
#[command(long_about = r#"
parcel packages a folder into a single compressed tar archive and uploads it
to an S3-compatible bucket, but only when the bucket's copy is missing or
its stored digest differs from the local one.

Examples:
  parcel push ./photos --bucket backups     Upload if changed
  parcel status ./photos --bucket backups   Show what push would do
  parcel pull photos.tar.gz --bucket backups
  parcel list --bucket backups
"#)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (TOML, or YAML by extension)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Bucket to sync with
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// S3-compatible endpoint URL
    #[arg(long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Provider region
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Key prefix inside the bucket
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Directory archives are written to
    #[arg(long, global = true, value_name = "DIR")]
    pub archive_dir: Option<PathBuf>,

    /// Archive compression (gzip, bzip2, zstd, none)
    #[arg(long, global = true, value_parser = parse_compression)]
    pub compression: Option<Compression>,

    /// Cancel whatever is in flight after this many seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Package a folder and upload it if the bucket's copy is stale
    Push(PushArgs),
    /// Package a folder and report what push would do, without uploading
    Status {
        /// Folder to package
        folder: PathBuf,

        /// Rebuild the archive even if one already exists
        #[arg(short, long)]
        force: bool,
    },
    /// Download an archive
    Pull {
        /// Object key, e.g. photos.tar.gz
        key: String,

        /// Directory to download into
        #[arg(short, long, default_value = ".", value_name = "DIR")]
        output: PathBuf,
    },
    /// List archives in the bucket
    List {
        /// Only list keys starting with this (relative to the configured prefix)
        filter: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct PushArgs {
    /// Folder to package
    pub folder: PathBuf,

    /// Rebuild the archive even if one already exists
    #[arg(short, long)]
    pub force: bool,

    /// Remove the local archive once the bucket is up to date
    #[arg(long)]
    pub clean: bool,

    /// Create the bucket first
    #[arg(long)]
    pub make_bucket: bool,

    /// Package and compare, but don't create buckets, upload or clean
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

fn parse_compression(value: &str) -> Result<Compression, String> {
    value.parse().map_err(|err: parcel_compress::error::Error| (*err).to_string())
}

impl Cli {
    /// Flags that take precedence over every configuration source.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            archive_dir: self.archive_dir.clone(),
            compression: self.compression,
        }
    }
}
