//! Deterministic archive packaging and content fingerprints.
//!
//! A source directory is packaged into a single tar stream wrapped in one
//! compression layer by the [`Archiver`]. The resulting file is identified by
//! its [`Digest`]: packaging an unchanged tree twice produces byte-identical
//! archives, so the digest is a stable content identity that can be compared
//! against whatever was uploaded last time.
//!
//! Everything in this crate is blocking filesystem I/O. Async callers should
//! run it inside [`spawn_blocking`](https://docs.rs/tokio/latest/tokio/task/fn.spawn_blocking.html).

mod digest;
pub mod error;
mod local;
mod package;

pub use crate::digest::{Digest, SHORT_FINGERPRINT_LEN, digest_file, digest_reader};
pub use crate::local::LocalArchive;
pub use crate::package::{Archiver, Packaged};
pub use parcel_compress::Compression;
