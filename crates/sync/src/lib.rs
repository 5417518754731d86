//! Content-addressed sync between a local folder and a bucket.
//!
//! A push runs the same pipeline every time:
//!
//! 1. package the folder into an archive (or reuse the one on disk),
//! 2. fingerprint the archive bytes,
//! 3. probe the bucket for the archive's key and read back its stored digest,
//! 4. [`decide`] whether to skip or upload,
//! 5. upload with the digest attached, then optionally remove the archive.
//!
//! The decision is a pure function of the two digests. Nothing is cached
//! between runs, so the bucket's metadata is the only record of what was
//! uploaded.

mod decision;
pub mod error;
mod remote;
mod syncer;
pub mod transfer;

pub use crate::decision::{Decision, UploadReason, decide};
pub use crate::remote::{DIGEST_METADATA_KEY, RemoteObject, probe};
pub use crate::syncer::{Cleanup, PushOptions, PushReport, Status, Syncer};
pub use crate::transfer::Downloaded;
