//! Object storage for packaged archives.
//!
//! Everything the rest of the workspace needs from a bucket goes through the
//! [`StorageBackend`] trait: a metadata-only probe, streaming uploads from and
//! downloads into local files, listing, and bucket creation. Backends are
//! shared as a [`BackendHandle`].

pub mod backend;
pub mod error;
mod key;
mod object;

pub use crate::backend::StorageBackend;
pub use crate::key::validate as validate_key;
pub use crate::object::{Metadata, ObjectHead, ObjectInfo, Probe, PutRequest, metadata_value};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
