use crate::digest::{Digest, digest_file};
use crate::error::Result;
use crate::package::{Archiver, Packaged};
use std::path::{Path, PathBuf};

/// A packaged archive together with its freshly computed fingerprint.
///
/// The digest is always computed from the bytes on disk, including when the
/// archive was reused, so it reflects what would actually be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArchive {
    pub source: PathBuf,
    pub name: String,
    pub path: PathBuf,
    pub digest: Digest,
    pub reused: bool,
}

impl LocalArchive {
    /// Package `source` (or reuse its archive) and fingerprint the result.
    pub fn prepare(archiver: &Archiver, source: impl AsRef<Path>, force: bool) -> Result<Self> {
        Self::from_packaged(archiver.package(source, force)?)
    }

    pub fn from_packaged(packaged: Packaged) -> Result<Self> {
        let digest = digest_file(&packaged.path)?;
        tracing::debug!(archive = %packaged.name, %digest, "Fingerprinted archive");
        Ok(Self {
            source: packaged.source,
            name: packaged.name,
            path: packaged.path,
            digest,
            reused: packaged.reused,
        })
    }

    /// The short fingerprint, or an empty string if the digest isn't base64.
    pub fn short_fingerprint(&self) -> String {
        self.digest.short().unwrap_or_default()
    }
}
