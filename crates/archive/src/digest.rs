//! Content fingerprints.
//!
//! The canonical textual form is standard base64 of the raw MD5 hash. That is
//! the format S3 expects in a `Content-MD5` header and the format existing
//! archives carry in their `md5chksum` metadata, so it is kept for
//! compatibility even though MD5 is no longer a good choice for anything
//! adversarial.

use crate::error::{ErrorKind, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use exn::ResultExt;
use md5::{Digest as _, Md5};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Number of hex characters in a [short fingerprint](Digest::short).
pub const SHORT_FINGERPRINT_LEN: usize = 7;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// The content identity of an archive.
///
/// Equality is exact string equality of the encoded form. A digest read back
/// from remote metadata may be anything another tool decided to write
/// (including an empty string); it simply won't compare equal to a locally
/// computed one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest(String);

impl Digest {
    /// Encode a raw hash into its canonical form.
    pub fn from_hash(hash: &[u8]) -> Self {
        Self(BASE64.encode(hash))
    }

    /// Fingerprint an in-memory byte slice.
    ///
    /// ```
    /// use parcel_archive::Digest;
    ///
    /// assert_eq!(Digest::of(b"hi").as_str(), "SfaKXIST7CwL9ImCHCH8Ow==");
    /// ```
    pub fn of(data: &[u8]) -> Self {
        Self::from_hash(&Md5::digest(data))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex encoding of the decoded hash, or `None` if this digest is not
    /// valid base64 (e.g. metadata written by a different tool).
    pub fn to_hex(&self) -> Option<String> {
        BASE64.decode(&self.0).ok().map(hex::encode)
    }

    /// Short, human-facing fingerprint: the first
    /// [`SHORT_FINGERPRINT_LEN`] hex characters (or fewer, if the hash is
    /// shorter).
    ///
    /// Display only. Never compare short fingerprints to make decisions.
    ///
    /// ```
    /// use parcel_archive::Digest;
    ///
    /// assert_eq!(Digest::of(b"hi").short().as_deref(), Some("49f68a5"));
    /// ```
    pub fn short(&self) -> Option<String> {
        self.to_hex().map(|hex| hex.chars().take(SHORT_FINGERPRINT_LEN).collect())
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl From<String> for Digest {
    fn from(encoded: String) -> Self {
        Self(encoded)
    }
}

impl From<&str> for Digest {
    fn from(encoded: &str) -> Self {
        Self(encoded.to_string())
    }
}

/// Fingerprint everything a reader yields, in a single streaming pass.
pub fn digest_reader<R: Read>(mut reader: R) -> std::io::Result<Digest> {
    let mut hasher = Md5::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(Digest::from_hash(&hasher.finalize()))
}

/// Fingerprint a file on disk without loading it into memory.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn digest_file(path: impl AsRef<Path>) -> Result<Digest> {
    let path = path.as_ref();
    let file = File::open(path).or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
    let digest = digest_reader(BufReader::with_capacity(READ_BUFFER_SIZE, file))
        .or_raise(|| ErrorKind::Io(path.to_path_buf()))?;
    tracing::debug!(%digest, "Computed archive fingerprint");
    Ok(digest)
}
