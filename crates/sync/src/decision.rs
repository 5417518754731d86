//! The skip-or-upload decision.

use crate::remote::RemoteObject;
use derive_more::Display;
use parcel_archive::Digest;

/// Why an upload is needed.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum UploadReason {
    #[display("remote archive is missing")]
    Missing,
    #[display("remote archive has no stored digest")]
    Untagged,
    #[display("remote archive digest differs")]
    Mismatch,
}

/// Outcome of comparing a local archive against the bucket.
///
/// Mismatches always resolve to an upload; there is no conflict outcome.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Decision {
    #[display("up to date")]
    Skip,
    #[display("upload ({_0})")]
    Upload(UploadReason),
}

impl Decision {
    pub fn needs_upload(&self) -> bool {
        matches!(self, Self::Upload(_))
    }
}

/// Decide whether `local` needs uploading, given what the bucket holds.
///
/// Only an existing object whose stored digest is exactly equal to the local
/// one is skipped. No I/O.
pub fn decide(local: &Digest, remote: &RemoteObject) -> Decision {
    if !remote.exists {
        return Decision::Upload(UploadReason::Missing);
    }
    match &remote.stored_digest {
        None => Decision::Upload(UploadReason::Untagged),
        Some(stored) if stored != local => Decision::Upload(UploadReason::Mismatch),
        Some(_) => Decision::Skip,
    }
}
