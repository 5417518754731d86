//! Compression layer for parcel archives.
//!
//! Archives are written as a plain tar stream wrapped in a single compression
//! layer (archive-then-compress, never per-entry). This crate owns that outer
//! layer:
//!
//! - **Naming** via [`Compression::extension`] and [`Compression::archive_suffix`]
//! - **Parsing** from configuration strings ([`FromStr`](std::str::FromStr))
//! - **Streaming** encoders with an explicit [`Encoder::finish`] so trailer
//!   write errors are never swallowed on drop, and boxed decoders for reading
//!   archives back.
//!
//! Gzip and Bzip2 are always available. Zstd is behind the `zstd` feature.
//! Encoders never embed timestamps or file names, so the same input always
//! compresses to the same bytes.

mod construct;
pub mod error;
mod ops;
mod util;

pub use crate::ops::Encoder;

/// A supported compression format.
///
/// Defaults to [`None`](Self::None) (uncompressed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Bzip2 compression (.bz2)
    Bzip2,
    /// Gzip compression (.gz)
    Gzip,
    /// Zstd compression (.zst)
    #[cfg(feature = "zstd")]
    Zstd,
}
