//! Streaming Compression Operations

use crate::Compression;
use crate::error::{ErrorKind, Result};
use bzip2::{Compression as BzCompression, read::BzDecoder, write::BzEncoder};
use exn::ResultExt;
use flate2::{Compression as GzCompression, read::GzDecoder, write::GzEncoder};
use std::io::{Read, Result as IoResult, Write};
use tracing::instrument;
#[cfg(feature = "zstd")]
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

// Highest level each format offers.
const BZIP2_LEVEL: BzCompression = BzCompression::best();
const GZIP_LEVEL: GzCompression = GzCompression::best();
#[cfg(feature = "zstd")]
const ZSTD_LEVEL: i32 = 19;

/// A compressing [`Write`]r returned by [`Compression::wrap_writer`].
///
/// Every format writes a trailer when the stream ends. Dropping an encoder
/// would either skip the trailer or silently discard its write errors, so
/// callers must end the stream with [`finish`](Self::finish).
pub enum Encoder<W: Write> {
    None(W),
    Bzip2(BzEncoder<W>),
    Gzip(GzEncoder<W>),
    #[cfg(feature = "zstd")]
    Zstd(ZstdEncoder<'static, W>),
}

impl<W: Write> Encoder<W> {
    /// Write the format trailer, flush, and hand back the inner writer.
    #[instrument(skip(self), fields(format = %self.format()))]
    pub fn finish(self) -> Result<W> {
        let mut inner = match self {
            Encoder::None(writer) => writer,
            Encoder::Bzip2(encoder) => encoder.finish().or_raise(|| ErrorKind::Io)?,
            Encoder::Gzip(encoder) => encoder.finish().or_raise(|| ErrorKind::Io)?,
            #[cfg(feature = "zstd")]
            Encoder::Zstd(encoder) => encoder.finish().or_raise(|| ErrorKind::Io)?,
        };
        inner.flush().or_raise(|| ErrorKind::Io)?;
        Ok(inner)
    }

    /// The compression format this encoder produces.
    pub fn format(&self) -> Compression {
        match self {
            Encoder::None(_) => Compression::None,
            Encoder::Bzip2(_) => Compression::Bzip2,
            Encoder::Gzip(_) => Compression::Gzip,
            #[cfg(feature = "zstd")]
            Encoder::Zstd(_) => Compression::Zstd,
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        match self {
            Encoder::None(writer) => writer.write(buf),
            Encoder::Bzip2(encoder) => encoder.write(buf),
            Encoder::Gzip(encoder) => encoder.write(buf),
            #[cfg(feature = "zstd")]
            Encoder::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> IoResult<()> {
        match self {
            Encoder::None(writer) => writer.flush(),
            Encoder::Bzip2(encoder) => encoder.flush(),
            Encoder::Gzip(encoder) => encoder.flush(),
            #[cfg(feature = "zstd")]
            Encoder::Zstd(encoder) => encoder.flush(),
        }
    }
}

impl Compression {
    /// Wrap a writer with the appropriate compression layer.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::Write;
    /// use parcel_compress::Compression;
    ///
    /// let mut encoder = Compression::Gzip.wrap_writer(Vec::new()).unwrap();
    /// encoder.write_all(b"Hello, world!").unwrap();
    /// let compressed = encoder.finish().unwrap();
    /// assert!(compressed.starts_with(&[0x1F, 0x8B]));
    /// ```
    pub fn wrap_writer<W: Write>(&self, writer: W) -> Result<Encoder<W>> {
        Ok(match self {
            Compression::None => Encoder::None(writer),
            Compression::Bzip2 => Encoder::Bzip2(BzEncoder::new(writer, BZIP2_LEVEL)),
            Compression::Gzip => Encoder::Gzip(GzEncoder::new(writer, GZIP_LEVEL)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Encoder::Zstd(ZstdEncoder::new(writer, ZSTD_LEVEL).or_raise(|| ErrorKind::Encoder)?),
        })
    }

    /// Wrap a reader with the appropriate decompression layer.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::{Cursor, Read, Write};
    /// use parcel_compress::Compression;
    ///
    /// let mut encoder = Compression::Bzip2.wrap_writer(Vec::new()).unwrap();
    /// encoder.write_all(b"Hello, world!").unwrap();
    /// let compressed = encoder.finish().unwrap();
    ///
    /// let mut reader = Compression::Bzip2.wrap_reader(Cursor::new(compressed)).unwrap();
    /// let mut decompressed = Vec::new();
    /// reader.read_to_end(&mut decompressed).unwrap();
    /// assert_eq!(decompressed, b"Hello, world!");
    /// ```
    pub fn wrap_reader<'a, R: Read + 'a>(&self, reader: R) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => Box::new(reader),
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Box::new(ZstdDecoder::new(reader).or_raise(|| ErrorKind::Encoder)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use rstest::rstest;
    use std::io::{Cursor, Read, Write};

    fn encode(format: Compression, data: &[u8]) -> Vec<u8> {
        let mut encoder = format.wrap_writer(Vec::new()).expect("encoder to initialize");
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Bzip2)]
    #[case(Compression::Gzip)]
    #[cfg_attr(feature = "zstd", case(Compression::Zstd))]
    fn test_finish_then_decode(#[case] format: Compression) {
        let original = b"a tar stream would normally go here, but any bytes will do";
        let compressed = encode(format, original);
        let mut reader = format.wrap_reader(Cursor::new(compressed)).expect("decoder to initialize");
        let mut decompressed = Vec::new();
        reader.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Bzip2)]
    #[case(Compression::Gzip)]
    #[cfg_attr(feature = "zstd", case(Compression::Zstd))]
    fn test_output_is_deterministic(#[case] format: Compression) {
        let data = b"same input, same output, every time";
        assert_eq!(encode(format, data), encode(format, data));
    }

    #[test]
    fn test_encoder_reports_format() {
        let encoder = Compression::Bzip2.wrap_writer(Vec::new()).unwrap();
        assert_eq!(encoder.format(), Compression::Bzip2);
    }

    #[rstest]
    #[case(Compression::Bzip2)]
    #[case(Compression::Gzip)]
    fn test_invalid_compressed_data(#[case] format: Compression) {
        let mut reader = format.wrap_reader(Cursor::new(b"This is not compressed data".to_vec())).unwrap();
        let mut output = Vec::new();
        assert!(reader.read_to_end(&mut output).is_err());
    }
}
