use crate::Compression;
use std::fmt::{Display, Formatter, Result as FmtResult};

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for Compression {
    fn as_ref(&self) -> &'static str {
        self.as_str()
    }
}

impl Compression {
    /// Returns the file extension for this compression format.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Bzip2 => ".bz2",
            Compression::Gzip => ".gz",
            #[cfg(feature = "zstd")]
            Compression::Zstd => ".zst",
        }
    }

    /// Returns the full suffix of a tar archive compressed with this format,
    /// e.g. `.tar.gz`.
    #[inline]
    #[must_use]
    pub fn archive_suffix(&self) -> String {
        format!(".tar{}", self.extension())
    }

    /// Returns the short name for configuration (for displaying to user)
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Bzip2 => "bzip2",
            Compression::Gzip => "gzip",
            #[cfg(feature = "zstd")]
            Compression::Zstd => "zstd",
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Compression {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(|err: crate::error::Error| serde::de::Error::custom(&*err))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Compression {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use rstest::rstest;

    #[rstest]
    #[case(Compression::None, "", ".tar")]
    #[case(Compression::Bzip2, ".bz2", ".tar.bz2")]
    #[case(Compression::Gzip, ".gz", ".tar.gz")]
    #[cfg_attr(feature = "zstd", case(Compression::Zstd, ".zst", ".tar.zst"))]
    fn test_extension(#[case] format: Compression, #[case] extension: &str, #[case] suffix: &str) {
        assert_eq!(format.extension(), extension);
        assert_eq!(format.archive_suffix(), suffix);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize() {
        use serde::Deserialize;
        use serde::de::IntoDeserializer;
        use serde::de::value::{Error as ValueError, StrDeserializer};

        let deserializer: StrDeserializer<'_, ValueError> = "GZ".into_deserializer();
        assert_eq!(Compression::deserialize(deserializer).unwrap(), Compression::Gzip);
        let deserializer: StrDeserializer<'_, ValueError> = "rar".into_deserializer();
        assert!(Compression::deserialize(deserializer).is_err());
    }
}
