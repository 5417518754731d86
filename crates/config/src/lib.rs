//! Layered configuration.
//!
//! Values are merged from, lowest precedence first:
//!
//! 1. built-in defaults,
//! 2. `config.toml` in the platform configuration directory
//!    (`~/.config/parcel/config.toml` on Linux),
//! 3. an explicit configuration file (TOML, or YAML by extension),
//! 4. `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`,
//! 5. `PARCEL_*` environment variables (`PARCEL_BUCKET`, `PARCEL_KEY_ID`, ...),
//! 6. command-line [`Overrides`].

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml, Yaml};
pub use parcel_compress::Compression;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

pub const DEFAULT_ENDPOINT: &str = "https://s3.wasabisys.com";
pub const DEFAULT_REGION: &str = "us-east-1";
const ENV_PREFIX: &str = "PARCEL_";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Resolved configuration.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Bucket to sync with. Required by every command.
    pub bucket: Option<String>,
    /// Key prefix inside the bucket.
    pub prefix: Option<String>,
    /// S3-compatible endpoint URL.
    pub endpoint: String,
    pub region: String,
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    /// Where archives are written. Defaults to the working directory.
    pub archive_dir: Option<PathBuf>,
    pub compression: Compression,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            region: DEFAULT_REGION.to_string(),
            key_id: None,
            key_secret: None,
            archive_dir: None,
            compression: Compression::Gzip,
        }
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Config")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("key_id", &self.key_id)
            .field("key_secret", &self.key_secret.as_ref().map(|_| "<redacted>"))
            .field("archive_dir", &self.archive_dir)
            .field("compression", &self.compression)
            .finish()
    }
}

impl Config {
    pub fn bucket(&self) -> Result<&str> {
        non_empty(&self.bucket).ok_or_raise(|| ErrorKind::Missing("bucket"))
    }

    /// Access key ID and secret, both required for the S3 backend.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let key_id = non_empty(&self.key_id).ok_or_raise(|| ErrorKind::Missing("key_id"))?;
        let key_secret = non_empty(&self.key_secret).ok_or_raise(|| ErrorKind::Missing("key_secret"))?;
        Ok((key_id, key_secret))
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.archive_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.trim().is_empty())
}

/// Values given on the command line. `None` leaves lower layers untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
}

/// Path of the per-user configuration file, if the platform has one.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "parcel").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Builds a [`Config`] from every source.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    user_config: bool,
    overrides: Overrides,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            file: None,
            user_config: true,
            overrides: Overrides::default(),
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an explicit configuration file. Unlike the per-user file, it
    /// must exist.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Skip the per-user configuration file.
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    pub fn overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// The merged provider stack, for callers that want to inspect it.
    pub fn figment(&self) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if self.user_config
            && let Some(path) = user_config_path()
        {
            tracing::trace!(path = %path.display(), "Merging user configuration file");
            figment = figment.merge(Toml::file(path));
        }
        if let Some(path) = &self.file {
            figment = figment.merge(file_provider(path)?);
        }
        Ok(figment
            .merge(Env::raw().only(&["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"]).map(|key| {
                match key.as_str().eq_ignore_ascii_case("AWS_ACCESS_KEY_ID") {
                    true => "key_id".into(),
                    false => "key_secret".into(),
                }
            }))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(&self.overrides)))
    }

    pub fn load(&self) -> Result<Config> {
        let config: Config = self.figment()?.extract().or_raise(|| ErrorKind::Invalid)?;
        tracing::debug!(?config, "Loaded configuration");
        Ok(config)
    }
}

fn file_provider(path: &Path) -> Result<Figment> {
    if !path.is_file() {
        exn::bail!(ErrorKind::FileNotFound(path.to_path_buf()));
    }
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("yaml" | "yml") => Figment::from(Yaml::file(path)),
        _ => Figment::from(Toml::file(path)),
    })
}
