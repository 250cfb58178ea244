//! Configuration file parsing.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// On-disk representation of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.yaml` or `.yml`
    Yaml,
    /// `.toml`
    Toml,
    /// `.json`
    Json,
}

impl ConfigFormat {
    /// Picks the format for a path from its extension.
    ///
    /// # Errors
    ///
    /// Returns an error when the extension is absent or not one this
    /// service knows how to parse.
    pub fn detect(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            Some(other) => Err(ConfigError::InvalidFormat {
                path: path.display().to_string(),
                reason: format!("unsupported config extension `.{other}`"),
            }),
            None => Err(ConfigError::InvalidFormat {
                path: path.display().to_string(),
                reason: "config file has no extension".to_string(),
            }),
        }
    }

    /// Deserialises inline content in this format.
    ///
    /// # Errors
    ///
    /// Returns an error when the content does not parse.
    pub fn parse<T>(self, source: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
    {
        let fail = |reason: String| ConfigError::InvalidFormat {
            path: "<inline>".to_string(),
            reason,
        };
        match self {
            Self::Yaml => serde_yaml::from_str(source).map_err(|e| fail(format!("yaml: {e}"))),
            Self::Toml => toml::from_str(source).map_err(|e| fail(format!("toml: {e}"))),
            Self::Json => serde_json::from_str(source).map_err(|e| fail(format!("json: {e}"))),
        }
    }
}

/// Reads and deserialises a configuration file.
///
/// # Errors
///
/// Returns an error when the extension is unknown, the file cannot be
/// read, or the content does not parse.
pub fn from_file<T, P>(path: P) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let format = ConfigFormat::detect(path)?;
    let source = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    format.parse(&source)
}
