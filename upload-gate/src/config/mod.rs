//! Configuration values and file-based loading
//!
//! Options are set by name on a [`FileValidator`] or an [`Uploader`], each
//! value an [`OptionValue`]. The same option maps can be loaded from TOML
//! and the environment with [`UploadGateConfig`].
//!
//! # Configuration File Format
//!
//! ```toml
//! # upload-gate.toml
//! [validator]
//! throwExceptionOnValidate = false
//! allowableType = "jpg,png,gif"
//! filenameEncoding = "UTF-8"
//! maxFilesize = "2M"
//! maxWidth = 1920
//! maxHeight = 1080
//!
//! [uploader]
//! moveDirectory = "/var/uploads"
//! moveRetry = 3
//! ```
//!
//! Environment variables override the file, e.g.
//! `UPLOAD_GATE_VALIDATOR__MAXFILESIZE=10M`.
//!
//! [`FileValidator`]: crate::validation::FileValidator
//! [`Uploader`]: crate::uploader::Uploader

use crate::error::{UploaderError, UploaderResult};
use crate::uploader::Uploader;
use crate::validation::{size, FileValidator};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Value of a named option
///
/// Options are loosely typed at the edge; each option accepts a
/// documented set of shapes and rejects the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// `true` / `false`
    Bool(bool),
    /// Non-negative integer
    Int(u64),
    /// Text
    Text(String),
}

impl OptionValue {
    /// Reads a boolean: a bool, an integer (non-zero is true) or a digit string
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidConfiguration` for other shapes
    pub fn to_flag(&self, name: &str) -> UploaderResult<bool> {
        match self {
            Self::Bool(flag) => Ok(*flag),
            Self::Int(n) => Ok(*n != 0),
            Self::Text(text) if is_digits(text) => Ok(text.bytes().any(|b| b != b'0')),
            Self::Text(_) => Err(UploaderError::config(format!(
                "The config parameter \"{name}\" accepts boolean or numeric."
            ))),
        }
    }

    /// Reads a `u32`: an integer or a digit string
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidConfiguration` for other shapes or
    /// values that do not fit
    pub fn to_u32(&self, name: &str) -> UploaderResult<u32> {
        let invalid = || UploaderError::config(format!("The config parameter \"{name}\" accepts numeric."));
        match self {
            Self::Int(n) => u32::try_from(*n).map_err(|_| invalid()),
            Self::Text(text) if is_digits(text) => text.parse().map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }

    /// Reads text
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidConfiguration` for non-text values
    pub fn to_text(&self, name: &str) -> UploaderResult<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            _ => Err(UploaderError::config(format!(
                "The config parameter \"{name}\" only accepts string."
            ))),
        }
    }

    /// Reads a byte size: an integer or `<digits>[KMGTPEZY]`
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidConfiguration` for other shapes
    pub fn to_byte_size(&self, name: &str) -> UploaderResult<String> {
        match self {
            Self::Int(n) => Ok(n.to_string()),
            Self::Text(text) if size::is_byte_size(text) => Ok(text.clone()),
            _ => Err(UploaderError::config(format!(
                "The config parameter \"{name}\" accepts numeric or string."
            ))),
        }
    }
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        Self::Int(u64::from(value))
    }
}

impl From<u64> for OptionValue {
    fn from(value: u64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&Path> for OptionValue {
    fn from(value: &Path) -> Self {
        Self::Text(value.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for OptionValue {
    fn from(value: PathBuf) -> Self {
        Self::from(value.as_path())
    }
}

/// Option maps for the validator and the uploader
///
/// Loaded from TOML and the environment; every entry still goes through
/// `set_option` when the components are built, so a bad value is reported
/// with the option's name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadGateConfig {
    /// Options for [`FileValidator`]
    #[serde(default)]
    pub validator: BTreeMap<String, OptionValue>,

    /// Options for [`Uploader`]
    #[serde(default)]
    pub uploader: BTreeMap<String, OptionValue>,
}

impl UploadGateConfig {
    /// Default configuration file, relative to the working directory
    pub const DEFAULT_PATH: &'static str = "./upload-gate.toml";

    /// Load configuration from `./upload-gate.toml` and the environment
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration file contains invalid TOML syntax
    /// - A value is not a boolean, non-negative integer or string
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use upload_gate::config::UploadGateConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = UploadGateConfig::load()?;
    /// let validator = config.build_validator()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Self::DEFAULT_PATH)
    }

    /// Load configuration from a specific file
    ///
    /// Environment variables prefixed `UPLOAD_GATE_` override the file,
    /// with `__` separating the section from the option name.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration file contains invalid TOML syntax
    /// - A value is not a boolean, non-negative integer or string
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use upload_gate::config::UploadGateConfig;
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let config = UploadGateConfig::load_from("./config/uploads.toml")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config: Self = Figment::new()
            // Load from specified file (if it exists)
            .merge(Toml::file(path.as_ref()))
            // Environment variables override everything (prefix UPLOAD_GATE_, double underscore for nesting)
            .merge(Env::prefixed("UPLOAD_GATE_").split("__").lowercase(true))
            .extract()?;

        Ok(Self {
            validator: normalize(config.validator, &FileValidator::OPTIONS),
            uploader: normalize(config.uploader, &Uploader::OPTIONS),
        })
    }

    /// Builds a validator from the `[validator]` options
    ///
    /// Option names are matched ignoring ASCII case, since environment
    /// keys arrive lowercased.
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidConfiguration` for an unknown option
    /// or a malformed value
    pub fn build_validator(&self) -> UploaderResult<FileValidator> {
        let mut validator = FileValidator::new();
        for (name, value) in &self.validator {
            validator.set_option(canonical(&FileValidator::OPTIONS, name), value.clone())?;
        }
        Ok(validator)
    }

    /// Builds an uploader from the `[uploader]` options
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidConfiguration` for an unknown option
    /// or a malformed value
    pub fn build_uploader(&self) -> UploaderResult<Uploader> {
        let mut uploader = Uploader::new();
        for (name, value) in &self.uploader {
            uploader.set_option(canonical(&Uploader::OPTIONS, name), value.clone())?;
        }
        Ok(uploader)
    }
}

/// Re-keys a merged map by canonical option name
///
/// Environment keys arrive lowercased, and the all-lowercase spelling sorts
/// after every other case variant, so an environment entry replaces the
/// file entry for the same option.
fn normalize(
    options: BTreeMap<String, OptionValue>,
    known: &[&'static str],
) -> BTreeMap<String, OptionValue> {
    options
        .into_iter()
        .map(|(name, value)| (canonical(known, &name).to_string(), value))
        .collect()
}

fn canonical<'a>(known: &[&'static str], name: &'a str) -> &'a str {
    known
        .iter()
        .copied()
        .find(|option| option.eq_ignore_ascii_case(name))
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ReportingMode;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_flag_shapes() {
        assert!(OptionValue::Bool(true).to_flag("x").unwrap());
        assert!(!OptionValue::Int(0).to_flag("x").unwrap());
        assert!(OptionValue::Int(2).to_flag("x").unwrap());
        assert!(OptionValue::from("1").to_flag("x").unwrap());
        assert!(!OptionValue::from("00").to_flag("x").unwrap());
        assert!(OptionValue::from("true").to_flag("x").is_err());
        assert!(OptionValue::from("").to_flag("x").is_err());
    }

    #[test]
    fn test_u32_shapes() {
        assert_eq!(OptionValue::Int(7).to_u32("x").unwrap(), 7);
        assert_eq!(OptionValue::from("42").to_u32("x").unwrap(), 42);
        assert!(OptionValue::from("4294967296").to_u32("x").is_err());
        assert!(OptionValue::from("+1").to_u32("x").is_err());
        assert!(OptionValue::Bool(true).to_u32("x").is_err());
    }

    #[test]
    fn test_byte_size_shapes() {
        assert_eq!(OptionValue::Int(1024).to_byte_size("x").unwrap(), "1024");
        assert_eq!(OptionValue::from("10g").to_byte_size("x").unwrap(), "10g");
        assert!(OptionValue::from("10 GB").to_byte_size("x").is_err());

        let err = OptionValue::Bool(false).to_byte_size("maxFilesize").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: The config parameter \"maxFilesize\" accepts numeric or string."
        );
    }

    #[test]
    fn test_untagged_deserialize() {
        let values: Vec<OptionValue> = serde_json::from_str(r#"[true, 3, "2M"]"#).unwrap();
        assert_eq!(
            values,
            vec![OptionValue::Bool(true), OptionValue::Int(3), OptionValue::from("2M")]
        );
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let config = UploadGateConfig::load_from("/nonexistent/path/upload-gate.toml").unwrap();
        assert!(config.build_validator().is_ok());
        assert!(config.build_uploader().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload-gate.toml");
        fs::write(
            &path,
            r#"
[validator]
throwExceptionOnValidate = false
allowableType = "jpg,png"
maxFilesize = "2M"
maxWidth = 1920

[uploader]
moveDirectory = "/var/uploads"
moveRetry = 3
"#,
        )
        .unwrap();

        let config = UploadGateConfig::load_from(&path).unwrap();
        let validator = config.build_validator().unwrap();
        assert_eq!(validator.config().reporting, ReportingMode::Accumulate);
        assert_eq!(validator.config().max_filesize.as_deref(), Some("2M"));
        assert_eq!(validator.config().max_width, Some(1920));

        let uploader = config.build_uploader().unwrap();
        assert_eq!(uploader.config().move_retry, Some(3));
        assert_eq!(
            uploader.config().move_directory.as_deref(),
            Some(Path::new("/var/uploads"))
        );
    }

    #[test]
    fn test_bad_value_reports_option_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload-gate.toml");
        fs::write(&path, "[validator]\nmaxWidth = \"wide\"\n").unwrap();

        let config = UploadGateConfig::load_from(&path).unwrap();
        let err = config.build_validator().unwrap_err();
        assert!(err.to_string().contains("maxWidth"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload-gate.toml");
        fs::write(&path, "[validator]\nmaxHeight = 100\n").unwrap();

        std::env::set_var("UPLOAD_GATE_VALIDATOR__MAXHEIGHT", "480");
        let config = UploadGateConfig::load_from(&path);
        std::env::remove_var("UPLOAD_GATE_VALIDATOR__MAXHEIGHT");

        let config = config.unwrap();
        assert_eq!(config.validator.len(), 1);
        assert_eq!(config.validator.get("maxHeight"), Some(&OptionValue::Int(480)));
        let validator = config.build_validator().unwrap();
        assert_eq!(validator.config().max_height, Some(480));
    }

    #[test]
    fn test_canonical_names() {
        assert_eq!(canonical(&FileValidator::OPTIONS, "maxfilesize"), "maxFilesize");
        assert_eq!(canonical(&Uploader::OPTIONS, "MOVERETRY"), "moveRetry");
        assert_eq!(canonical(&Uploader::OPTIONS, "bogus"), "bogus");
    }
}
