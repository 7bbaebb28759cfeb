//! Upload validation pipeline
//!
//! A [`FileValidator`] holds a configuration and a set of recorded failures.
//! It exposes one check per rule; each check decides from the configuration
//! whether it applies, runs the rule, and reports the outcome as a
//! [`Verdict`]:
//!
//! | Rule | Applies when | Diagnostic |
//! |---|---|---|
//! | upload error | always | flag |
//! | filename | `filenameEncoding` set, client filename present | filename |
//! | filesize | `maxFilesize` set, size known and non-zero | size in bytes |
//! | extension | `allowableType` set, client extension present | extension |
//! | image type | file is an image | detected type |
//! | image size | file is an image, `maxWidth` or `maxHeight` set | pixels |
//!
//! # Reporting modes
//!
//! In [`ReportingMode::Throw`] (the default) a violation is returned as the
//! rule's [`UploaderError`]. In [`ReportingMode::Accumulate`] it is recorded
//! and the check returns [`Verdict::Failed`]. Both modes record the failure
//! before reporting it, and configuration or argument errors are returned in
//! both modes.
//!
//! # Examples
//!
//! ```rust
//! use upload_gate::error::Rule;
//! use upload_gate::file::MemoryFile;
//! use upload_gate::validation::{FileValidator, Verdict};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut validator = FileValidator::new();
//! validator
//!     .set_option("throwExceptionOnValidate", false)?
//!     .set_option("allowableType", "jpg,png")?;
//!
//! let file = MemoryFile::new("setup.exe", "application/octet-stream", b"MZ".to_vec());
//! assert_eq!(validator.validate_extension(&file)?, Verdict::Failed);
//! assert!(validator.has_error_for(Rule::Extension));
//! # Ok(())
//! # }
//! ```

mod capabilities;
mod errors;
pub mod image_type;
pub mod size;

pub use capabilities::Capabilities;
pub use errors::{ErrorValue, ValidationErrors};
pub use image_type::{ImageInfo, ImageType};
pub use size::{parse_bytes, ByteCount, ByteSizeError, Precision};

use crate::config::OptionValue;
use crate::error::{Rule, UploaderError, UploaderResult};
use crate::file::{TransportError, UploadedFile};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// How a violated rule is reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportingMode {
    /// Return the rule's error from the first violated check
    #[default]
    Throw,
    /// Record the failure and return [`Verdict::Failed`]
    Accumulate,
}

impl ReportingMode {
    /// Maps the `throwExceptionOnValidate` flag
    #[must_use]
    pub const fn from_flag(throw: bool) -> Self {
        if throw {
            Self::Throw
        } else {
            Self::Accumulate
        }
    }

    const fn is_throw(self) -> bool {
        matches!(self, Self::Throw)
    }
}

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The rule is satisfied
    Passed,
    /// The rule failed and was recorded (accumulate mode only)
    Failed,
    /// The rule is not configured or does not apply to this file
    NotApplicable,
}

/// Validator settings
///
/// [`FileValidator::set_option`] checks the shape of every value it
/// stores here. Fields set directly are checked lazily, when the rule that
/// reads them runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// `throwExceptionOnValidate`
    pub reporting: ReportingMode,
    /// `allowableType`: comma-separated extension allow-list
    pub allowable_type: Option<String>,
    /// `filenameEncoding`: required encoding of the client filename
    pub filename_encoding: Option<String>,
    /// `maxWidth`: `0` enforces no ceiling
    pub max_width: Option<u32>,
    /// `maxHeight`: `0` enforces no ceiling
    pub max_height: Option<u32>,
    /// `maxFilesize`: byte count, optionally with a unit suffix
    pub max_filesize: Option<String>,
    /// `uploadMaxFilesize`: the transport's own ceiling, for messages
    pub upload_max_filesize: Option<String>,
    /// `enableGmp`, `enableBcmath`, `enableExif`
    pub capabilities: Capabilities,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self::with_capabilities(Capabilities::detect())
    }
}

impl ValidatorConfig {
    /// Default settings over the given capabilities
    #[must_use]
    pub const fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            reporting: ReportingMode::Throw,
            allowable_type: None,
            filename_encoding: None,
            max_width: None,
            max_height: None,
            max_filesize: None,
            upload_max_filesize: None,
            capabilities,
        }
    }
}

/// Runs the validation rules against uploaded files
#[derive(Debug, Clone, Default)]
pub struct FileValidator {
    config: ValidatorConfig,
    errors: ValidationErrors,
}

impl FileValidator {
    /// Option names accepted by [`FileValidator::set_option`]
    pub const OPTIONS: [&'static str; 10] = [
        "enableGmp",
        "enableBcmath",
        "enableExif",
        "throwExceptionOnValidate",
        "allowableType",
        "filenameEncoding",
        "maxWidth",
        "maxHeight",
        "maxFilesize",
        "uploadMaxFilesize",
    ];

    /// Creates a validator with every capability the build provides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator over an explicit capability descriptor
    #[must_use]
    pub const fn with_capabilities(capabilities: Capabilities) -> Self {
        Self::with_config(ValidatorConfig::with_capabilities(capabilities))
    }

    /// Creates a validator from prepared settings
    #[must_use]
    pub const fn with_config(config: ValidatorConfig) -> Self {
        Self {
            config,
            errors: ValidationErrors::new(),
        }
    }

    /// Creates a validator and applies each option in turn
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidConfiguration` for the first unknown
    /// option or malformed value
    ///
    /// # Examples
    ///
    /// ```rust
    /// use upload_gate::validation::FileValidator;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let validator = FileValidator::from_options([
    ///     ("maxFilesize", "2M".into()),
    ///     ("maxWidth", 1920_u32.into()),
    /// ])?;
    /// assert_eq!(validator.config().max_width, Some(1920));
    ///
    /// assert!(FileValidator::from_options([("maxSize", 1_u32.into())]).is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_options<I, K>(options: I) -> UploaderResult<Self>
    where
        I: IntoIterator<Item = (K, OptionValue)>,
        K: AsRef<str>,
    {
        let mut validator = Self::new();
        for (name, value) in options {
            validator.set_option(name.as_ref(), value)?;
        }
        Ok(validator)
    }

    /// Current settings
    #[must_use]
    pub const fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Sets one option, checking the shape of its value
    ///
    /// Boolean options accept booleans, integers and digit strings; pixel
    /// ceilings accept integers and digit strings; `maxFilesize` accepts an
    /// integer or `<digits>[KMGTPEZY]`.
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidConfiguration` if the name is unknown,
    /// the value has the wrong shape, or a capability is enabled that this
    /// build does not provide
    pub fn set_option(
        &mut self,
        name: &str,
        value: impl Into<OptionValue>,
    ) -> UploaderResult<&mut Self> {
        let value = value.into();
        let available = Capabilities::detect();
        let config = &mut self.config;
        match name {
            "enableGmp" => {
                config.capabilities.big_integer = require(name, value.to_flag(name)?, available.big_integer)?;
            }
            "enableBcmath" => {
                config.capabilities.big_decimal = require(name, value.to_flag(name)?, available.big_decimal)?;
            }
            "enableExif" => {
                config.capabilities.signature_detection =
                    require(name, value.to_flag(name)?, available.signature_detection)?;
            }
            "throwExceptionOnValidate" => {
                config.reporting = ReportingMode::from_flag(value.to_flag(name)?);
            }
            "allowableType" => config.allowable_type = Some(value.to_text(name)?),
            "filenameEncoding" => {
                let label = value.to_text(name)?;
                FilenameEncoding::resolve(&label)?;
                config.filename_encoding = Some(label);
            }
            "maxWidth" => config.max_width = Some(value.to_u32(name)?),
            "maxHeight" => config.max_height = Some(value.to_u32(name)?),
            "maxFilesize" => config.max_filesize = Some(value.to_byte_size(name)?),
            "uploadMaxFilesize" => config.upload_max_filesize = Some(value.to_byte_size(name)?),
            _ => {
                return Err(UploaderError::config(format!(
                    "The config parameter \"{name}\" is not defined."
                )))
            }
        }
        debug!(option = name, value = %value, "Validator option set");
        Ok(self)
    }

    /// Returns the current value of an option, `None` when unset
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidConfiguration` if the name is unknown
    pub fn get_option(&self, name: &str) -> UploaderResult<Option<OptionValue>> {
        let config = &self.config;
        let value = match name {
            "enableGmp" => Some(config.capabilities.big_integer.into()),
            "enableBcmath" => Some(config.capabilities.big_decimal.into()),
            "enableExif" => Some(config.capabilities.signature_detection.into()),
            "throwExceptionOnValidate" => Some(config.reporting.is_throw().into()),
            "allowableType" => config.allowable_type.clone().map(Into::into),
            "filenameEncoding" => config.filename_encoding.clone().map(Into::into),
            "maxWidth" => config.max_width.map(Into::into),
            "maxHeight" => config.max_height.map(Into::into),
            "maxFilesize" => config.max_filesize.clone().map(Into::into),
            "uploadMaxFilesize" => config.upload_max_filesize.clone().map(Into::into),
            _ => {
                return Err(UploaderError::config(format!(
                    "The config parameter \"{name}\" is not defined."
                )))
            }
        };
        Ok(value)
    }

    /// Returns true if any rule has failed
    #[must_use]
    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns true if `rule` has failed
    #[must_use]
    pub fn has_error_for(&self, rule: Rule) -> bool {
        self.errors.contains(rule)
    }

    /// Recorded failures
    #[must_use]
    pub const fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Forgets all recorded failures
    pub fn clear_errors(&mut self) -> &mut Self {
        self.errors.clear();
        self
    }

    /// Checks the status reported by the transport
    ///
    /// Always applies. `NoFile` fails the `notFound` rule, the two size
    /// statuses fail the `filesize` rule, and any other failure fails the
    /// `uploader` rule.
    ///
    /// # Errors
    ///
    /// In throw mode, returns `UploaderError::NotFound`,
    /// `UploaderError::Filesize` or `UploaderError::Uploader`
    pub fn validate_upload_error(&mut self, file: &dyn UploadedFile) -> UploaderResult<Verdict> {
        let status = file.transport_error();
        let error = match status {
            TransportError::Ok => return passed(Rule::Uploader),
            TransportError::NoFile => UploaderError::NotFound,
            TransportError::IniSize => UploaderError::Filesize {
                size: None,
                limit: format!(
                    "upload_max_filesize:{}",
                    self.config.upload_max_filesize.as_deref().unwrap_or("unknown")
                ),
            },
            TransportError::FormSize => UploaderError::Filesize {
                size: None,
                limit: "requested MAX_FILE_SIZE".to_string(),
            },
            other => UploaderError::Uploader(format!(
                "The uploaded file is invalid for some reasons: {other}."
            )),
        };
        self.reject(ErrorValue::Flag, error)
    }

    /// Checks that the client filename is valid in `filenameEncoding`
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidConfiguration` for an unknown encoding
    /// label; in throw mode, returns `UploaderError::Filename` for invalid bytes
    pub fn validate_filename(&mut self, file: &dyn UploadedFile) -> UploaderResult<Verdict> {
        let Some(label) = self.config.filename_encoding.clone() else {
            return not_applicable(Rule::Filename, "filenameEncoding not configured");
        };
        let Some(filename) = file.client_filename().filter(|name| !name.is_empty()) else {
            return not_applicable(Rule::Filename, "no client filename");
        };
        let encoding = FilenameEncoding::resolve(&label)?;
        if encoding.is_valid(&filename) {
            return passed(Rule::Filename);
        }
        let display = encoding.decode_lossy(&filename);
        self.reject(
            ErrorValue::Text(display.clone()),
            UploaderError::Filename {
                filename: display,
                encoding: label,
            },
        )
    }

    /// Checks the reported size against `maxFilesize`, inclusively
    ///
    /// The ceiling is resolved when the rule runs, with the most precise
    /// arithmetic the capabilities allow. A negative reported size is
    /// reinterpreted as unsigned; an unknown or zero size makes the rule
    /// not applicable.
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidConfiguration` if the ceiling is
    /// malformed or out of range for the arithmetic in use; in throw mode,
    /// returns `UploaderError::Filesize` when the size exceeds it
    pub fn validate_filesize(&mut self, file: &dyn UploadedFile) -> UploaderResult<Verdict> {
        let Some(limit) = self.config.max_filesize.clone() else {
            return not_applicable(Rule::Filesize, "maxFilesize not configured");
        };
        let precision = Precision::select(&self.config.capabilities);
        let ceiling = parse_bytes(&limit, precision).map_err(|e| {
            UploaderError::config(format!("The maxFilesize \"{limit}\" is invalid format: {e}"))
        })?;

        let size = match file.size() {
            None | Some(0) => return not_applicable(Rule::Filesize, "size unknown"),
            Some(reported) => unsigned_size(reported),
        };
        let ordering = precision
            .compare(&ByteCount::from(size), &ceiling)
            .map_err(|e| UploaderError::config(format!("The maxFilesize \"{limit}\" cannot be compared: {e}")))?;
        if ordering != Ordering::Greater {
            return passed(Rule::Filesize);
        }
        self.reject(
            ErrorValue::Bytes(size),
            UploaderError::Filesize {
                size: Some(size),
                limit,
            },
        )
    }

    /// Checks the client extension against `allowableType`
    ///
    /// Matching ignores ASCII case, and `jpeg` and `jpg` satisfy each other.
    ///
    /// # Errors
    ///
    /// In throw mode, returns `UploaderError::Extension` if the extension is
    /// not allowed
    pub fn validate_extension(&mut self, file: &dyn UploadedFile) -> UploaderResult<Verdict> {
        let Some(allowable) = self.config.allowable_type.clone() else {
            return not_applicable(Rule::Extension, "allowableType not configured");
        };
        let Some(extension) = file.client_extension().filter(|ext| !ext.is_empty()) else {
            return not_applicable(Rule::Extension, "no client extension");
        };
        if allowable
            .split(',')
            .any(|allowed| same_extension(&extension, allowed.trim()))
        {
            return passed(Rule::Extension);
        }
        self.reject(
            ErrorValue::Text(extension.clone()),
            UploaderError::Extension { extension },
        )
    }

    /// Checks that extension and MIME type agree with the image content
    ///
    /// The type is taken from the file signature when `enableExif` is on,
    /// read from the path or, without one, from the content. Otherwise the
    /// dimension probe decides. A failed detection counts as a mismatch.
    ///
    /// # Errors
    ///
    /// In throw mode, returns `UploaderError::ImageType` on a mismatch
    pub fn validate_image_type(&mut self, file: &dyn UploadedFile) -> UploaderResult<Verdict> {
        if !file.is_image() {
            return not_applicable(Rule::ImageType, "not an image");
        }
        let extension = file.client_extension().unwrap_or_default();
        let mime_type = file.mime_type().unwrap_or_default();
        let detected = self.detect_image_type(file);

        let agrees = detected.is_some_and(|kind| {
            same_extension(&extension, kind.extension()) && mime_type.eq_ignore_ascii_case(kind.mime_type())
        });
        if agrees {
            return passed(Rule::ImageType);
        }
        self.reject(
            ErrorValue::ImageType(detected),
            UploaderError::ImageType {
                extension,
                detected,
            },
        )
    }

    /// Checks image dimensions against `maxWidth` and `maxHeight`
    ///
    /// Width is checked first. In throw mode a width violation is returned
    /// without looking at the height; in accumulate mode both are recorded.
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidArgument` if the image cannot be
    /// probed; in throw mode, returns `UploaderError::ImageWidth` or
    /// `UploaderError::ImageHeight`
    pub fn validate_image_size(&mut self, file: &dyn UploadedFile) -> UploaderResult<Verdict> {
        if !file.is_image() {
            return not_applicable(Rule::ImageWidth, "not an image");
        }
        let (max_width, max_height) = (self.config.max_width, self.config.max_height);
        if max_width.is_none() && max_height.is_none() {
            return not_applicable(Rule::ImageWidth, "maxWidth and maxHeight not configured");
        }
        let info = image_type::probe(file)?;

        let mut verdict = Verdict::Passed;
        if let Some(limit) = max_width.filter(|limit| *limit > 0 && info.width > *limit) {
            verdict = self.reject(
                ErrorValue::Pixels(info.width),
                UploaderError::ImageWidth {
                    width: info.width,
                    limit,
                },
            )?;
        }
        if let Some(limit) = max_height.filter(|limit| *limit > 0 && info.height > *limit) {
            verdict = self.reject(
                ErrorValue::Pixels(info.height),
                UploaderError::ImageHeight {
                    height: info.height,
                    limit,
                },
            )?;
        }
        if verdict == Verdict::Passed {
            debug!(width = info.width, height = info.height, "Rule passed: image size");
        }
        Ok(verdict)
    }

    fn detect_image_type(&self, file: &dyn UploadedFile) -> Option<ImageType> {
        if self.config.capabilities.signature_detection {
            return match file.path() {
                Some(path) => image_type::detect_signature(&path),
                None => file
                    .content()
                    .ok()
                    .and_then(|data| image_type::detect_signature_bytes(&data)),
            };
        }
        image_type::probe(file).ok().and_then(|info| info.image_type)
    }

    /// Records a violation, then reports it according to the mode
    fn reject(&mut self, value: ErrorValue, error: UploaderError) -> UploaderResult<Verdict> {
        let Some(rule) = error.rule() else {
            return Err(error);
        };
        warn!(rule = %rule, value = %value, "Upload rejected: {error}");
        self.errors.insert(rule, value);
        if self.config.reporting.is_throw() {
            Err(error)
        } else {
            Ok(Verdict::Failed)
        }
    }
}

fn passed(rule: Rule) -> UploaderResult<Verdict> {
    debug!(rule = %rule, "Rule passed");
    Ok(Verdict::Passed)
}

fn not_applicable(rule: Rule, reason: &str) -> UploaderResult<Verdict> {
    debug!(rule = %rule, reason, "Rule not applicable");
    Ok(Verdict::NotApplicable)
}

fn require(name: &str, enabled: bool, available: bool) -> UploaderResult<bool> {
    if enabled && !available {
        return Err(UploaderError::config(format!(
            "The config parameter \"{name}\" cannot be enabled: not available in this build."
        )));
    }
    Ok(enabled)
}

fn is_jpeg(extension: &str) -> bool {
    extension.eq_ignore_ascii_case("jpeg") || extension.eq_ignore_ascii_case("jpg")
}

fn same_extension(extension: &str, expected: &str) -> bool {
    if is_jpeg(expected) {
        is_jpeg(extension)
    } else {
        extension.eq_ignore_ascii_case(expected)
    }
}

/// Reinterprets a negative reported size as its unsigned magnitude
///
/// Values that fit in 32 bits are taken as a wrapped 32-bit size.
fn unsigned_size(size: i64) -> u64 {
    if size >= 0 {
        return size.cast_unsigned();
    }
    i32::try_from(size).map_or_else(
        |_| size.cast_unsigned(),
        |wrapped| u64::from(wrapped.cast_unsigned()),
    )
}

/// Encoding a client filename must be valid in
enum FilenameEncoding {
    Ascii,
    Whatwg(&'static Encoding),
}

impl FilenameEncoding {
    fn resolve(label: &str) -> UploaderResult<Self> {
        if label.eq_ignore_ascii_case("ascii") || label.eq_ignore_ascii_case("us-ascii") {
            return Ok(Self::Ascii);
        }
        Encoding::for_label(label.trim().as_bytes())
            .map(Self::Whatwg)
            .ok_or_else(|| {
                UploaderError::config(format!(
                    "The config parameter \"filenameEncoding\" is not a known encoding: {label}"
                ))
            })
    }

    fn is_valid(&self, bytes: &[u8]) -> bool {
        match self {
            Self::Ascii => bytes.is_ascii(),
            Self::Whatwg(encoding) => encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .is_some(),
        }
    }

    fn decode_lossy(&self, bytes: &[u8]) -> String {
        match self {
            Self::Ascii => String::from_utf8_lossy(bytes).into_owned(),
            Self::Whatwg(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
        }
    }
}
