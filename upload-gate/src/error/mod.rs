//! Error types and error handling
//!
//! Every check in the validation pipeline that rejects a file does so with one
//! of the rule-specific variants of [`UploaderError`]. Configuration and
//! environment problems use the variants that carry no [`Rule`]; those are
//! always raised, whatever reporting mode the validator is in.

use crate::validation::ImageType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Name of a validation rule, used as the key of recorded errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Rule {
    /// The transport reported a failure that the client cannot fix
    Uploader,
    /// No file was uploaded
    NotFound,
    /// The client filename is not valid text in the configured encoding
    Filename,
    /// The file is larger than a configured or transport ceiling
    Filesize,
    /// The client extension is not in the allow-list
    Extension,
    /// The image content disagrees with its extension or MIME type
    ImageType,
    /// The image is wider than `maxWidth`
    ImageWidth,
    /// The image is taller than `maxHeight`
    ImageHeight,
}

impl Rule {
    /// All rules, in pipeline order
    pub const ALL: [Self; 8] = [
        Self::Uploader,
        Self::NotFound,
        Self::Filename,
        Self::Filesize,
        Self::Extension,
        Self::ImageType,
        Self::ImageWidth,
        Self::ImageHeight,
    ];

    /// Returns the rule name as used in error maps
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uploader => "uploader",
            Self::NotFound => "notFound",
            Self::Filesize => "filesize",
            Self::Filename => "filename",
            Self::Extension => "extension",
            Self::ImageType => "imageType",
            Self::ImageWidth => "imageWidth",
            Self::ImageHeight => "imageHeight",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rule {
    type Err = UploaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rule| rule.as_str() == s)
            .ok_or_else(|| UploaderError::InvalidArgument(format!("Unknown validation rule \"{s}\"")))
    }
}

/// Errors raised by the validator, the uploader and the file adapters
#[derive(Debug, Error)]
pub enum UploaderError {
    /// Unknown option name or a value of the wrong shape
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A caller or environment error, e.g. a claimed image that cannot be decoded
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The transport reported that no file was uploaded
    #[error("No uploaded files.")]
    NotFound,

    /// Generic upload failure (partial upload, no temp dir, move exhausted, ...)
    #[error("{0}")]
    Uploader(String),

    /// The file is larger than the allowed ceiling
    #[error("{}", filesize_message(.size.as_ref(), .limit))]
    Filesize {
        /// Reported size in bytes, when the size is known
        size: Option<u64>,
        /// The ceiling that was exceeded, as configured
        limit: String,
    },

    /// The client filename contains bytes that are invalid in the encoding
    #[error("The filename \"{filename}\" is including invalid bytes for encoding: {encoding}")]
    Filename {
        /// Client filename, lossily decoded for display
        filename: String,
        /// Configured encoding label
        encoding: String,
    },

    /// The client extension is not in the allow-list
    #[error("The uploaded file's extension \"{extension}\" is not allowable")]
    Extension {
        /// Client extension
        extension: String,
    },

    /// The detected image type disagrees with the extension or MIME type
    #[error("The file extension \"{extension}\" does not match image type {}", detected_label(.detected.as_ref()))]
    ImageType {
        /// Client extension
        extension: String,
        /// Type detected from content, `None` when detection failed
        detected: Option<ImageType>,
    },

    /// Image wider than `maxWidth`
    #[error("The image width {width} pixels is larger than maxWidth: {limit}")]
    ImageWidth {
        /// Actual width
        width: u32,
        /// Configured ceiling
        limit: u32,
    },

    /// Image taller than `maxHeight`
    #[error("The image height {height} pixels is larger than maxHeight: {limit}")]
    ImageHeight {
        /// Actual height
        height: u32,
        /// Configured ceiling
        limit: u32,
    },

    /// Reading or relocating the underlying file failed
    #[error("Path error: {0}")]
    Path(String),
}

impl UploaderError {
    /// Returns the validation rule this error rejects a file for
    ///
    /// Configuration, argument and path errors belong to no rule.
    #[must_use]
    pub const fn rule(&self) -> Option<Rule> {
        match self {
            Self::NotFound => Some(Rule::NotFound),
            Self::Uploader(_) => Some(Rule::Uploader),
            Self::Filesize { .. } => Some(Rule::Filesize),
            Self::Filename { .. } => Some(Rule::Filename),
            Self::Extension { .. } => Some(Rule::Extension),
            Self::ImageType { .. } => Some(Rule::ImageType),
            Self::ImageWidth { .. } => Some(Rule::ImageWidth),
            Self::ImageHeight { .. } => Some(Rule::ImageHeight),
            Self::InvalidConfiguration(_) | Self::InvalidArgument(_) | Self::Path(_) => None,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}

fn filesize_message(size: Option<&u64>, limit: &str) -> String {
    match size {
        Some(size) => format!("The uploaded file's size {size} bytes is larger than maxFilesize: \"{limit}\""),
        None => format!("The uploaded file is larger than {limit}."),
    }
}

fn detected_label(detected: Option<&ImageType>) -> String {
    detected.map_or_else(|| "unknown".to_string(), ToString::to_string)
}

/// Result type for upload operations
pub type UploaderResult<T> = Result<T, UploaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_names_round_trip() {
        for rule in Rule::ALL {
            assert_eq!(rule.as_str().parse::<Rule>().unwrap(), rule);
        }
        assert!("bogus".parse::<Rule>().is_err());
    }

    #[test]
    fn test_rules_sort_in_pipeline_order() {
        let mut sorted = Rule::ALL;
        sorted.sort();
        assert_eq!(sorted, Rule::ALL);
        assert!(Rule::Filename < Rule::Filesize);
    }

    #[test]
    fn test_rule_of_errors() {
        assert_eq!(UploaderError::NotFound.rule(), Some(Rule::NotFound));
        assert_eq!(
            UploaderError::ImageWidth { width: 2, limit: 1 }.rule(),
            Some(Rule::ImageWidth)
        );
        assert_eq!(UploaderError::config("x").rule(), None);
        assert_eq!(UploaderError::Path("x".into()).rule(), None);
    }

    #[test]
    fn test_filesize_message() {
        let err = UploaderError::Filesize {
            size: Some(1025),
            limit: "1K".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "The uploaded file's size 1025 bytes is larger than maxFilesize: \"1K\""
        );

        let err = UploaderError::Filesize {
            size: None,
            limit: "requested MAX_FILE_SIZE".to_string(),
        };
        assert_eq!(err.to_string(), "The uploaded file is larger than requested MAX_FILE_SIZE.");
    }

    #[test]
    fn test_rule_serializes_camel_case() {
        assert_eq!(serde_json::to_string(&Rule::ImageHeight).unwrap(), "\"imageHeight\"");
        assert_eq!(serde_json::to_string(&Rule::NotFound).unwrap(), "\"notFound\"");
    }
}
