//! Uploaded file abstraction
//!
//! The validator and the uploader never look at where an upload came from.
//! They talk to the [`UploadedFile`] trait, which a transport adapter
//! implements over whatever representation it has:
//!
//! - [`NativeFile`]: a file the transport already spooled to disk
//! - [`MemoryFile`]: a buffered upload held in memory
//!
//! # Examples
//!
//! ```rust
//! use upload_gate::file::{MemoryFile, UploadedFile};
//!
//! let file = MemoryFile::new("report.pdf", "application/pdf", b"%PDF-1.4".to_vec());
//!
//! assert_eq!(file.client_extension().as_deref(), Some("pdf"));
//! assert_eq!(file.size(), Some(8));
//! assert!(file.is_valid());
//! assert!(!file.is_image());
//! ```

mod memory;
mod native;

pub use memory::MemoryFile;
pub use native::NativeFile;

use crate::error::UploaderResult;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Fallback MIME type for content without a recognised signature
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Status reported by the transport that delivered the file
///
/// The numeric codes follow the conventional `UPLOAD_ERR_*` numbering used
/// by multipart front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportError {
    /// The bytes arrived intact
    Ok,
    /// Larger than the transport's own ceiling
    IniSize,
    /// Larger than the ceiling requested by the form
    FormSize,
    /// Only part of the file arrived
    Partial,
    /// No file was sent
    NoFile,
    /// The transport had no temporary directory
    NoTmpDir,
    /// The transport could not write the file
    CantWrite,
    /// A transport extension aborted the upload
    Extension,
    /// A code outside the known range
    Unknown(i32),
}

impl TransportError {
    /// Maps a conventional numeric upload status
    ///
    /// # Examples
    ///
    /// ```rust
    /// use upload_gate::file::TransportError;
    ///
    /// assert_eq!(TransportError::from_code(0), TransportError::Ok);
    /// assert_eq!(TransportError::from_code(4), TransportError::NoFile);
    /// assert_eq!(TransportError::from_code(5), TransportError::Unknown(5));
    /// ```
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::IniSize,
            2 => Self::FormSize,
            3 => Self::Partial,
            4 => Self::NoFile,
            6 => Self::NoTmpDir,
            7 => Self::CantWrite,
            8 => Self::Extension,
            other => Self::Unknown(other),
        }
    }

    /// Returns the numeric status
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::IniSize => 1,
            Self::FormSize => 2,
            Self::Partial => 3,
            Self::NoFile => 4,
            Self::NoTmpDir => 6,
            Self::CantWrite => 7,
            Self::Extension => 8,
            Self::Unknown(code) => code,
        }
    }

    /// Returns true if the transport reported no problem
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::IniSize => f.write_str("exceeds the transport size limit"),
            Self::FormSize => f.write_str("exceeds the form size limit"),
            Self::Partial => f.write_str("partially uploaded"),
            Self::NoFile => f.write_str("no file uploaded"),
            Self::NoTmpDir => f.write_str("missing temporary directory"),
            Self::CantWrite => f.write_str("failed to write to disk"),
            Self::Extension => f.write_str("stopped by an extension"),
            Self::Unknown(code) => write!(f, "unknown upload error {code}"),
        }
    }
}

/// Capability contract of an uploaded file
///
/// Accessors return owned values so adapters may compute them lazily.
#[cfg_attr(test, mockall::automock)]
pub trait UploadedFile: Send + Sync {
    /// Filesystem location, when the upload lives on disk
    fn path(&self) -> Option<PathBuf>;

    /// Size in bytes as reported by the transport
    ///
    /// May be negative when a 32-bit transport wrapped around; the
    /// validator reinterprets such values as unsigned.
    fn size(&self) -> Option<i64>;

    /// MIME type detected from the content
    fn mime_type(&self) -> Option<String>;

    /// Filename sent by the client, as raw bytes
    fn client_filename(&self) -> Option<Vec<u8>>;

    /// Extension of the client filename, without the dot
    fn client_extension(&self) -> Option<String> {
        self.client_filename()
            .and_then(|name| extension_of(&name))
    }

    /// Status reported by the transport
    fn transport_error(&self) -> TransportError;

    /// Returns true if the transport succeeded and the bytes are readable
    fn is_valid(&self) -> bool;

    /// Returns true if the content decodes as an image
    fn is_image(&self) -> bool;

    /// Relocates the file to `directory/filename` and returns the new path
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::Path` if the file is invalid, the destination
    /// already exists, or the relocation fails.
    fn move_to(&mut self, directory: &Path, filename: &str) -> UploaderResult<PathBuf>;

    /// Reads the whole content
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::Path` if the content cannot be read
    fn content(&self) -> UploaderResult<Vec<u8>>;

    /// Returns the content as a `data:` URI
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::Path` if the content cannot be read
    fn content_as_data_uri(&self) -> UploaderResult<String> {
        let data = self.content()?;
        let mime = self.mime_type().unwrap_or_else(|| OCTET_STREAM.to_string());
        Ok(format!("data:{mime};base64,{}", STANDARD.encode(data)))
    }
}

/// Extracts the extension from a client filename
///
/// Only the final path component is considered, and an empty extension
/// counts as none.
#[must_use]
pub fn extension_of(filename: &[u8]) -> Option<String> {
    let name = String::from_utf8_lossy(filename);
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    base.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .map(ToString::to_string)
}

pub(crate) fn detect_mime(data: &[u8]) -> String {
    infer::get(data).map_or_else(|| OCTET_STREAM.to_string(), |kind| kind.mime_type().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_codes_round_trip() {
        for code in [0, 1, 2, 3, 4, 6, 7, 8, 5, 99, -1] {
            assert_eq!(TransportError::from_code(code).code(), code);
        }
        assert!(TransportError::Ok.is_ok());
        assert!(!TransportError::Partial.is_ok());
        assert_eq!(TransportError::from_code(5), TransportError::Unknown(5));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(b"photo.JPG").as_deref(), Some("JPG"));
        assert_eq!(extension_of(b"archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of(b"README"), None);
        assert_eq!(extension_of(b"trailing."), None);
        assert_eq!(extension_of(b"dir.d/README"), None);
        assert_eq!(extension_of(b"C:\\Users\\me\\cv.pdf").as_deref(), Some("pdf"));
        assert_eq!(extension_of(b""), None);
    }

    #[test]
    fn test_data_uri_default_method() {
        let file = MemoryFile::new("dot.gif", "image/gif", b"GIF89a".to_vec());
        assert_eq!(file.content_as_data_uri().unwrap(), "data:image/gif;base64,R0lGODlh");
    }

    #[test]
    fn test_detect_mime_fallback() {
        assert_eq!(detect_mime(b"plain words"), OCTET_STREAM);
        assert_eq!(detect_mime(b"%PDF-1.4"), "application/pdf");
    }
}
