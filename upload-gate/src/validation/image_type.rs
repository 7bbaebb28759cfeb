//! Image type detection from file content
//!
//! Two independent ways of learning what an uploaded image really is:
//!
//! - **Signature detection** examines the magic number at the start of the
//!   file with the `infer` crate. It never decodes anything and is the
//!   preferred method.
//! - **Dimension probe** reads just enough of the image header with the
//!   `image` crate to report width, height and format. It works on paths and
//!   in-memory buffers alike, and is also what decides whether a file counts
//!   as an image at all.
//!
//! Neither method trusts the client filename or the `Content-Type` header.
//!
//! The probe cannot read PSD or JPEG 2000 headers. Those files are typed by
//! signature detection but do not count as images, so the image type and
//! image size rules skip them.

use crate::error::{UploaderError, UploaderResult};
use crate::file::UploadedFile;
use image::{ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

/// Image type, as detected from file content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    /// Graphics Interchange Format
    Gif,
    /// JPEG / JFIF
    Jpeg,
    /// Portable Network Graphics
    Png,
    /// Adobe Photoshop document (signature detection only)
    Psd,
    /// Windows bitmap
    Bmp,
    /// Tagged Image File Format
    Tiff,
    /// JPEG 2000 (signature detection only)
    Jp2,
    /// Windows icon
    Ico,
    /// WebP
    Webp,
    /// AV1 Image File Format
    Avif,
}

impl ImageType {
    /// Canonical extension, without the leading dot
    ///
    /// JPEG reports `jpeg`; the `jpg` spelling is treated as an alias by
    /// the validator.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Psd => "psd",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Jp2 => "jp2",
            Self::Ico => "ico",
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    /// Canonical MIME type
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Gif => "image/gif",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Psd => "image/vnd.adobe.photoshop",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Jp2 => "image/jp2",
            Self::Ico => "image/vnd.microsoft.icon",
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
        }
    }

    /// Maps a MIME type reported by signature detection
    #[must_use]
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let kind = match mime.to_ascii_lowercase().as_str() {
            "image/gif" => Self::Gif,
            "image/jpeg" => Self::Jpeg,
            "image/png" => Self::Png,
            "image/vnd.adobe.photoshop" => Self::Psd,
            "image/bmp" => Self::Bmp,
            "image/tiff" => Self::Tiff,
            "image/jp2" => Self::Jp2,
            "image/vnd.microsoft.icon" | "image/x-icon" => Self::Ico,
            "image/webp" => Self::Webp,
            "image/avif" => Self::Avif,
            _ => return None,
        };
        Some(kind)
    }

    /// Maps a format reported by the dimension probe
    #[must_use]
    pub const fn from_format(format: ImageFormat) -> Option<Self> {
        let kind = match format {
            ImageFormat::Gif => Self::Gif,
            ImageFormat::Jpeg => Self::Jpeg,
            ImageFormat::Png => Self::Png,
            ImageFormat::Bmp => Self::Bmp,
            ImageFormat::Tiff => Self::Tiff,
            ImageFormat::Ico => Self::Ico,
            ImageFormat::WebP => Self::Webp,
            ImageFormat::Avif => Self::Avif,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Result of a dimension probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Detected format, `None` when the format has no [`ImageType`]
    pub image_type: Option<ImageType>,
}

/// Detects the image type from the magic number of the file at `path`
///
/// Returns `None` when the file cannot be read or is not a known image.
#[must_use]
pub fn detect_signature(path: &Path) -> Option<ImageType> {
    infer::get_from_path(path)
        .ok()
        .flatten()
        .and_then(|kind| ImageType::from_mime_type(kind.mime_type()))
}

/// Detects the image type from the magic number of an in-memory buffer
#[must_use]
pub fn detect_signature_bytes(data: &[u8]) -> Option<ImageType> {
    infer::get(data).and_then(|kind| ImageType::from_mime_type(kind.mime_type()))
}

/// Reads dimensions and format from the header of the image at `path`
///
/// # Errors
///
/// Returns `UploaderError::InvalidArgument` if the file is not a decodable image
pub fn probe_path(path: &Path) -> UploaderResult<ImageInfo> {
    // Open without the extension hint so only the content decides the format
    let reader = File::open(path)
        .and_then(|f| ImageReader::new(BufReader::new(f)).with_guessed_format())
        .map_err(|e| invalid_image(&path.display().to_string(), &e))?;
    into_info(reader, &path.display().to_string())
}

/// Reads dimensions and format from an in-memory image
///
/// # Errors
///
/// Returns `UploaderError::InvalidArgument` if the data is not a decodable image
pub fn probe_bytes(data: &[u8]) -> UploaderResult<ImageInfo> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| invalid_image("<memory>", &e))?;
    into_info(reader, "<memory>")
}

/// Probes an uploaded file, by path when it has one, otherwise by content
///
/// # Errors
///
/// Returns `UploaderError::InvalidArgument` if the file is not a decodable image
pub fn probe(file: &dyn UploadedFile) -> UploaderResult<ImageInfo> {
    match file.path() {
        Some(path) => probe_path(&path),
        None => {
            let data = file
                .content()
                .map_err(|e| UploaderError::InvalidArgument(format!("The file is invalid image: {e}")))?;
            probe_bytes(&data)
        }
    }
}

fn into_info<R>(reader: ImageReader<R>, label: &str) -> UploaderResult<ImageInfo>
where
    R: std::io::BufRead + std::io::Seek,
{
    let image_type = reader.format().and_then(ImageType::from_format);
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| invalid_image(label, &e))?;
    Ok(ImageInfo {
        width,
        height,
        image_type,
    })
}

fn invalid_image(label: &str, err: &dyn fmt::Display) -> UploaderError {
    UploaderError::InvalidArgument(format!("The filepath \"{label}\" is invalid image: {err}"))
}


#[cfg(test)]
mod tests {
    use super::fixtures::encode;
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    const GIF_MAGIC: &[u8] = b"GIF89a";

    #[test]
    fn test_canonical_names() {
        assert_eq!(ImageType::Jpeg.extension(), "jpeg");
        assert_eq!(ImageType::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(ImageType::Tiff.extension(), "tiff");
        assert_eq!(ImageType::Gif.to_string(), "gif");
    }

    #[test]
    fn test_from_mime_type() {
        assert_eq!(ImageType::from_mime_type("IMAGE/PNG"), Some(ImageType::Png));
        assert_eq!(ImageType::from_mime_type("image/x-icon"), Some(ImageType::Ico));
        assert_eq!(ImageType::from_mime_type("application/pdf"), None);
    }

    #[test]
    fn test_detect_signature_bytes() {
        assert_eq!(detect_signature_bytes(PNG_MAGIC), Some(ImageType::Png));
        assert_eq!(detect_signature_bytes(GIF_MAGIC), Some(ImageType::Gif));
        assert_eq!(detect_signature_bytes(b"%PDF-1.4"), None);
        assert_eq!(detect_signature_bytes(b"hello"), None);
    }

    #[test]
    fn test_psd_is_typed_but_not_probed() {
        let mut psd = b"8BPS\x00\x01".to_vec();
        psd.resize(64, 0);

        assert_eq!(detect_signature_bytes(&psd), Some(ImageType::Psd));
        assert!(matches!(probe_bytes(&psd), Err(UploaderError::InvalidArgument(_))));
    }

    #[test]
    fn test_detect_signature_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("upload.tmp");
        std::fs::write(&path, encode(4, 4, ImageFormat::Jpeg)).unwrap();
        assert_eq!(detect_signature(&path), Some(ImageType::Jpeg));

        assert_eq!(detect_signature(&dir.path().join("missing")), None);
    }

    #[test]
    fn test_probe_bytes() {
        let info = probe_bytes(&encode(10, 20, ImageFormat::Png)).unwrap();
        assert_eq!(info.width, 10);
        assert_eq!(info.height, 20);
        assert_eq!(info.image_type, Some(ImageType::Png));

        let info = probe_bytes(&encode(3, 7, ImageFormat::Gif)).unwrap();
        assert_eq!((info.width, info.height), (3, 7));
        assert_eq!(info.image_type, Some(ImageType::Gif));
    }

    #[test]
    fn test_probe_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("photo");
        std::fs::write(&path, encode(180, 90, ImageFormat::Jpeg)).unwrap();

        let info = probe_path(&path).unwrap();
        assert_eq!((info.width, info.height), (180, 90));
        assert_eq!(info.image_type, Some(ImageType::Jpeg));
    }

    #[test]
    fn test_probe_invalid_image() {
        let result = probe_bytes(b"not an image");
        assert!(matches!(result, Err(UploaderError::InvalidArgument(_))));
    }
}
