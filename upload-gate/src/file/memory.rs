//! Buffered uploads held in memory

use super::{detect_mime, TransportError, UploadedFile};
use crate::error::{UploaderError, UploaderResult};
use crate::validation::image_type;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// An upload whose body was buffered in memory
///
/// Stream-based request types hand the body over as bytes together with the
/// client filename and media type. The client media type is kept for the
/// caller but never trusted: [`UploadedFile::mime_type`] is detected from the
/// content.
///
/// A memory file can be moved once; afterwards it reports itself invalid.
///
/// # Examples
///
/// ```rust
/// use upload_gate::file::{MemoryFile, UploadedFile};
///
/// let file = MemoryFile::new("photo.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0]);
///
/// assert_eq!(file.client_media_type(), Some("image/jpeg"));
/// assert_eq!(file.mime_type().as_deref(), Some("image/jpeg"));
/// assert_eq!(file.path(), None);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryFile {
    data: Vec<u8>,
    client_filename: Option<Vec<u8>>,
    client_media_type: Option<String>,
    transport_error: TransportError,
    moved: bool,
}

impl MemoryFile {
    /// Creates a successfully transported memory file
    ///
    /// Empty client filename and media type are treated as absent.
    #[must_use]
    pub fn new(
        client_filename: impl Into<Vec<u8>>,
        client_media_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        let client_filename: Vec<u8> = client_filename.into();
        let client_media_type: String = client_media_type.into();
        Self {
            data,
            client_filename: (!client_filename.is_empty()).then_some(client_filename),
            client_media_type: (!client_media_type.is_empty()).then_some(client_media_type),
            transport_error: TransportError::Ok,
            moved: false,
        }
    }

    /// Sets the transport status
    #[must_use]
    pub const fn with_transport_error(mut self, transport_error: TransportError) -> Self {
        self.transport_error = transport_error;
        self
    }

    /// Media type claimed by the client
    #[must_use]
    pub fn client_media_type(&self) -> Option<&str> {
        self.client_media_type.as_deref()
    }
}

impl UploadedFile for MemoryFile {
    fn path(&self) -> Option<PathBuf> {
        None
    }

    fn size(&self) -> Option<i64> {
        if !self.transport_error.is_ok() {
            return None;
        }
        i64::try_from(self.data.len()).ok()
    }

    fn mime_type(&self) -> Option<String> {
        self.is_valid().then(|| detect_mime(&self.data))
    }

    fn client_filename(&self) -> Option<Vec<u8>> {
        self.client_filename.clone()
    }

    fn transport_error(&self) -> TransportError {
        self.transport_error
    }

    fn is_valid(&self) -> bool {
        self.transport_error.is_ok() && !self.moved
    }

    fn is_image(&self) -> bool {
        self.is_valid() && image_type::probe_bytes(&self.data).is_ok()
    }

    fn move_to(&mut self, directory: &Path, filename: &str) -> UploaderResult<PathBuf> {
        if !self.is_valid() {
            return Err(UploaderError::Path(
                "The file is not valid or was already moved".to_string(),
            ));
        }
        let destination = directory.join(filename);
        let move_failed = |e: std::io::Error| {
            UploaderError::Path(format!(
                "The file could not move to \"{}\": {e}",
                destination.display()
            ))
        };

        // create_new fails atomically when the name is taken
        let mut out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&destination)
            .map_err(move_failed)?;
        if let Err(e) = out.write_all(&self.data).and_then(|()| out.sync_all()) {
            drop(out);
            let _ = std::fs::remove_file(&destination);
            return Err(move_failed(e));
        }

        self.moved = true;
        Ok(destination)
    }

    fn content(&self) -> UploaderResult<Vec<u8>> {
        if self.moved {
            return Err(UploaderError::Path(
                "The file could not get content: already moved".to_string(),
            ));
        }
        Ok(self.data.clone())
    }
}
