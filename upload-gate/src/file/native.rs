//! Uploads spooled to disk by the transport

use super::{TransportError, UploadedFile, OCTET_STREAM};
use crate::error::{UploaderError, UploaderResult};
use crate::validation::image_type;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// An upload that lives in a file on disk
///
/// This is the shape multipart front ends produce: the body was streamed to
/// a temporary file and the handler receives its path, the client filename
/// and a transport status.
///
/// # Examples
///
/// ```rust,no_run
/// use upload_gate::file::{NativeFile, TransportError, UploadedFile};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let file = NativeFile::new("/tmp/upload-4f2a", "avatar.png", TransportError::Ok)?;
/// assert_eq!(file.client_extension().as_deref(), Some("png"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct NativeFile {
    path: PathBuf,
    client_filename: Option<Vec<u8>>,
    transport_error: TransportError,
}

impl NativeFile {
    /// Wraps a spooled upload
    ///
    /// An empty client filename is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidArgument` if the transport reports
    /// success but `path` is not a regular file
    pub fn new(
        path: impl Into<PathBuf>,
        client_filename: impl Into<Vec<u8>>,
        transport_error: TransportError,
    ) -> UploaderResult<Self> {
        let path = path.into();
        if transport_error.is_ok() && !path.is_file() {
            return Err(UploaderError::InvalidArgument(format!(
                "The filepath \"{}\" is not a file",
                path.display()
            )));
        }
        let client_filename: Vec<u8> = client_filename.into();
        Ok(Self {
            path,
            client_filename: (!client_filename.is_empty()).then_some(client_filename),
            transport_error,
        })
    }

    /// Wraps an existing file, using its basename as the client filename
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidArgument` if `path` is not a regular file
    pub fn from_path(path: impl Into<PathBuf>) -> UploaderResult<Self> {
        let path = path.into();
        let basename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned().into_bytes())
            .unwrap_or_default();
        Self::new(path, basename, TransportError::Ok)
    }
}

impl UploadedFile for NativeFile {
    fn path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }

    fn size(&self) -> Option<i64> {
        if !self.transport_error.is_ok() {
            return None;
        }
        fs::metadata(&self.path)
            .ok()
            .and_then(|meta| i64::try_from(meta.len()).ok())
    }

    fn mime_type(&self) -> Option<String> {
        if !self.is_valid() {
            return None;
        }
        let kind = infer::get_from_path(&self.path).ok()?;
        Some(kind.map_or_else(|| OCTET_STREAM.to_string(), |kind| kind.mime_type().to_string()))
    }

    fn client_filename(&self) -> Option<Vec<u8>> {
        self.client_filename.clone()
    }

    fn transport_error(&self) -> TransportError {
        self.transport_error
    }

    fn is_valid(&self) -> bool {
        self.transport_error.is_ok() && self.path.is_file()
    }

    fn is_image(&self) -> bool {
        self.is_valid() && image_type::probe_path(&self.path).is_ok()
    }

    fn move_to(&mut self, directory: &Path, filename: &str) -> UploaderResult<PathBuf> {
        if !self.is_valid() {
            return Err(UploaderError::Path(format!(
                "The file \"{}\" is not valid",
                self.path.display()
            )));
        }
        let destination = directory.join(filename);

        // A hard link fails if the name is taken, so claiming it is atomic
        match fs::hard_link(&self.path, &destination) {
            Ok(()) => {}
            // Spool directories often sit on another filesystem
            Err(e) if matches!(e.kind(), ErrorKind::CrossesDevices | ErrorKind::Unsupported) => {
                copy_new(&self.path, &destination)?;
            }
            Err(e) => return Err(move_failed(&destination, &e)),
        }
        if let Err(e) = fs::remove_file(&self.path) {
            let _ = fs::remove_file(&destination);
            return Err(move_failed(&destination, &e));
        }

        self.path.clone_from(&destination);
        Ok(destination)
    }

    fn content(&self) -> UploaderResult<Vec<u8>> {
        fs::read(&self.path).map_err(|e| {
            UploaderError::Path(format!(
                "The file \"{}\" could not get content: {e}",
                self.path.display()
            ))
        })
    }
}

/// Copies `source` to a destination that must not exist yet
fn copy_new(source: &Path, destination: &Path) -> UploaderResult<()> {
    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .map_err(|e| move_failed(destination, &e))?;
    let copied = File::open(source)
        .and_then(|mut input| io::copy(&mut input, &mut out))
        .and_then(|_| out.sync_all());
    if let Err(e) = copied {
        drop(out);
        let _ = fs::remove_file(destination);
        return Err(move_failed(destination, &e));
    }
    Ok(())
}

fn move_failed(destination: &Path, err: &std::io::Error) -> UploaderError {
    UploaderError::Path(format!(
        "The file could not move to \"{}\": {err}",
        destination.display()
    ))
}
