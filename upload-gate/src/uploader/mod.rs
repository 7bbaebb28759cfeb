//! Validation orchestration and collision-free relocation
//!
//! [`Uploader::validate`] runs the validator's checks in a fixed order and
//! [`Uploader::move_file`] relocates an accepted file under a generated
//! name, retrying with a fresh name when an attempt fails.
//!
//! # Examples
//!
//! ```rust,no_run
//! use upload_gate::file::{NativeFile, TransportError};
//! use upload_gate::uploader::Uploader;
//! use upload_gate::validation::FileValidator;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut validator = FileValidator::new();
//! validator.set_option("allowableType", "jpg,png")?;
//! validator.set_option("maxFilesize", "2M")?;
//!
//! let mut uploader = Uploader::new();
//! uploader.set_option("moveDirectory", "/var/uploads")?;
//! uploader.set_option("moveRetry", 3_u32)?;
//!
//! let mut file = NativeFile::new("/tmp/upload-4f2a", "avatar.png", TransportError::Ok)?;
//! if uploader.validate(&file, &mut validator)? {
//!     let stored = uploader.move_file(&mut file)?;
//!     println!("stored at {}", stored.display());
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::OptionValue;
use crate::error::{UploaderError, UploaderResult};
use crate::file::UploadedFile;
use crate::validation::FileValidator;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Relocation settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploaderConfig {
    /// `moveDirectory`: where accepted files are moved
    pub move_directory: Option<PathBuf>,
    /// `moveRetry`: how many generated names to try
    pub move_retry: Option<u32>,
}

/// Validates uploads and moves accepted ones into place
#[derive(Debug, Clone, Default)]
pub struct Uploader {
    config: UploaderConfig,
}

impl Uploader {
    /// Option names accepted by [`Uploader::set_option`]
    pub const OPTIONS: [&'static str; 2] = ["moveDirectory", "moveRetry"];

    /// Creates an uploader with nothing configured
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an uploader from prepared settings
    #[must_use]
    pub const fn with_config(config: UploaderConfig) -> Self {
        Self { config }
    }

    /// Current settings
    #[must_use]
    pub const fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Sets one option, checking the shape of its value
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidConfiguration` if the name is unknown
    /// or the value has the wrong shape
    pub fn set_option(
        &mut self,
        name: &str,
        value: impl Into<OptionValue>,
    ) -> UploaderResult<&mut Self> {
        let value = value.into();
        match name {
            "moveDirectory" => self.config.move_directory = Some(PathBuf::from(value.to_text(name)?)),
            "moveRetry" => self.config.move_retry = Some(value.to_u32(name)?),
            _ => {
                return Err(UploaderError::config(format!(
                    "The config parameter \"{name}\" is not defined."
                )))
            }
        }
        debug!(option = name, value = %value, "Uploader option set");
        Ok(self)
    }

    /// Returns the current value of an option, `None` when unset
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::InvalidConfiguration` if the name is unknown
    pub fn get_option(&self, name: &str) -> UploaderResult<Option<OptionValue>> {
        match name {
            "moveDirectory" => Ok(self.config.move_directory.clone().map(Into::into)),
            "moveRetry" => Ok(self.config.move_retry.map(Into::into)),
            _ => Err(UploaderError::config(format!(
                "The config parameter \"{name}\" is not defined."
            ))),
        }
    }

    /// Runs every configured check against `file`
    ///
    /// Clears the validator's errors first, then checks in order: upload
    /// error, filename, filesize, extension and, for images, image type and
    /// image size. Checks whose option is unset are skipped. Returns true
    /// if no failure was recorded.
    ///
    /// # Errors
    ///
    /// In throw mode, returns the first violated rule's error. In both modes,
    /// returns configuration and argument errors.
    pub fn validate(
        &self,
        file: &dyn UploadedFile,
        validator: &mut FileValidator,
    ) -> UploaderResult<bool> {
        validator.clear_errors();

        validator.validate_upload_error(file)?;

        let config = validator.config().clone();
        if config.filename_encoding.is_some() {
            validator.validate_filename(file)?;
        }
        if config.max_filesize.is_some() {
            validator.validate_filesize(file)?;
        }
        if config.allowable_type.is_some() {
            validator.validate_extension(file)?;
        }
        if file.is_image() {
            validator.validate_image_type(file)?;
            if config.max_width.is_some() || config.max_height.is_some() {
                validator.validate_image_size(file)?;
            }
        }

        let accepted = !validator.has_error();
        debug!(accepted, errors = validator.errors().len(), "Upload validated");
        Ok(accepted)
    }

    /// Moves `file` into `moveDirectory` under a generated name
    ///
    /// The directory is created when missing. Each attempt uses a new
    /// random name with the client extension appended; an attempt that
    /// fails with `UploaderError::Path` is retried until `moveRetry`
    /// attempts were made. Returns the absolute destination path.
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::Uploader` if `moveDirectory` or `moveRetry`
    /// is unset or empty, the file is invalid, the directory cannot be
    /// created or written, or every attempt failed
    pub fn move_file(&self, file: &mut dyn UploadedFile) -> UploaderResult<PathBuf> {
        let directory = self
            .config
            .move_directory
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| UploaderError::Uploader("moveDirectory is not specified.".to_string()))?;
        let retries = self
            .config
            .move_retry
            .filter(|retries| *retries > 0)
            .ok_or_else(|| UploaderError::Uploader("moveRetry is not specified.".to_string()))?;

        if !file.is_valid() {
            return Err(UploaderError::Uploader(format!(
                "The uploaded file is invalid; a temporary file was not able to be created in {}.",
                directory.display()
            )));
        }
        let directory = prepare_directory(directory)?;
        let extension = file.client_extension().filter(|ext| !ext.is_empty());

        for attempt in 1..=retries {
            let filename = generate_filename(extension.as_deref());
            match file.move_to(&directory, &filename) {
                Ok(destination) => {
                    info!(path = %destination.display(), attempt, "Uploaded file moved");
                    return Ok(destination);
                }
                Err(UploaderError::Path(reason)) => {
                    debug!(attempt, filename = %filename, reason = %reason, "Move attempt failed");
                }
                Err(other) => return Err(other),
            }
        }

        warn!(directory = %directory.display(), retries, "Move retries exhausted");
        Err(UploaderError::Uploader(format!(
            "A temporary file was not able to be created in {}.",
            directory.display()
        )))
    }
}

/// Creates `directory` when missing and checks it can be written
fn prepare_directory(directory: &Path) -> UploaderResult<PathBuf> {
    if !directory.is_dir() {
        fs::create_dir_all(directory).map_err(|e| {
            UploaderError::Uploader(format!(
                "The directory \"{}\" could not create: {e}",
                directory.display()
            ))
        })?;
    }
    // Permission bits say nothing about this process, so create a real entry
    tempfile::Builder::new()
        .prefix(".upload-gate-")
        .tempfile_in(directory)
        .map_err(|e| {
            UploaderError::Uploader(format!(
                "The directory \"{}\" could not write: {e}",
                directory.display()
            ))
        })?;
    fs::canonicalize(directory).map_err(|e| {
        UploaderError::Uploader(format!(
            "The directory \"{}\" could not resolve: {e}",
            directory.display()
        ))
    })
}

/// Random destination name, keeping the client extension
fn generate_filename(extension: Option<&str>) -> String {
    let stem = Uuid::new_v4().simple().to_string();
    match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Rule;
    use crate::file::{MemoryFile, MockUploadedFile, TransportError};
    use crate::validation::image_type::fixtures::encode;
    use image::ImageFormat;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn uploader(directory: &Path, retries: u32) -> Uploader {
        let mut uploader = Uploader::new();
        uploader
            .set_option("moveDirectory", directory)
            .unwrap()
            .set_option("moveRetry", retries)
            .unwrap();
        uploader
    }

    fn movable(extension: Option<&str>) -> MockUploadedFile {
        let mut file = MockUploadedFile::new();
        file.expect_is_valid().return_const(true);
        file.expect_client_extension()
            .return_const(extension.map(ToString::to_string));
        file
    }

    #[test]
    fn test_options() {
        let mut uploader = Uploader::new();
        assert_eq!(uploader.get_option("moveRetry").unwrap(), None);

        uploader.set_option("moveRetry", "5").unwrap();
        assert_eq!(uploader.get_option("moveRetry").unwrap(), Some(OptionValue::Int(5)));
        uploader.set_option("moveDirectory", "/srv/files").unwrap();
        assert_eq!(
            uploader.get_option("moveDirectory").unwrap(),
            Some(OptionValue::from("/srv/files"))
        );

        assert!(uploader.set_option("moveRetry", "three").is_err());
        assert!(uploader.set_option("moveDirectory", 1_u32).is_err());
        assert!(matches!(
            uploader.set_option("maxFilesize", "1K"),
            Err(UploaderError::InvalidConfiguration(_))
        ));
        assert!(uploader.get_option("bogus").is_err());
    }

    #[test]
    fn test_generate_filename() {
        let a = generate_filename(Some("png"));
        let b = generate_filename(Some("png"));
        assert_ne!(a, b);
        assert!(a.ends_with(".png"));
        assert_eq!(a.len(), 32 + 4);
        assert_eq!(generate_filename(None).len(), 32);
    }

    #[test]
    fn test_move_requires_configuration() {
        let dir = TempDir::new().unwrap();
        let mut file = MockUploadedFile::new();
        file.expect_move_to().never();

        let err = Uploader::new().move_file(&mut file).unwrap_err();
        assert_eq!(err.to_string(), "moveDirectory is not specified.");

        let mut no_retry = Uploader::new();
        no_retry.set_option("moveDirectory", dir.path()).unwrap();
        let err = no_retry.move_file(&mut file).unwrap_err();
        assert_eq!(err.to_string(), "moveRetry is not specified.");

        let err = uploader(dir.path(), 0).move_file(&mut file).unwrap_err();
        assert!(matches!(err, UploaderError::Uploader(_)));
    }

    #[test]
    fn test_move_requires_valid_file() {
        let dir = TempDir::new().unwrap();
        let mut file = MockUploadedFile::new();
        file.expect_is_valid().return_const(false);
        file.expect_move_to().never();

        let err = uploader(dir.path(), 3).move_file(&mut file).unwrap_err();
        assert!(matches!(err, UploaderError::Uploader(_)));
    }

    #[test]
    fn test_move_exhausts_retries() {
        let dir = TempDir::new().unwrap();
        let mut file = movable(Some("png"));
        let names = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&names);
        file.expect_move_to().times(3).returning(move |_, name| {
            seen.lock().unwrap().push(name.to_string());
            Err(UploaderError::Path("exists".to_string()))
        });

        let err = uploader(dir.path(), 3).move_file(&mut file).unwrap_err();
        assert!(matches!(err, UploaderError::Uploader(ref msg) if msg.starts_with("A temporary file")));

        let names = names.lock().unwrap();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|name| name.ends_with(".png")));
        assert_ne!(names[0], names[1]);
        assert_ne!(names[1], names[2]);
    }

    #[test]
    fn test_move_stops_at_first_success() {
        let dir = TempDir::new().unwrap();
        let mut file = movable(None);
        let mut calls = 0;
        file.expect_move_to().times(2).returning(move |dir, name| {
            calls += 1;
            if calls < 2 {
                Err(UploaderError::Path("exists".to_string()))
            } else {
                Ok(dir.join(name))
            }
        });

        let moved = uploader(dir.path(), 5).move_file(&mut file).unwrap();
        assert!(moved.starts_with(dir.path().canonicalize().unwrap()));
        assert!(moved.extension().is_none());
    }

    #[test]
    fn test_move_propagates_other_errors() {
        let dir = TempDir::new().unwrap();
        let mut file = movable(Some("txt"));
        file.expect_move_to()
            .times(1)
            .returning(|_, _| Err(UploaderError::InvalidArgument("broken adapter".to_string())));

        let err = uploader(dir.path(), 5).move_file(&mut file).unwrap_err();
        assert!(matches!(err, UploaderError::InvalidArgument(_)));
    }

    #[test]
    fn test_move_creates_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a").join("b");
        let mut file = MemoryFile::new("report.pdf", "application/pdf", b"%PDF-1.4".to_vec());

        let moved = uploader(&target, 1).move_file(&mut file).unwrap();
        assert!(moved.is_absolute());
        assert_eq!(moved.extension().and_then(|e| e.to_str()), Some("pdf"));
        assert_eq!(fs::read(&moved).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn test_move_directory_under_file_fails_before_any_attempt() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let mut file = movable(Some("png"));
        file.expect_move_to().never();

        let err = uploader(&blocker.join("uploads"), 3).move_file(&mut file).unwrap_err();
        assert!(matches!(err, UploaderError::Uploader(ref msg) if msg.contains("could not create")));
    }

    #[cfg(unix)]
    #[test]
    fn test_move_to_read_only_directory_fails_before_any_attempt() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
        // Root ignores the mode bits
        if fs::write(locked.join("canary"), b"").is_ok() {
            return;
        }

        let mut file = movable(Some("png"));
        file.expect_move_to().never();

        let err = uploader(&locked, 3).move_file(&mut file).unwrap_err();
        assert!(matches!(err, UploaderError::Uploader(ref msg) if msg.contains("could not write")));
        assert_eq!(fs::read_dir(&locked).unwrap().count(), 0);

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_prepare_directory_leaves_no_entries() {
        let dir = TempDir::new().unwrap();
        let prepared = prepare_directory(dir.path()).unwrap();

        assert_eq!(prepared, dir.path().canonicalize().unwrap());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_validate_accumulates_in_order() {
        let mut validator = FileValidator::new();
        validator
            .set_option("throwExceptionOnValidate", false)
            .unwrap()
            .set_option("allowableType", "jpg")
            .unwrap()
            .set_option("maxFilesize", "1K")
            .unwrap()
            .set_option("maxWidth", 8_u32)
            .unwrap();

        let file = MemoryFile::new("photo.png", "", encode(64, 4, ImageFormat::Gif));
        let accepted = Uploader::new().validate(&file, &mut validator).unwrap();

        assert!(!accepted);
        let failed: Vec<Rule> = validator.errors().iter().map(|(rule, _)| rule).collect();
        assert!(failed.contains(&Rule::Extension));
        assert!(failed.contains(&Rule::ImageType));
        assert!(failed.contains(&Rule::ImageWidth));
        assert!(!failed.contains(&Rule::ImageHeight));
    }

    #[test]
    fn test_validate_throw_stops_at_first_failure() {
        let mut validator = FileValidator::new();
        validator.set_option("allowableType", "jpg").unwrap();
        validator.set_option("maxWidth", 8_u32).unwrap();

        let file = MemoryFile::new("photo.png", "", encode(64, 4, ImageFormat::Png));
        let err = Uploader::new().validate(&file, &mut validator).unwrap_err();

        assert!(matches!(err, UploaderError::Extension { .. }));
        assert!(!validator.has_error_for(Rule::ImageWidth));
    }

    #[test]
    fn test_validate_clears_previous_errors() {
        let mut validator = FileValidator::new();
        validator.set_option("throwExceptionOnValidate", false).unwrap();
        let uploader = Uploader::new();

        let missing = MemoryFile::new("", "", Vec::new()).with_transport_error(TransportError::NoFile);
        assert!(!uploader.validate(&missing, &mut validator).unwrap());
        assert!(validator.has_error_for(Rule::NotFound));

        let fine = MemoryFile::new("notes.txt", "text/plain", b"hello".to_vec());
        assert!(uploader.validate(&fine, &mut validator).unwrap());
        assert!(!validator.has_error());
    }
}
