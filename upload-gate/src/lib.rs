//! upload-gate: acceptance checks and safe relocation for uploaded files
//!
//! An upload is only as trustworthy as the checks it passed. This crate runs
//! a fixed pipeline of independent, individually configured rules against an
//! uploaded file and, once it is accepted, moves it into permanent storage
//! under a collision-resistant name.
//!
//! # Design Principles
//!
//! 1. **Never Trust the Client**: image types come from file content, not
//!    from the filename or the `Content-Type` header
//! 2. **Skip What Is Not Configured**: every rule is off until its option is set
//! 3. **Fail Fast or Collect All**: one switch chooses between returning the
//!    first violation and recording every violation
//! 4. **Exact Sizes**: byte ceilings such as `3Y` are compared without overflow
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use upload_gate::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! upload_gate::observability::init()?;
//!
//! let mut validator = FileValidator::new();
//! validator
//!     .set_option("allowableType", "jpg,png,gif")?
//!     .set_option("maxFilesize", "2M")?
//!     .set_option("maxWidth", 1920_u32)?;
//!
//! let mut uploader = Uploader::new();
//! uploader
//!     .set_option("moveDirectory", "/var/uploads")?
//!     .set_option("moveRetry", 3_u32)?;
//!
//! let mut file = NativeFile::new("/tmp/upload-4f2a", "avatar.png", TransportError::Ok)?;
//! if uploader.validate(&file, &mut validator)? {
//!     let stored = uploader.move_file(&mut file)?;
//!     tracing::info!(path = %stored.display(), "Avatar stored");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `bigint` - arbitrary-precision size arithmetic with `num-bigint` (default)
//! - `decimal` - 96-bit decimal size arithmetic with `rust_decimal` (default)

pub mod config;
pub mod error;
pub mod file;
pub mod observability;
pub mod uploader;
pub mod validation;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! # Examples
    //!
    //! ```rust
    //! use upload_gate::prelude::*;
    //! ```

    pub use crate::config::{OptionValue, UploadGateConfig};
    pub use crate::error::{Rule, UploaderError, UploaderResult};
    pub use crate::file::{MemoryFile, NativeFile, TransportError, UploadedFile};
    pub use crate::uploader::{Uploader, UploaderConfig};
    pub use crate::validation::{
        Capabilities, ErrorValue, FileValidator, ImageType, ReportingMode, ValidationErrors,
        ValidatorConfig, Verdict,
    };
}
