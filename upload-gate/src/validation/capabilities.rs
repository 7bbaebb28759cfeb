//! Optional arithmetic and detection capabilities

use serde::{Deserialize, Serialize};

/// What the validator may use for size arithmetic and type detection
///
/// Passed to the validator explicitly. [`Capabilities::detect`] reports
/// everything the build provides and is what [`FileValidator::new`] uses;
/// tests and callers can narrow it, e.g. to exercise the native fallback.
///
/// [`FileValidator::new`]: super::FileValidator::new
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Arbitrary-precision integers (`bigint` feature)
    pub big_integer: bool,
    /// 96-bit decimal arithmetic (`decimal` feature)
    pub big_decimal: bool,
    /// Magic-number image type detection
    pub signature_detection: bool,
}

impl Capabilities {
    /// Capabilities compiled into this build
    #[must_use]
    pub const fn detect() -> Self {
        Self {
            big_integer: cfg!(feature = "bigint"),
            big_decimal: cfg!(feature = "decimal"),
            signature_detection: true,
        }
    }

    /// No optional capability; native arithmetic and the dimension probe only
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            big_integer: false,
            big_decimal: false,
            signature_detection: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_matches_features() {
        let caps = Capabilities::detect();
        assert_eq!(caps.big_integer, cfg!(feature = "bigint"));
        assert_eq!(caps.big_decimal, cfg!(feature = "decimal"));
        assert!(caps.signature_detection);
        assert_eq!(Capabilities::default(), caps);
    }

    #[test]
    fn test_minimal() {
        let caps = Capabilities::minimal();
        assert!(!caps.big_integer && !caps.big_decimal && !caps.signature_detection);
    }
}
