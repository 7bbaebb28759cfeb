//! Byte-size expressions with power-of-1024 unit suffixes
//!
//! `maxFilesize` may be written as a plain byte count (`1048576`) or as a
//! count with a unit (`1M`, `20g`, `3Y`). Large units overflow any native
//! integer, so the arithmetic is delegated to a [`Precision`] strategy:
//!
//! | Strategy | Backing | Range |
//! |---|---|---|
//! | [`Precision::BigInteger`] | `num-bigint` | unbounded |
//! | [`Precision::BigDecimal`] | `rust_decimal` | 96-bit mantissa |
//! | [`Precision::Native`] | `u64` | 64-bit |
//!
//! Every strategy is exact within its range and reports
//! [`ByteSizeError::Overflow`] instead of wrapping or truncating outside it.

use super::Capabilities;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

#[allow(clippy::expect_used)]
static BYTE_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\A(\d+)([KMGTPEZY]?)\z").expect("byte size pattern is valid"));

/// Unit suffixes, indexed by their power of 1024
const UNITS: [&str; 9] = ["", "K", "M", "G", "T", "P", "E", "Z", "Y"];

/// Errors from parsing or comparing byte sizes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ByteSizeError {
    /// The text is not `<digits>[KMGTPEZY]`
    #[error("\"{0}\" is not a byte size")]
    Malformed(String),

    /// The value does not fit the selected strategy
    #[error("{value} exceeds the range of {precision} arithmetic")]
    Overflow {
        /// Offending value
        value: String,
        /// Strategy that overflowed
        precision: Precision,
    },

    /// The strategy was not compiled into this build
    #[error("{0} arithmetic is not available in this build")]
    Unavailable(Precision),
}

/// Arithmetic strategy for byte-size calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Arbitrary-precision integers
    BigInteger,
    /// 96-bit decimal arithmetic
    BigDecimal,
    /// Checked `u64` arithmetic
    Native,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BigInteger => "big integer",
            Self::BigDecimal => "big decimal",
            Self::Native => "native",
        })
    }
}

impl Precision {
    /// Picks the most precise strategy the capabilities allow
    #[must_use]
    pub const fn select(capabilities: &Capabilities) -> Self {
        if capabilities.big_integer {
            Self::BigInteger
        } else if capabilities.big_decimal {
            Self::BigDecimal
        } else {
            Self::Native
        }
    }

    /// Computes `digits × 1024^exponent`
    ///
    /// # Errors
    ///
    /// Returns `ByteSizeError::Overflow` if the product is out of range for
    /// this strategy, or `ByteSizeError::Unavailable` if it is not compiled in.
    pub fn scale(self, digits: &str, exponent: u32) -> Result<ByteCount, ByteSizeError> {
        match self {
            Self::BigInteger => big_integer::scale(digits, exponent),
            Self::BigDecimal => big_decimal::scale(digits, exponent),
            Self::Native => {
                let overflow = || ByteSizeError::Overflow {
                    value: format!("{digits}{}", UNITS.get(exponent as usize).unwrap_or(&"?")),
                    precision: self,
                };
                let value: u64 = digits.parse().map_err(|_| overflow())?;
                1024_u64
                    .checked_pow(exponent)
                    .and_then(|factor| value.checked_mul(factor))
                    .map(ByteCount::from)
                    .ok_or_else(overflow)
            }
        }
    }

    /// Compares two byte counts
    ///
    /// # Errors
    ///
    /// Returns `ByteSizeError::Overflow` if either value is out of range for
    /// this strategy, or `ByteSizeError::Unavailable` if it is not compiled in.
    pub fn compare(self, a: &ByteCount, b: &ByteCount) -> Result<Ordering, ByteSizeError> {
        match self {
            Self::BigInteger => big_integer::compare(a, b),
            Self::BigDecimal => big_decimal::compare(a, b),
            Self::Native => {
                let native = |count: &ByteCount| {
                    count.to_u64().ok_or_else(|| ByteSizeError::Overflow {
                        value: count.to_string(),
                        precision: self,
                    })
                };
                Ok(native(a)?.cmp(&native(b)?))
            }
        }
    }
}

/// An exact, non-negative byte count
///
/// Stored as canonical decimal digits so that values beyond `u64` survive
/// unchanged whichever strategy produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ByteCount(String);

impl ByteCount {
    /// Creates a count from decimal digits, dropping leading zeros
    ///
    /// Returns `None` if `digits` contains anything but ASCII digits.
    #[must_use]
    pub fn from_digits(digits: &str) -> Option<Self> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let trimmed = digits.trim_start_matches('0');
        Some(Self(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() }))
    }

    /// Returns the decimal digits
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the count as `u64`, or `None` if it does not fit
    #[must_use]
    pub fn to_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl From<u64> for ByteCount {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ByteCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns true if `text` is a byte-size expression
#[must_use]
pub fn is_byte_size(text: &str) -> bool {
    BYTE_SIZE.is_match(text)
}

/// Parses `<digits>[KMGTPEZY]` (case-insensitive) into an exact byte count
///
/// # Errors
///
/// Returns `ByteSizeError::Malformed` if `text` is not a byte-size
/// expression, or the strategy's error if the value is out of its range.
///
/// # Examples
///
/// ```rust
/// use upload_gate::validation::size::{parse_bytes, Precision};
///
/// let bytes = parse_bytes("1K", Precision::Native).unwrap();
/// assert_eq!(bytes.to_u64(), Some(1024));
///
/// assert!(parse_bytes("1KB", Precision::Native).is_err());
/// ```
pub fn parse_bytes(text: &str, precision: Precision) -> Result<ByteCount, ByteSizeError> {
    let captures = BYTE_SIZE
        .captures(text)
        .ok_or_else(|| ByteSizeError::Malformed(text.to_string()))?;
    let digits = captures.get(1).map_or("", |m| m.as_str());
    let suffix = captures.get(2).map_or("", |m| m.as_str()).to_ascii_uppercase();
    let exponent = UNITS
        .iter()
        .position(|unit| *unit == suffix)
        .and_then(|index| u32::try_from(index).ok())
        .ok_or_else(|| ByteSizeError::Malformed(text.to_string()))?;
    precision.scale(digits, exponent)
}

#[cfg(feature = "bigint")]
mod big_integer {
    use super::{ByteCount, ByteSizeError, Precision};
    use num_bigint::BigUint;
    use std::cmp::Ordering;

    fn parse(value: &str) -> Result<BigUint, ByteSizeError> {
        value
            .parse()
            .map_err(|_| ByteSizeError::Malformed(value.to_string()))
    }

    pub(super) fn scale(digits: &str, exponent: u32) -> Result<ByteCount, ByteSizeError> {
        let product = parse(digits)? * BigUint::from(1024_u32).pow(exponent);
        ByteCount::from_digits(&product.to_string()).ok_or(ByteSizeError::Unavailable(Precision::BigInteger))
    }

    pub(super) fn compare(a: &ByteCount, b: &ByteCount) -> Result<Ordering, ByteSizeError> {
        Ok(parse(a.as_str())?.cmp(&parse(b.as_str())?))
    }
}

#[cfg(not(feature = "bigint"))]
mod big_integer {
    use super::{ByteCount, ByteSizeError, Precision};
    use std::cmp::Ordering;

    pub(super) fn scale(_digits: &str, _exponent: u32) -> Result<ByteCount, ByteSizeError> {
        Err(ByteSizeError::Unavailable(Precision::BigInteger))
    }

    pub(super) fn compare(_a: &ByteCount, _b: &ByteCount) -> Result<Ordering, ByteSizeError> {
        Err(ByteSizeError::Unavailable(Precision::BigInteger))
    }
}

#[cfg(feature = "decimal")]
mod big_decimal {
    use super::{ByteCount, ByteSizeError, Precision};
    use rust_decimal::Decimal;
    use std::cmp::Ordering;

    fn parse(value: &str) -> Result<Decimal, ByteSizeError> {
        Decimal::from_str_exact(value).map_err(|_| overflow(value))
    }

    fn overflow(value: &str) -> ByteSizeError {
        ByteSizeError::Overflow {
            value: value.to_string(),
            precision: Precision::BigDecimal,
        }
    }

    pub(super) fn scale(digits: &str, exponent: u32) -> Result<ByteCount, ByteSizeError> {
        let unit = Decimal::from(1024_u32);
        let mut product = parse(digits)?;
        for _ in 0..exponent {
            product = product.checked_mul(unit).ok_or_else(|| overflow(digits))?;
        }
        ByteCount::from_digits(&product.trunc().to_string()).ok_or_else(|| overflow(digits))
    }

    pub(super) fn compare(a: &ByteCount, b: &ByteCount) -> Result<Ordering, ByteSizeError> {
        Ok(parse(a.as_str())?.cmp(&parse(b.as_str())?))
    }
}

#[cfg(not(feature = "decimal"))]
mod big_decimal {
    use super::{ByteCount, ByteSizeError, Precision};
    use std::cmp::Ordering;

    pub(super) fn scale(_digits: &str, _exponent: u32) -> Result<ByteCount, ByteSizeError> {
        Err(ByteSizeError::Unavailable(Precision::BigDecimal))
    }

    pub(super) fn compare(_a: &ByteCount, _b: &ByteCount) -> Result<Ordering, ByteSizeError> {
        Err(ByteSizeError::Unavailable(Precision::BigDecimal))
    }
}
