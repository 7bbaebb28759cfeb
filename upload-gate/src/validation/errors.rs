//! Recorded validation failures

use super::ImageType;
use crate::error::Rule;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Diagnostic value recorded for a failed rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorValue {
    /// The rule failed; there is nothing more specific to report
    Flag,
    /// Offending text, e.g. a filename or an extension
    Text(String),
    /// Offending size in bytes
    Bytes(u64),
    /// Offending width or height in pixels
    Pixels(u32),
    /// Detected image type, `None` when detection failed
    ImageType(Option<ImageType>),
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => f.write_str("true"),
            Self::Text(text) => f.write_str(text),
            Self::Bytes(bytes) => write!(f, "{bytes}"),
            Self::Pixels(pixels) => write!(f, "{pixels}"),
            Self::ImageType(Some(kind)) => write!(f, "{kind}"),
            Self::ImageType(None) => f.write_str("unknown"),
        }
    }
}

impl Serialize for ErrorValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Flag => serializer.serialize_bool(true),
            Self::Text(text) => serializer.serialize_str(text),
            Self::Bytes(bytes) => serializer.serialize_u64(*bytes),
            Self::Pixels(pixels) => serializer.serialize_u32(*pixels),
            Self::ImageType(kind) => kind.serialize(serializer),
        }
    }
}

/// Failures recorded in accumulate mode, keyed by rule
///
/// Holds at most one entry per rule; recording a rule again replaces the
/// earlier value. Serializes as a map from rule name to value:
///
/// ```rust
/// use upload_gate::error::Rule;
/// use upload_gate::validation::{ErrorValue, ValidationErrors};
///
/// let mut errors = ValidationErrors::default();
/// errors.insert(Rule::Filesize, ErrorValue::Bytes(2000));
/// errors.insert(Rule::Extension, ErrorValue::Text("exe".into()));
///
/// let json = serde_json::to_string(&errors).unwrap();
/// assert_eq!(json, r#"{"filesize":2000,"extension":"exe"}"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<Rule, ErrorValue>);

impl ValidationErrors {
    /// Creates an empty set
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Records a failure, replacing any earlier value for the rule
    pub fn insert(&mut self, rule: Rule, value: ErrorValue) {
        self.0.insert(rule, value);
    }

    /// Returns the value recorded for `rule`
    #[must_use]
    pub fn get(&self, rule: Rule) -> Option<&ErrorValue> {
        self.0.get(&rule)
    }

    /// Returns true if `rule` has failed
    #[must_use]
    pub fn contains(&self, rule: Rule) -> bool {
        self.0.contains_key(&rule)
    }

    /// Returns true if nothing has failed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of failed rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Forgets all failures
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterates over failures in pipeline order
    pub fn iter(&self) -> impl Iterator<Item = (Rule, &ErrorValue)> {
        self.0.iter().map(|(rule, value)| (*rule, value))
    }
}
