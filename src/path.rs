//! Dotted key paths into JSON documents.
//!
//! A [`KeyPath`] such as `"forecast.simpleforecast.forecastday"` names a
//! location inside nested JSON objects. Segments only ever name object keys;
//! there is no array indexing and no wildcard support.

use crate::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A parsed, validated dotted key path.
///
/// The empty path is valid and selects the whole document.
///
/// # Examples
///
/// ```
/// use courier::KeyPath;
/// use serde_json::json;
///
/// let doc = json!({"a": {"b": [{"x": 1}]}});
/// let path = KeyPath::parse("a.b").unwrap();
/// assert_eq!(path.extract(&doc).unwrap(), &json!([{"x": 1}]));
///
/// assert!(KeyPath::parse("a..b").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Parses a dotted path.
    ///
    /// `""` parses to the empty path. Any empty segment (`"a..b"`, `".a"`,
    /// `"a."`) is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKeyPath`] if a segment is empty.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Ok(Self::default());
        }

        let segments: Vec<String> = path.split('.').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(Error::InvalidKeyPath {
                path: path.to_string(),
            });
        }

        Ok(Self { segments })
    }

    /// The ordered path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns `true` for the empty path.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Walks the path through `json`, left to right.
    ///
    /// The empty path returns `json` itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadJsonKey`] carrying the full path as soon as a segment
    /// is missing, or when an intermediate value is not an object.
    pub fn extract<'a>(&self, json: &'a Value) -> Result<&'a Value> {
        self.segments.iter().try_fold(json, |interior, key| {
            interior
                .as_object()
                .and_then(|map| map.get(key))
                .ok_or_else(|| Error::BadJsonKey {
                    path: self.to_string(),
                })
        })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for KeyPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
