//! Turning extracted JSON into typed domain objects.
//!
//! The extracted value is normalized to a list of JSON objects ("records"):
//! a single object becomes a one-element list, a list of objects is used as
//! is, and any other shape is a decode failure. Each record is then handed
//! to the target type's [`FromRecord`] factory. Records the factory rejects
//! are dropped, so the output may be shorter than the input.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// One JSON object, as handed to a [`FromRecord`] factory.
pub type Record = Map<String, Value>;

/// Factory contract for types a response can be materialized into.
///
/// Return `None` when the record is invalid or incomplete; the record is
/// then skipped without failing the request.
///
/// # Examples
///
/// ```
/// use courier::{FromRecord, Record};
///
/// struct Weather {
///     conditions: String,
///     icon_url: String,
/// }
///
/// impl FromRecord for Weather {
///     fn from_record(record: &Record) -> Option<Self> {
///         Some(Weather {
///             conditions: record.get("conditions")?.as_str()?.to_string(),
///             icon_url: record.get("icon_url")?.as_str()?.to_string(),
///         })
///     }
/// }
/// ```
pub trait FromRecord: Sized {
    /// Attempts to build an instance from one record.
    fn from_record(record: &Record) -> Option<Self>;
}

/// Requests without a factory get the raw records back.
impl FromRecord for Record {
    fn from_record(record: &Record) -> Option<Self> {
        Some(record.clone())
    }
}

/// Adapter for types that already implement `Deserialize`.
///
/// A record that fails to deserialize is skipped like any other rejected
/// record.
///
/// ```
/// use courier::{Decoded, FromRecord, Record};
/// use serde::Deserialize;
/// use serde_json::json;
///
/// #[derive(Deserialize)]
/// struct Thing { id: u64 }
///
/// let record: Record = json!({"id": 7}).as_object().unwrap().clone();
/// let thing = Decoded::<Thing>::from_record(&record).unwrap();
/// assert_eq!(thing.0.id, 7);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T>(pub T);

impl<T: DeserializeOwned> FromRecord for Decoded<T> {
    fn from_record(record: &Record) -> Option<Self> {
        serde_json::from_value(Value::Object(record.clone()))
            .ok()
            .map(Decoded)
    }
}

impl<T> Decoded<T> {
    /// Unwraps the decoded value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Normalizes `value` into records and materializes each one as `T`.
///
/// Output order matches input order; nothing is reordered or deduplicated.
///
/// # Errors
///
/// Returns [`Error::JsonDecode`] when `value` is neither an object nor an
/// array whose every element is an object.
pub fn materialize<T: FromRecord>(value: &Value) -> Result<Vec<T>> {
    let records = records(value)?;
    let total = records.len();

    let objects: Vec<T> = records.into_iter().filter_map(T::from_record).collect();

    if objects.len() < total {
        tracing::debug!(
            records = total,
            materialized = objects.len(),
            "Skipped records rejected by the factory"
        );
    }

    Ok(objects)
}

fn records(value: &Value) -> Result<Vec<&Record>> {
    match value {
        Value::Object(map) => Ok(vec![map]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_object().ok_or_else(|| shape_error(value)))
            .collect(),
        _ => Err(shape_error(value)),
    }
}

fn shape_error(value: &Value) -> Error {
    Error::JsonDecode {
        raw_response: value.to_string(),
        serde_error: "expected a JSON object or an array of JSON objects".to_string(),
    }
}
