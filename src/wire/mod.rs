//! Translation between caller records and the service's JSON wire format.
//!
//! Records are written in lowerCamelCase on the Rust side
//! (`#[serde(rename_all = "camelCase")]`) and travel as snake_case JSON. The
//! mapper renames keys only; values pass through untouched. Unknown wire
//! fields are dropped on the way in, so the service can add fields without
//! breaking older clients.

mod case;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{Error, Result};

pub use case::{camel_to_snake, snake_to_camel};

/// A logical field that the wire carries under two historical names.
///
/// Both names are wire (snake_case) names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAlias {
    pub canonical: &'static str,
    pub legacy: &'static str,
}

impl FieldAlias {
    pub const fn new(canonical: &'static str, legacy: &'static str) -> Self {
        Self { canonical, legacy }
    }
}

/// Per-shape wire metadata.
pub trait WireShape {
    /// Legacy names emitted next to their canonical field. The duplication
    /// is part of the wire contract with older servers.
    const ALIASES: &'static [FieldAlias] = &[];
}

impl WireShape for Value {}

impl WireShape for Map<String, Value> {}

/// Wire payload that failed to parse or to fit the expected shape.
#[derive(Debug, Error)]
#[error("Failed to deserialize response: {source}. Raw text: {raw}")]
pub struct DeserializationError {
    /// The offending text, for diagnostics.
    pub raw: String,
    #[source]
    pub source: serde_json::Error,
}

/// Serializes `record` to compact snake_case JSON.
///
/// Null fields are omitted, and each declared alias is filled from its
/// canonical field.
pub fn to_wire<T: Serialize + WireShape>(record: &T) -> Result<String> {
    let value = serde_json::to_value(record).map_err(Error::Serialization)?;
    let mut value = drop_nulls(case::rename_keys(value, &camel_to_snake));

    if let Value::Object(map) = &mut value {
        for alias in T::ALIASES {
            if let Some(canonical) = map.get(alias.canonical).cloned() {
                map.entry(alias.legacy).or_insert(canonical);
            }
        }
    }

    serde_json::to_string(&value).map_err(Error::Serialization)
}

/// Parses snake_case JSON into `T`.
///
/// Fields `T` does not know are ignored; fields the text lacks keep their
/// default (target shapes use `#[serde(default)]`). A missing canonical field
/// is taken from its legacy alias.
pub fn from_wire<T: DeserializeOwned + WireShape>(text: &str) -> Result<T> {
    let mut value = parse(text)?;

    if let Value::Object(map) = &mut value {
        for alias in T::ALIASES {
            if !map.contains_key(alias.canonical) {
                if let Some(legacy) = map.get(alias.legacy).cloned() {
                    map.insert(alias.canonical.to_string(), legacy);
                }
            }
        }
    }

    let value = case::rename_keys(value, &snake_to_camel);
    serde_json::from_value(value).map_err(|source| {
        Error::Deserialization(DeserializationError {
            raw: text.to_string(),
            source,
        })
    })
}

/// Parses wire text into a generic JSON value.
pub fn parse(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|source| {
        Error::Deserialization(DeserializationError {
            raw: text.to_string(),
            source,
        })
    })
}

fn drop_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, drop_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(drop_nulls).collect()),
        other => other,
    }
}
