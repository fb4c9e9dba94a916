//! Response extraction: locate the result set and turn each result into a
//! flat `Record`.
//!
//! # Design
//! Two ways of building a record exist. With requested fields, each field is
//! a path evaluated against the result; without, the whole result is
//! flattened into dotted keys. `Extraction` picks one per call so the search
//! and retrieve paths share the same code.
//!
//! Leaf values are always stored as text:
//! - strings verbatim
//! - numbers exactly as written in the response (`25`, `2.0`,
//!   `123456789012345678901`), kept by serde_json's `arbitrary_precision`
//! - booleans as `true` / `false`
//! - `null` as an absent value
//! - arrays, and objects selected by an explicit field path, as compact JSON

use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};
use crate::path::JsonPath;
use crate::template::RootPath;
use crate::types::Record;

/// Field name used when a result element is a bare scalar rather than an object.
pub const SCALAR_FIELD: &str = "value";

/// How records are built from result elements.
#[derive(Debug)]
pub enum Extraction {
    /// Recursively flatten every key.
    Flatten,
    /// Evaluate each requested field path. `None` marks a field whose path
    /// does not parse; it is always absent.
    Fields(Vec<(String, Option<JsonPath>)>),
}

impl Extraction {
    pub fn for_fields(fields: &[String]) -> Self {
        if fields.is_empty() {
            return Extraction::Flatten;
        }
        let compiled = fields
            .iter()
            .map(|field| match JsonPath::parse(field) {
                Ok(path) => (field.clone(), Some(path)),
                Err(e) => {
                    tracing::warn!(field = %field, error = %e, "requested field is not a valid path");
                    (field.clone(), None)
                }
            })
            .collect();
        Extraction::Fields(compiled)
    }

    pub fn record(&self, element: &Value) -> Record {
        let mut record = Record::new();
        match self {
            Extraction::Flatten => match element {
                Value::Object(map) => flatten_into(map, "", &mut record),
                other => record.insert(SCALAR_FIELD, to_text(other)),
            },
            Extraction::Fields(fields) => {
                for (field, path) in fields {
                    let value = path.as_ref().and_then(|path| field_value(element, path));
                    record.insert(field.as_str(), value);
                }
            }
        }
        record
    }
}

/// The located result set.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultRoot {
    Many(Vec<Value>),
    One(Value),
}

impl ResultRoot {
    pub fn len(&self) -> usize {
        match self {
            ResultRoot::Many(items) => items.len(),
            ResultRoot::One(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_elements(self) -> Vec<Value> {
        match self {
            ResultRoot::Many(items) => items,
            ResultRoot::One(value) => vec![value],
        }
    }
}

/// Parse a raw response body.
pub fn parse_document(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| BridgeError::InvalidResponse(e.to_string()))
}

/// Resolve `root` against `document`.
///
/// A single match must be an array (one result per element) or an object
/// (one result). Several matches of an indefinite path are each a result;
/// an indefinite path matching nothing is an empty result set.
pub fn resolve_root(document: &Value, root: &RootPath) -> Result<ResultRoot> {
    let expr = root.as_str();
    let malformed = |reason: String| BridgeError::MalformedRootPath {
        path: expr.to_string(),
        reason,
    };
    let path = JsonPath::parse(expr).map_err(|e| malformed(e.to_string()))?;
    let definite = path.is_definite();
    let mut matches = path.select(document);

    if matches.len() == 1 {
        return match matches.remove(0) {
            Value::Array(items) => Ok(ResultRoot::Many(items)),
            value @ Value::Object(_) => Ok(ResultRoot::One(value)),
            other if !definite => Ok(ResultRoot::Many(vec![other])),
            other => Err(malformed(format!("expected an array or object, found {}", kind(&other)))),
        };
    }
    if matches.is_empty() && definite {
        return Err(malformed("path does not exist in the response".to_string()));
    }
    Ok(ResultRoot::Many(matches))
}

/// Build one record per result element.
pub fn extract(document: &Value, root: &RootPath, fields: &[String]) -> Result<Vec<Record>> {
    let extraction = Extraction::for_fields(fields);
    let root = resolve_root(document, root)?;
    Ok(root
        .into_elements()
        .iter()
        .map(|element| extraction.record(element))
        .collect())
}

/// Build the record of a query expected to match at most one result.
pub fn extract_single(document: &Value, root: &RootPath, fields: &[String]) -> Result<Option<Record>> {
    let extraction = Extraction::for_fields(fields);
    match resolve_root(document, root)? {
        ResultRoot::One(value) => Ok(Some(extraction.record(&value))),
        ResultRoot::Many(items) => match items.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(extraction.record(only))),
            _ => Err(BridgeError::MultipleResultsForSingleMatch { matched: items.len() }),
        },
    }
}

/// Total hits reported by the server: `hits.total`, either a number or
/// `{"value": n, "relation": ...}`.
pub fn total_hits(document: &Value) -> Result<u64> {
    let total = document.get("hits").and_then(|hits| hits.get("total"));
    total
        .and_then(|t| t.as_u64().or_else(|| t.get("value").and_then(Value::as_u64)))
        .ok_or_else(|| BridgeError::MalformedRootPath {
            path: "$.hits.total".to_string(),
            reason: match total {
                Some(other) => format!("expected a hit count, found {}", kind(other)),
                None => "path does not exist in the response".to_string(),
            },
        })
}

/// Flatten `map` into `record`, prefixing keys with `prefix`.
pub fn flatten_into(map: &Map<String, Value>, prefix: &str, record: &mut Record) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => flatten_into(nested, &path, record),
            other => record.insert(path, to_text(other)),
        }
    }
}

/// Flatten a whole object into a new record.
pub fn flatten(value: &Map<String, Value>) -> Record {
    let mut record = Record::new();
    flatten_into(value, "", &mut record);
    record
}

fn field_value(element: &Value, path: &JsonPath) -> Option<String> {
    if path.is_definite() {
        path.select_one(element).as_ref().and_then(to_text)
    } else {
        Some(Value::Array(path.select(element)).to_string())
    }
}

/// Text for a selected value. Only `null` has none.
pub fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
