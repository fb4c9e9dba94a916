//! Bridge request and result types.
//!
//! # Design
//! `BridgeRequest` mirrors what a hosting bridge hands an adapter: a
//! structure (index, optionally `index/type`), a query template, its bound
//! parameters, the requested fields and free-form string metadata
//! (`pageSize`, `offset`, `order`). Results are flat records whose values are
//! always text, so output does not depend on how the server typed a number.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Metadata key for the page size.
pub const PAGE_SIZE: &str = "pageSize";
/// Metadata key for the page offset.
pub const OFFSET: &str = "offset";
/// Metadata key for the sort specification.
pub const ORDER: &str = "order";

/// One adapter call as issued by the bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    pub structure: String,
    pub query: String,
    #[serde(default)]
    pub parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl BridgeRequest {
    pub fn new(structure: &str, query: &str) -> Self {
        Self {
            structure: structure.to_string(),
            query: query.to_string(),
            ..Self::default()
        }
    }

    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        self.parameters
            .get_or_insert_with(HashMap::new)
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_page_size(self, page_size: &str) -> Self {
        self.with_metadata(PAGE_SIZE, page_size)
    }

    pub fn with_offset(self, offset: &str) -> Self {
        self.with_metadata(OFFSET, offset)
    }

    pub fn with_order(self, order: &str) -> Self {
        self.with_metadata(ORDER, order)
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// A flat mapping from dotted field path to text value.
///
/// A `None` value means the field was requested but did not resolve, or the
/// document held `null` there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Option<String>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Option<String>) {
        self.fields.insert(field.into(), value);
    }

    /// The value of `field`, if it is present and non-null.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_deref())
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        }
    }
}

/// Page metadata reported alongside a `RecordList`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Total hits as reported by the server.
    pub count: u64,
    /// Number of records in this page.
    pub size: usize,
}

/// Result of a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordList {
    pub fields: Vec<String>,
    pub records: Vec<Record>,
    pub metadata: ResultMetadata,
}

/// Result of a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Count(pub u64);

impl Count {
    pub fn value(self) -> u64 {
        self.0
    }
}
