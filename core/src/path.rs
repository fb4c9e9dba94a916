//! JSON path expressions for result roots and requested fields.
//!
//! Expressions starting with `$` are full JSONPath (recursive descent,
//! filters, slices, wildcards) evaluated by `jsonpath-rust`. A requested
//! field may also be a plain dotted name relative to the result, such as
//! `_source.app.name` or `_source.number test`; those are rewritten to
//! bracket notation so keys with spaces survive.

use std::fmt;
use std::sync::LazyLock;

use jsonpath_rust::JsonPathValue;
use regex::Regex;
use serde_json::Value;

// Only child keys and non-negative indexes: selects at most one value.
static DEFINITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\$(?:\.[A-Za-z0-9_\-/\\#]+|\[\d+\]|\['[^']*'\]|\["[^"]*"\])*$"#)
        .expect("definite path pattern compiles")
});

/// A compiled path expression.
pub struct JsonPath {
    expr: String,
    compiled: jsonpath_rust::JsonPath,
}

impl fmt::Debug for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JsonPath").field(&self.expr).finish()
    }
}

/// Why a path expression could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PathSyntaxError(String);

impl JsonPath {
    pub fn parse(expr: &str) -> Result<Self, PathSyntaxError> {
        let expr = normalize(expr.trim())?;
        let compiled = expr
            .parse::<jsonpath_rust::JsonPath>()
            .map_err(|e| PathSyntaxError(format!("invalid path '{expr}': {e}")))?;
        Ok(Self { expr, compiled })
    }

    /// The expression as evaluated, always starting with `$`.
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// A definite path selects at most one value.
    pub fn is_definite(&self) -> bool {
        DEFINITE.is_match(&self.expr)
    }

    /// All values the path selects under `root`, in document order.
    pub fn select(&self, root: &Value) -> Vec<Value> {
        self.compiled
            .find_slice(root)
            .into_iter()
            .filter(|found| found.has_value())
            .map(JsonPathValue::to_data)
            .collect()
    }

    /// The first value the path selects.
    pub fn select_one(&self, root: &Value) -> Option<Value> {
        self.select(root).into_iter().next()
    }
}

fn normalize(expr: &str) -> Result<String, PathSyntaxError> {
    if expr.is_empty() {
        return Err(PathSyntaxError("empty path".to_string()));
    }
    if expr.starts_with('$') {
        return Ok(expr.to_string());
    }
    if expr.starts_with('[') {
        return Ok(format!("${expr}"));
    }
    if expr.contains(['[', '*']) {
        return Ok(format!("$.{expr}"));
    }

    let mut path = String::from("$");
    for key in expr.split('.') {
        if key.is_empty() {
            return Err(PathSyntaxError(format!("empty key in '{expr}'")));
        }
        if key.contains('\'') {
            path.push_str(&format!("[\"{key}\"]"));
        } else {
            path.push_str(&format!("['{key}']"));
        }
    }
    Ok(path)
}
