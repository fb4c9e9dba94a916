//! Placeholder substitution and escaping.
//!
//! # Design
//! The same `<%= parameter["name"] %>` syntax feeds two protocols. Which
//! escaping applies is decided once from the un-substituted template, so a
//! parameter value can never switch the mode of the query it lands in.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{BridgeError, Result};
use crate::template::{QueryMode, PLACEHOLDER};

// Lucene reserved characters plus whitespace. `&` and `|` are only reserved
// in pairs and are handled after this pass. `$` is not reserved.
static RESERVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([+\-=~><"?^{}()\[\]:!/\\*]|\s)"#).expect("reserved character pattern compiles")
});

/// Substitute every placeholder in `template` with its escaped binding.
///
/// Fails on the first placeholder whose name is not bound; nothing is
/// returned for a partially substituted template.
pub fn parse(template: &str, parameters: Option<&HashMap<String, String>>) -> Result<String> {
    let mode = QueryMode::of(template);
    let mut resolved = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str();
        let parameters = parameters.ok_or_else(|| BridgeError::MissingParameterBinding {
            name: name.to_string(),
            parameters_provided: false,
        })?;
        let value = parameters
            .get(name)
            .ok_or_else(|| BridgeError::MissingParameterBinding {
                name: name.to_string(),
                parameters_provided: true,
            })?;

        resolved.push_str(&template[last..whole.start()]);
        match mode {
            QueryMode::RequestBody => resolved.push_str(&escape_json(value)?),
            QueryMode::QueryString => resolved.push_str(&escape_query_string(value)),
        }
        last = whole.end();
    }

    resolved.push_str(&template[last..]);
    Ok(resolved)
}

/// Escape `value` so the query-string parser treats it as literal text.
pub fn escape_query_string(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    RESERVED
        .replace_all(value, "\\${1}")
        .replace("||", "\\||")
        .replace("&&", "\\&&")
        .replace("AND", "\\A\\N\\D")
        .replace("OR", "\\O\\R")
        .replace("NOT", "\\N\\O\\T")
}

/// Escape `value` as the content of a JSON string literal, without quotes.
pub fn escape_json(value: &str) -> Result<String> {
    let quoted = serde_json::to_string(value).map_err(|e| BridgeError::EncodingError(e.to_string()))?;
    quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(str::to_string)
        .ok_or_else(|| BridgeError::EncodingError(format!("unexpected JSON encoding: {quoted}")))
}
