//! Query template syntax shared by the parser and the request builder.
//!
//! A bridge query is either a Lucene query string (sent as `q=`) or an
//! Elasticsearch request body (sent as the GET body). The mode is decided by
//! the first non-whitespace character of the template as written, before any
//! parameter is substituted.
//!
//! A request-body template may carry a root-path override:
//!
//! ```text
//! {"aggs":{"apps":{"terms":{"field":"app.name"}}}}|$.aggregations.apps.buckets
//! ```
//!
//! The part before `|` is the body that is sent; the `$...` part replaces the
//! default result root `$.hits.hits` for that one call.

use std::sync::LazyLock;

use regex::Regex;

/// Placeholder referencing a bound parameter, e.g. `<%= parameter["log level"] %>`.
pub const PLACEHOLDER_PATTERN: &str = r#"<%=\s*parameter\["?(.*?)"?\]\s*%>"#;

/// Body template followed by `|` and a result root path.
pub const ROOT_OVERRIDE_PATTERN: &str = r"(?s)^(\{.*?\})\|(\$\..*)$";

/// Where search hits live in a standard search response.
pub const DEFAULT_ROOT_PATH: &str = "$.hits.hits";

pub(crate) static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PLACEHOLDER_PATTERN).expect("placeholder pattern compiles"));

static ROOT_OVERRIDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ROOT_OVERRIDE_PATTERN).expect("root override pattern compiles"));

/// How a resolved query travels to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Lucene syntax in the `q` URL parameter.
    QueryString,
    /// JSON request body.
    RequestBody,
}

impl QueryMode {
    pub fn of(template: &str) -> Self {
        if template.trim_start().starts_with('{') {
            QueryMode::RequestBody
        } else {
            QueryMode::QueryString
        }
    }
}

/// Location of the result set inside a response document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootPath {
    Default,
    Override(String),
}

impl RootPath {
    pub fn as_str(&self) -> &str {
        match self {
            RootPath::Default => DEFAULT_ROOT_PATH,
            RootPath::Override(path) => path,
        }
    }

    pub fn is_override(&self) -> bool {
        matches!(self, RootPath::Override(_))
    }
}

/// A query template split into the text to resolve and its result root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate<'a> {
    pub text: &'a str,
    pub root: RootPath,
}

impl<'a> QueryTemplate<'a> {
    /// Split off a trailing `|$.path` root override, if any.
    pub fn split(query: &'a str) -> Self {
        let trimmed = query.trim();
        match ROOT_OVERRIDE.captures(trimmed) {
            Some(caps) => {
                let body = caps.get(1).map_or(trimmed, |m| m.as_str());
                let path = caps.get(2).map_or("", |m| m.as_str());
                Self {
                    text: body,
                    root: RootPath::Override(path.to_string()),
                }
            }
            None => Self {
                text: query,
                root: RootPath::Default,
            },
        }
    }

    pub fn mode(&self) -> QueryMode {
        QueryMode::of(self.text)
    }
}
