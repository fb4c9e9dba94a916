//! Request builder: turns a bridge request into an Elasticsearch URL and body.

use std::fmt;
use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use url::form_urlencoded;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::http::HttpRequest;
use crate::parser;
use crate::template::{QueryMode, QueryTemplate, RootPath};
use crate::types::{BridgeRequest, OFFSET, ORDER, PAGE_SIZE};

pub const DEFAULT_PAGE_SIZE: u64 = 1000;
pub const DEFAULT_OFFSET: u64 = 0;

static FIELD_ORDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^<%=\s*field\["?(.*?)"?\]\s*%>(?::(\w+))?$"#).expect("order pattern compiles")
});

/// Elasticsearch endpoint to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    Search,
    Count,
}

impl SearchMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMethod::Search => "search",
            SearchMethod::Count => "count",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page size and offset after defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page_size: u64,
    pub offset: u64,
}

impl Pagination {
    /// Read `pageSize` and `offset` from request metadata.
    ///
    /// A blank or `"0"` page size and a blank offset fall back to defaults.
    pub fn from_request(request: &BridgeRequest) -> Result<Self> {
        let page_size = match request.metadata(PAGE_SIZE).map(str::trim) {
            Some(v) if !v.is_empty() && v != "0" => parse_count(PAGE_SIZE, v)?,
            _ => DEFAULT_PAGE_SIZE,
        };
        let offset = match request.metadata(OFFSET).map(str::trim) {
            Some(v) if !v.is_empty() => parse_count(OFFSET, v)?,
            _ => DEFAULT_OFFSET,
        };
        Ok(Self { page_size, offset })
    }
}

fn parse_count(key: &str, value: &str) -> Result<u64> {
    value.parse().map_err(|_| BridgeError::InvalidMetadata {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Ordered list of sort fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder(pub Vec<(String, SortDirection)>);

impl SortOrder {
    /// Parse the bridge `order` metadata.
    ///
    /// Entries are comma separated and look like `<%=field["name"]%>:DESC` or
    /// `name:DESC`. Anything other than `DESC` (case-insensitive) sorts
    /// ascending.
    pub fn parse(order: &str) -> Self {
        let entries = order
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                let (field, direction) = match FIELD_ORDER.captures(entry) {
                    Some(caps) => (
                        caps.get(1).map_or("", |m| m.as_str()),
                        caps.get(2).map_or("", |m| m.as_str()),
                    ),
                    None => entry.rsplit_once(':').unwrap_or((entry, "")),
                };
                let field = field.trim();
                if field.is_empty() {
                    return None;
                }
                let direction = if direction.trim().eq_ignore_ascii_case("DESC") {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                };
                Some((field.to_string(), direction))
            })
            .collect();
        Self(entries)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `sort` parameter value: `field:asc,other:desc`.
    pub fn to_param(&self) -> String {
        self.0
            .iter()
            .map(|(field, direction)| {
                let direction = match direction {
                    SortDirection::Asc => "asc",
                    SortDirection::Desc => "desc",
                };
                format!("{}:{direction}", strip_source_prefix(field))
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// `_source.app.name` → `app.name`; Elasticsearch addresses source fields directly.
pub fn strip_source_prefix(field: &str) -> &str {
    field.strip_prefix("_source.").unwrap_or(field)
}

/// Accumulates `?name=value&...` onto a base URL.
struct UrlBuilder {
    url: String,
    first: bool,
}

impl UrlBuilder {
    fn new(base: String) -> Self {
        Self { url: base, first: true }
    }

    fn param(&mut self, name: &str, value: &str) {
        self.url.push(if self.first { '?' } else { '&' });
        self.first = false;
        self.url.extend(form_urlencoded::byte_serialize(name.as_bytes()));
        self.url.push('=');
        self.url.extend(form_urlencoded::byte_serialize(value.as_bytes()));
    }

    fn finish(self) -> String {
        self.url
    }
}

/// Build the URL for `method` from a template already split from its root.
///
/// `resolved` is the substituted query text; it is only placed in the URL in
/// query-string mode.
pub fn build_url(
    endpoint: &str,
    method: SearchMethod,
    request: &BridgeRequest,
    template: &QueryTemplate<'_>,
    resolved: &str,
) -> Result<String> {
    let pagination = Pagination::from_request(request)?;
    let mut url = UrlBuilder::new(format!("{endpoint}/{}/_{method}", request.structure));

    if template.mode() == QueryMode::QueryString {
        url.param("q", resolved);
    }

    if method == SearchMethod::Search {
        url.param("size", &pagination.page_size.to_string());
        url.param("from", &pagination.offset.to_string());

        if !request.fields.is_empty() && template.root == RootPath::Default {
            let source = request
                .fields
                .iter()
                .map(|field| strip_source_prefix(field))
                .collect::<Vec<_>>()
                .join(",");
            url.param("_source", &source);
        }

        if let Some(order) = request.metadata(ORDER) {
            let order = SortOrder::parse(order);
            if !order.is_empty() {
                url.param("sort", &order.to_param());
            }
        }
    }

    Ok(url.finish())
}

/// Build the complete request for `method`, including body and auth header.
pub fn build(config: &BridgeConfig, method: SearchMethod, request: &BridgeRequest) -> Result<HttpRequest> {
    let template = QueryTemplate::split(&request.query);
    let resolved = parser::parse(template.text, request.parameters.as_ref())?;
    let url = build_url(&config.elastic_url, method, request, &template, &resolved)?;

    tracing::debug!(%url, mode = ?template.mode(), root = template.root.as_str(), "built {method} request");

    let mut http = HttpRequest::get(url);
    if let Some(header) = basic_auth_header(config) {
        http.headers.push(("authorization".to_string(), header));
    }
    if template.mode() == QueryMode::RequestBody {
        http.headers
            .push(("content-type".to_string(), "application/json".to_string()));
        http.body = Some(resolved);
    }
    Ok(http)
}

pub(crate) fn basic_auth_header(config: &BridgeConfig) -> Option<String> {
    config
        .credentials()
        .map(|(username, password)| format!("Basic {}", STANDARD.encode(format!("{username}:{password}"))))
}
