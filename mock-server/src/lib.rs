//! In-memory stand-in for the slice of Elasticsearch the bridge talks to.
//!
//! Documents are indexed with `POST /{index}/_doc` and queried with
//! `GET|POST /{index}/_search` and `/{index}/_count`. The index may be a
//! multi-segment structure such as `examples/doc`, and a trailing `*` matches
//! every index with that prefix. A missing concrete index answers 404
//! `index_not_found_exception`. Supported queries:
//! - `q=` with `field:value` clauses (AND-joined, backslash escapes honoured)
//! - request bodies with `match_all`, `match`, `term` or `bool.must`
//! - `terms` aggregations, returned under `aggregations.{name}.buckets`
//!
//! Search responses use the classic shape where `hits.total` is a number.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source")]
    pub source: Value,
}

pub type Indices = Arc<RwLock<HashMap<String, Vec<Document>>>>;

#[derive(Clone, Default)]
pub struct AppState {
    pub indices: Indices,
    pub credentials: Option<(String, String)>,
}

pub fn app() -> Router {
    app_with_state(AppState::default())
}

/// A server that rejects requests lacking matching basic auth.
pub fn app_with_credentials(username: &str, password: &str) -> Router {
    app_with_state(AppState {
        indices: Indices::default(),
        credentials: Some((username.to_string(), password.to_string())),
    })
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/_cat/health", get(health))
        .route("/{*path}", get(dispatch).post(dispatch))
        .with_state(state)
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

fn error(status: StatusCode, reason: impl Into<String>) -> Response {
    let reason = reason.into();
    tracing::debug!(%status, %reason, "request rejected");
    (status, Json(json!({"error": {"reason": reason}, "status": status.as_u16()}))).into_response()
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some((username, password)) = &state.credentials else {
        return Ok(());
    };
    let expected = format!("Basic {}", STANDARD.encode(format!("{username}:{password}")));
    match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(actual) if actual == expected => Ok(()),
        _ => Err(error(StatusCode::UNAUTHORIZED, "missing authentication credentials")),
    }
}

async fn health(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    "1700000000 00:00:00 mock green 1 1 0 0 0 0 0 0 - 100.0%\n".into_response()
}

async fn dispatch(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    let Some((index, endpoint)) = path.trim_end_matches('/').rsplit_once('/') else {
        return error(StatusCode::NOT_FOUND, format!("no handler for [{path}]"));
    };
    let body = if body.trim().is_empty() {
        None
    } else {
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Some(value),
            Err(e) => return error(StatusCode::BAD_REQUEST, format!("failed to parse request body: {e}")),
        }
    };

    match endpoint {
        "_doc" => index_document(&state, index, body).await,
        "_search" => search(&state, index, &params, body.as_ref()).await,
        "_count" => count(&state, index, &params, body.as_ref()).await,
        other => error(StatusCode::NOT_FOUND, format!("no handler for [{other}]")),
    }
}

async fn index_document(state: &AppState, index: &str, body: Option<Value>) -> Response {
    let Some(source) = body.filter(Value::is_object) else {
        return error(StatusCode::BAD_REQUEST, "document body must be a JSON object");
    };
    let document = Document {
        id: Uuid::new_v4().to_string(),
        source,
    };
    let id = document.id.clone();
    state
        .indices
        .write()
        .await
        .entry(index.to_string())
        .or_default()
        .push(document);
    tracing::debug!(index, %id, "indexed document");
    (
        StatusCode::CREATED,
        Json(json!({"_index": index, "_id": id, "result": "created"})),
    )
        .into_response()
}

/// Documents of every index matching `pattern`.
///
/// A concrete index that does not exist is a 404; a wildcard matching
/// nothing is an empty result.
async fn documents(state: &AppState, pattern: &str) -> Result<Vec<(String, Document)>, Response> {
    let indices = state.indices.read().await;
    let wildcard = pattern.strip_suffix('*');
    if wildcard.is_none() && !indices.contains_key(pattern) {
        return Err(index_not_found(pattern));
    }
    let mut names: Vec<&String> = indices
        .keys()
        .filter(|name| match wildcard {
            Some(prefix) => name.starts_with(prefix),
            None => name.as_str() == pattern,
        })
        .collect();
    names.sort();
    let documents: Vec<(String, Document)> = names
        .into_iter()
        .flat_map(|name| indices[name].iter().map(move |doc| (name.clone(), doc.clone())))
        .collect();
    Ok(documents)
}

fn index_not_found(index: &str) -> Response {
    tracing::debug!(index, "index not found");
    let reason = format!("no such index [{index}]");
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": {"type": "index_not_found_exception", "reason": reason, "index": index},
            "status": 404
        })),
    )
        .into_response()
}

async fn matching(
    state: &AppState,
    index: &str,
    params: &HashMap<String, String>,
    body: Option<&Value>,
) -> Result<Vec<(String, Document)>, Response> {
    let clauses = match (params.get("q"), body.and_then(|b| b.get("query"))) {
        (Some(q), _) => parse_query_string(q),
        (None, Some(query)) => parse_query_body(query).map_err(|e| error(StatusCode::BAD_REQUEST, e))?,
        (None, None) => Vec::new(),
    };
    Ok(documents(state, index)
        .await?
        .into_iter()
        .filter(|(_, doc)| clauses.iter().all(|clause| clause.matches(&doc.source)))
        .collect())
}

async fn count(
    state: &AppState,
    index: &str,
    params: &HashMap<String, String>,
    body: Option<&Value>,
) -> Response {
    match matching(state, index, params, body).await {
        Ok(docs) => Json(json!({
            "count": docs.len(),
            "_shards": {"total": 1, "successful": 1, "skipped": 0, "failed": 0}
        }))
        .into_response(),
        Err(rejection) => rejection,
    }
}

async fn search(
    state: &AppState,
    index: &str,
    params: &HashMap<String, String>,
    body: Option<&Value>,
) -> Response {
    let mut docs = match matching(state, index, params, body).await {
        Ok(docs) => docs,
        Err(rejection) => return rejection,
    };
    let total = docs.len();

    let size = match page_param(params, body, "size", 10) {
        Ok(size) => size,
        Err(rejection) => return rejection,
    };
    let from = match page_param(params, body, "from", 0) {
        Ok(from) => from,
        Err(rejection) => return rejection,
    };

    if let Some(sort) = params.get("sort") {
        let keys: Vec<(&str, bool)> = sort
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| match s.rsplit_once(':') {
                Some((field, dir)) => (field, dir.eq_ignore_ascii_case("desc")),
                None => (s, false),
            })
            .collect();
        docs.sort_by(|(_, a), (_, b)| {
            keys.iter()
                .map(|(field, desc)| {
                    let ord = compare(lookup(&a.source, field), lookup(&b.source, field));
                    if *desc {
                        ord.reverse()
                    } else {
                        ord
                    }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }

    let includes: Option<Vec<&str>> = params
        .get("_source")
        .map(|s| s.split(',').filter(|f| !f.is_empty()).collect());

    let hits: Vec<Value> = docs
        .iter()
        .skip(from)
        .take(size)
        .map(|(index, doc)| {
            let source = match &includes {
                Some(fields) => filter_source(&doc.source, fields),
                None => doc.source.clone(),
            };
            json!({"_index": index, "_type": "_doc", "_id": doc.id, "_score": 1.0, "_source": source})
        })
        .collect();

    let max_score = if hits.is_empty() { Value::Null } else { json!(1.0) };
    let mut response = json!({
        "took": 1,
        "timed_out": false,
        "_shards": {"total": 1, "successful": 1, "skipped": 0, "failed": 0},
        "hits": {"total": total, "max_score": max_score, "hits": hits}
    });

    if let Some(aggs) = body.and_then(|b| b.get("aggs").or_else(|| b.get("aggregations"))) {
        match aggregate(aggs, &docs) {
            Ok(result) => response["aggregations"] = result,
            Err(reason) => return error(StatusCode::BAD_REQUEST, reason),
        }
    }

    Json(response).into_response()
}

fn page_param(
    params: &HashMap<String, String>,
    body: Option<&Value>,
    name: &str,
    default: usize,
) -> Result<usize, Response> {
    if let Some(raw) = params.get(name) {
        return raw
            .parse()
            .map_err(|_| error(StatusCode::BAD_REQUEST, format!("failed to parse [{name}] value [{raw}]")));
    }
    Ok(body
        .and_then(|b| b.get(name))
        .and_then(Value::as_u64)
        .map_or(default, |v| v as usize))
}

/// One `field:value` condition. A `None` field searches every leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Case-insensitive substring match, `*` matches any value.
    Match { field: Option<String>, value: String },
    /// Exact match on the text form of the value.
    Term { field: String, value: String },
}

impl Clause {
    pub fn matches(&self, source: &Value) -> bool {
        match self {
            Clause::Match { field, value } => {
                let candidates: Vec<&Value> = match field {
                    Some(field) => lookup(source, field).into_iter().collect(),
                    None => leaves(source),
                };
                candidates.into_iter().any(|candidate| {
                    value == "*"
                        || text(candidate)
                            .to_lowercase()
                            .contains(&value.to_lowercase())
                })
            }
            Clause::Term { field, value } => {
                lookup(source, field).is_some_and(|candidate| &text(candidate) == value)
            }
        }
    }
}

/// Parse the small Lucene subset the bridge sends: whitespace separated
/// `field:value` terms, `AND` connectives, backslash escapes and quoted phrases.
pub fn parse_query_string(q: &str) -> Vec<Clause> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = q.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                // Escaped characters are literal and never split or quote.
                current.push('\u{0}');
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
        .into_iter()
        .filter(|token| token != "AND")
        .map(|token| {
            // Split at the first unescaped colon.
            let mut split = None;
            let mut previous = None;
            for (i, c) in token.char_indices() {
                if c == ':' && previous != Some('\u{0}') {
                    split = Some(i);
                    break;
                }
                previous = Some(c);
            }
            let unescape = |s: &str| s.replace('\u{0}', "");
            match split {
                Some(i) => Clause::Match {
                    field: Some(unescape(&token[..i])),
                    value: unescape(&token[i + 1..]),
                },
                None => Clause::Match {
                    field: None,
                    value: unescape(&token),
                },
            }
        })
        .collect()
}

/// Parse the `query` object of a request body.
pub fn parse_query_body(query: &Value) -> Result<Vec<Clause>, String> {
    let Some(object) = query.as_object() else {
        return Err("[query] must be an object".to_string());
    };
    let mut clauses = Vec::new();
    for (kind, clause) in object {
        match kind.as_str() {
            "match_all" => {}
            "match" | "term" => {
                let Some(fields) = clause.as_object() else {
                    return Err(format!("[{kind}] must be an object"));
                };
                for (field, value) in fields {
                    // Both accept the short form and the {"query"|"value": ...} form.
                    let value = value
                        .get("query")
                        .or_else(|| value.get("value"))
                        .unwrap_or(value);
                    let value = text(value);
                    clauses.push(if kind == "match" {
                        Clause::Match {
                            field: Some(field.clone()),
                            value,
                        }
                    } else {
                        Clause::Term {
                            field: field.clone(),
                            value,
                        }
                    });
                }
            }
            "bool" => {
                let must = clause.get("must").cloned().unwrap_or(Value::Null);
                let must = match must {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    single => vec![single],
                };
                for item in &must {
                    clauses.extend(parse_query_body(item)?);
                }
            }
            other => return Err(format!("unknown query [{other}]")),
        }
    }
    Ok(clauses)
}

/// `terms` aggregations only.
fn aggregate(aggs: &Value, docs: &[(String, Document)]) -> Result<Value, String> {
    let Some(aggs) = aggs.as_object() else {
        return Err("[aggs] must be an object".to_string());
    };
    let mut result = Map::new();
    for (name, agg) in aggs {
        let Some(field) = agg.get("terms").and_then(|t| t.get("field")).and_then(Value::as_str) else {
            return Err(format!("aggregation [{name}] is not a terms aggregation"));
        };
        let mut counts: Vec<(String, usize)> = Vec::new();
        for (_, doc) in docs {
            if let Some(value) = lookup(&doc.source, field) {
                let key = text(value);
                match counts.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((key, 1)),
                }
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let buckets: Vec<Value> = counts
            .into_iter()
            .map(|(key, doc_count)| json!({"key": key, "doc_count": doc_count}))
            .collect();
        result.insert(
            name.clone(),
            json!({"doc_count_error_upper_bound": 0, "sum_other_doc_count": 0, "buckets": buckets}),
        );
    }
    Ok(Value::Object(result))
}

/// Value at a dotted path inside a document source.
pub fn lookup<'v>(source: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(source, |node, key| node.get(key))
}

fn leaves(source: &Value) -> Vec<&Value> {
    match source {
        Value::Object(map) => map.values().flat_map(leaves).collect(),
        Value::Array(items) => items.iter().flat_map(leaves).collect(),
        other => vec![other],
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => text(x).cmp(&text(y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Keep only the dotted `fields` of `source`, preserving nesting.
fn filter_source(source: &Value, fields: &[&str]) -> Value {
    let mut filtered = Map::new();
    for field in fields {
        if let Some(value) = lookup(source, field) {
            let parts: Vec<&str> = field.split('.').collect();
            insert_path(&mut filtered, &parts, value.clone());
        }
    }
    Value::Object(filtered)
}

fn insert_path(target: &mut Map<String, Value>, parts: &[&str], value: Value) {
    match parts {
        [] => {}
        [last] => {
            target.insert(last.to_string(), value);
        }
        [first, rest @ ..] => {
            let child = target
                .entry(first.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Value {
        json!({"message": "This is an error.", "level": "error", "app": {"name": "Bridgehub", "port": 8080}})
    }

    #[test]
    fn query_string_field_match() {
        let clauses = parse_query_string("message:error");
        assert_eq!(
            clauses,
            vec![Clause::Match {
                field: Some("message".to_string()),
                value: "error".to_string()
            }]
        );
        assert!(clauses[0].matches(&source()));
    }

    #[test]
    fn query_string_honours_escapes() {
        let clauses = parse_query_string(r#"message:This\ is\ an\ error. AND app.name:Bridge"#);
        assert_eq!(clauses.len(), 2);
        assert!(clauses.iter().all(|c| c.matches(&source())));

        let clauses = parse_query_string(r"level:\e\r\r\o\r");
        assert!(clauses[0].matches(&source()));
    }

    #[test]
    fn query_string_quoted_phrase() {
        let clauses = parse_query_string(r#"message:"an error""#);
        assert_eq!(clauses.len(), 1);
        assert!(clauses[0].matches(&source()));
    }

    #[test]
    fn query_string_escaped_colon_is_part_of_value() {
        let clauses = parse_query_string(r"a\:b");
        assert_eq!(
            clauses,
            vec![Clause::Match {
                field: None,
                value: "a:b".to_string()
            }]
        );
    }

    #[test]
    fn star_matches_everything() {
        assert!(parse_query_string("*")[0].matches(&source()));
    }

    #[test]
    fn body_queries() {
        let clauses = parse_query_body(&json!({"bool": {"must": [
            {"match": {"message": "error"}},
            {"term": {"app.port": 8080}}
        ]}}))
        .unwrap();
        assert_eq!(clauses.len(), 2);
        assert!(clauses.iter().all(|c| c.matches(&source())));
        assert!(parse_query_body(&json!({"match_all": {}})).unwrap().is_empty());
        assert!(parse_query_body(&json!({"fuzzy": {}})).is_err());
    }

    #[test]
    fn filter_source_keeps_nesting() {
        let filtered = filter_source(&source(), &["app.name", "missing"]);
        assert_eq!(filtered, json!({"app": {"name": "Bridgehub"}}));
    }
}
