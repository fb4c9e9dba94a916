//! Stateless request builder and response parser for the Elasticsearch bridge.
//!
//! # Design
//! `ElasticBridge` holds only its `BridgeConfig` and carries no mutable state
//! between calls. Each operation is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes the
//! `HttpResponse`. The result root (default or overridden by the query) is
//! derived from the `BridgeRequest` inside each call, so concurrent requests
//! with different roots cannot affect each other.

use std::collections::HashMap;

use tracing::instrument;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::extract;
use crate::http::{HttpRequest, HttpResponse};
use crate::request::{self, SearchMethod};
use crate::template::QueryTemplate;
use crate::types::{BridgeRequest, Count, Record, RecordList, ResultMetadata};

/// Synchronous, stateless Elasticsearch adapter.
///
/// Builds `HttpRequest` values and parses `HttpResponse` values without
/// touching the network. The caller executes the HTTP round-trip between
/// `build_*` and `parse_*`.
#[derive(Debug, Clone)]
pub struct ElasticBridge {
    config: BridgeConfig,
}

impl ElasticBridge {
    pub const NAME: &'static str = "Elasticsearch Bridge";

    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Build an adapter from the bridge's `Username` / `Password` /
    /// `Elastic URL` properties.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        BridgeConfig::from_properties(properties).map(Self::new)
    }

    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Request for `_cat/health`, used to validate the endpoint and credentials.
    pub fn build_health_check(&self) -> HttpRequest {
        let mut http = HttpRequest::get(format!("{}/_cat/health", self.config.elastic_url));
        if let Some(header) = request::basic_auth_header(&self.config) {
            http.headers.push(("authorization".to_string(), header));
        }
        http
    }

    pub fn parse_health_check(&self, response: HttpResponse) -> Result<()> {
        if response.status == 401 {
            return Err(BridgeError::Unauthorized);
        }
        check_status(&response)
    }

    /// The URL `method` would call for `request`.
    pub fn build_url(&self, method: SearchMethod, request: &BridgeRequest) -> Result<String> {
        request::build(&self.config, method, request).map(|http| http.url)
    }

    pub fn build_count(&self, request: &BridgeRequest) -> Result<HttpRequest> {
        request::build(&self.config, SearchMethod::Count, request)
    }

    pub fn build_search(&self, request: &BridgeRequest) -> Result<HttpRequest> {
        request::build(&self.config, SearchMethod::Search, request)
    }

    /// A retrieve is a search expected to match at most one document.
    pub fn build_retrieve(&self, request: &BridgeRequest) -> Result<HttpRequest> {
        request::build(&self.config, SearchMethod::Search, request)
    }

    #[instrument(skip(self, request, response), fields(structure = %request.structure, status = response.status))]
    pub fn parse_count(&self, request: &BridgeRequest, response: HttpResponse) -> Result<Count> {
        let document = read_document(&response)?;
        document
            .get("count")
            .and_then(serde_json::Value::as_u64)
            .map(Count)
            .ok_or_else(|| BridgeError::InvalidResponse("count response has no 'count' field".to_string()))
    }

    #[instrument(skip(self, request, response), fields(structure = %request.structure, status = response.status))]
    pub fn parse_search(&self, request: &BridgeRequest, response: HttpResponse) -> Result<RecordList> {
        let document = read_document(&response)?;
        let template = QueryTemplate::split(&request.query);
        let records = extract::extract(&document, &template.root, &request.fields)?;
        let count = extract::total_hits(&document)?;
        tracing::debug!(count, size = records.len(), "search parsed");

        Ok(RecordList {
            fields: request.fields.clone(),
            metadata: ResultMetadata {
                count,
                size: records.len(),
            },
            records,
        })
    }

    #[instrument(skip(self, request, response), fields(structure = %request.structure, status = response.status))]
    pub fn parse_retrieve(&self, request: &BridgeRequest, response: HttpResponse) -> Result<Option<Record>> {
        let document = read_document(&response)?;
        let template = QueryTemplate::split(&request.query);
        extract::extract_single(&document, &template.root, &request.fields)
    }
}

fn read_document(response: &HttpResponse) -> Result<serde_json::Value> {
    check_status(response)?;
    tracing::trace!(body = %response.body, "elasticsearch response");
    extract::parse_document(&response.body)
}

/// Any non-2xx status is an upstream failure.
fn check_status(response: &HttpResponse) -> Result<()> {
    if (200..300).contains(&response.status) {
        return Ok(());
    }
    Err(BridgeError::UpstreamProtocolError {
        status: response.status,
        body: response.body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_RESPONSE: &str = r#"{"took":1,"timed_out":false,"hits":{"total":2,"max_score":1.0,"hits":[
        {"_index":"examples","_type":"doc","_id":"1","_score":1.0,"_source":{"message":"error one","app":{"name":"A"}}},
        {"_index":"examples","_type":"doc","_id":"2","_score":1.0,"_source":{"message":"error two","app":{"name":"B"}}}
    ]}}"#;

    fn bridge() -> ElasticBridge {
        ElasticBridge::new(BridgeConfig::new("http://localhost:9200"))
    }

    fn request() -> BridgeRequest {
        BridgeRequest::new("examples/doc", r#"message:<%= parameter["log level"] %>"#)
            .with_parameter("log level", "error")
            .with_page_size("1000")
            .with_offset("0")
    }

    #[test]
    fn build_search_produces_get_without_body() {
        let http = bridge().build_search(&request()).unwrap();
        assert_eq!(
            http.url,
            "http://localhost:9200/examples/doc/_search?q=message%3Aerror&size=1000&from=0"
        );
        assert!(http.body.is_none());
        assert!(http.headers.is_empty());
    }

    #[test]
    fn build_count_produces_count_url() {
        let http = bridge().build_count(&request()).unwrap();
        assert_eq!(http.url, "http://localhost:9200/examples/doc/_count?q=message%3Aerror");
    }

    #[test]
    fn build_url_matches_build_search() {
        let b = bridge();
        assert_eq!(
            b.build_url(SearchMethod::Search, &request()).unwrap(),
            b.build_retrieve(&request()).unwrap().url
        );
    }

    #[test]
    fn parse_count_reads_count() {
        let response = HttpResponse::new(200, r#"{"count":1,"_shards":{"total":1}}"#);
        assert_eq!(bridge().parse_count(&request(), response).unwrap(), Count(1));
    }

    #[test]
    fn parse_count_without_count_field() {
        let response = HttpResponse::new(200, r#"{"hits":{}}"#);
        assert!(matches!(
            bridge().parse_count(&request(), response),
            Err(BridgeError::InvalidResponse(_))
        ));
    }

    #[test]
    fn parse_search_flattens_hits() {
        let list = bridge()
            .parse_search(&request(), HttpResponse::new(200, SEARCH_RESPONSE))
            .unwrap();
        assert_eq!(list.metadata, ResultMetadata { count: 2, size: 2 });
        assert_eq!(list.records[0].get("_source.app.name"), Some("A"));
        assert_eq!(list.records[1].get("_id"), Some("2"));
        assert_eq!(list.records[1].get("_score"), Some("1.0"));
        assert!(list.fields.is_empty());
    }

    #[test]
    fn parse_search_with_fields() {
        let request = request().with_fields(["_source.message"]);
        let list = bridge()
            .parse_search(&request, HttpResponse::new(200, SEARCH_RESPONSE))
            .unwrap();
        assert_eq!(list.fields, vec!["_source.message"]);
        assert_eq!(list.records[0].len(), 1);
        assert_eq!(list.records[0].get("_source.message"), Some("error one"));
    }

    #[test]
    fn parse_search_uses_root_override_from_request() {
        let request = BridgeRequest::new(
            "examples",
            r#"{"size":0,"aggs":{"apps":{"terms":{"field":"app.name"}}}}|$.aggregations.apps.buckets"#,
        );
        let body = r#"{"hits":{"total":5,"hits":[]},"aggregations":{"apps":{"buckets":[
            {"key":"A","doc_count":3},{"key":"B","doc_count":2}]}}}"#;
        let list = bridge().parse_search(&request, HttpResponse::new(200, body)).unwrap();
        assert_eq!(list.metadata, ResultMetadata { count: 5, size: 2 });
        assert_eq!(list.records[0].get("key"), Some("A"));
        assert_eq!(list.records[0].get("doc_count"), Some("3"));

        // The next request on the same adapter is back on the default root.
        let list = bridge()
            .parse_search(&request_without_override(), HttpResponse::new(200, SEARCH_RESPONSE))
            .unwrap();
        assert_eq!(list.metadata.size, 2);
        assert_eq!(list.records[0].get("_id"), Some("1"));
    }

    #[test]
    fn parse_search_accepts_recursive_descent_override() {
        let request = BridgeRequest::new(
            "examples",
            r#"{"size":0,"aggs":{"apps":{"terms":{"field":"app.name"}}}}|$..buckets"#,
        )
        .with_fields(["key"]);
        let body = r#"{"hits":{"total":5,"hits":[]},"aggregations":{"apps":{"buckets":[
            {"key":"A","doc_count":3},{"key":"B","doc_count":2}]}}}"#;
        let list = bridge().parse_search(&request, HttpResponse::new(200, body)).unwrap();
        assert_eq!(list.metadata, ResultMetadata { count: 5, size: 2 });
        assert_eq!(list.records[1].get("key"), Some("B"));
    }

    fn request_without_override() -> BridgeRequest {
        BridgeRequest::new("examples", r#"{"query":{"match_all":{}}}"#)
    }

    #[test]
    fn parse_retrieve_rejects_multiple_results() {
        let err = bridge()
            .parse_retrieve(&request(), HttpResponse::new(200, SEARCH_RESPONSE))
            .unwrap_err();
        assert!(matches!(err, BridgeError::MultipleResultsForSingleMatch { matched: 2 }));
    }

    #[test]
    fn parse_retrieve_empty_is_none() {
        let response = HttpResponse::new(200, r#"{"hits":{"total":0,"hits":[]}}"#);
        assert_eq!(bridge().parse_retrieve(&request(), response).unwrap(), None);
    }

    #[test]
    fn non_2xx_is_upstream_error() {
        let err = bridge()
            .parse_search(&request(), HttpResponse::new(400, "parse_exception"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::UpstreamProtocolError { status: 400, .. }));
    }

    #[test]
    fn bad_json_is_invalid_response() {
        let err = bridge()
            .parse_search(&request(), HttpResponse::new(200, "not json"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidResponse(_)));
    }

    #[test]
    fn health_check() {
        let b = ElasticBridge::new(BridgeConfig::new("http://localhost:9200/").with_credentials("u", "p"));
        let http = b.build_health_check();
        assert_eq!(http.url, "http://localhost:9200/_cat/health");
        assert!(http.header("authorization").is_some());

        assert!(b.parse_health_check(HttpResponse::new(200, "green")).is_ok());
        assert!(matches!(
            b.parse_health_check(HttpResponse::new(401, "")),
            Err(BridgeError::Unauthorized)
        ));
        assert!(matches!(
            b.parse_health_check(HttpResponse::new(500, "")),
            Err(BridgeError::UpstreamProtocolError { status: 500, .. })
        ));
    }

    #[test]
    fn adapter_is_shareable_across_threads() {
        fn assert_shareable<T: Clone + Send + Sync>() {}
        assert_shareable::<ElasticBridge>();
    }

    #[test]
    fn from_properties_requires_url() {
        assert!(ElasticBridge::from_properties(&HashMap::new()).is_err());
        let props = HashMap::from([("Elastic URL".to_string(), "http://es:9200".to_string())]);
        let b = ElasticBridge::from_properties(&props).unwrap();
        assert_eq!(b.config().elastic_url, "http://es:9200");
        assert!(!ElasticBridge::version().is_empty());
    }
}
