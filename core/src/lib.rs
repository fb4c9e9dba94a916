//! Synchronous Elasticsearch bridge core.
//!
//! # Overview
//! Translates a parameterized bridge query into an Elasticsearch request and
//! maps the JSON response back into flat, field-keyed records. Requests and
//! responses are plain data (host-does-IO pattern): the caller executes the
//! HTTP round-trip, so the core stays deterministic and testable.
//!
//! # Design
//! - `ElasticBridge` is stateless; it holds only its `BridgeConfig`.
//! - Each operation (`count`, `search`, `retrieve`) is split into `build_*`
//!   and `parse_*` so the I/O boundary is explicit.
//! - Query templates choose Lucene query-string or JSON request-body mode
//!   from their first character; parameter escaping follows the mode.
//! - A request-body template may override where results are read from with a
//!   trailing `|$.path`; the override is derived per call, never stored.

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod http;
pub mod parser;
pub mod path;
pub mod request;
pub mod template;
pub mod types;

pub use client::ElasticBridge;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use http::{HttpRequest, HttpResponse};
pub use request::{SearchMethod, SortDirection, SortOrder};
pub use template::{QueryMode, QueryTemplate, RootPath};
pub use types::{BridgeRequest, Count, Record, RecordList, ResultMetadata};
