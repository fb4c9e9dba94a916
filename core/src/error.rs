//! Error types for the Elasticsearch bridge.
//!
//! # Design
//! Every variant is terminal for the request that produced it; nothing in the
//! core retries. A requested field that fails to resolve is not an error; it
//! becomes an absent value in the record.

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors returned by `ElasticBridge` build and parse methods.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The query template references a parameter that was not bound.
    #[error("{}", missing_binding_message(.name, .parameters_provided))]
    MissingParameterBinding {
        name: String,
        parameters_provided: bool,
    },

    /// A retrieve resolved to more than one result.
    #[error("Multiple results matched an expected single match query ({matched} results)")]
    MultipleResultsForSingleMatch { matched: usize },

    /// The result root path is malformed or does not fit the response shape.
    #[error("unable to resolve result root '{path}': {reason}")]
    MalformedRootPath { path: String, reason: String },

    /// The server answered with a non-2xx status.
    #[error("The Elasticsearch server returned a HTTP status code of {status}, 200 was expected: {body}")]
    UpstreamProtocolError { status: u16, body: String },

    /// The health check was rejected with 401.
    #[error("Unauthorized: the configured Username/Password combination is not valid")]
    Unauthorized,

    /// A parameter value could not be encoded for the target transport.
    #[error("encoding failed: {0}")]
    EncodingError(String),

    /// The response body is not the JSON document that was expected.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Pagination metadata that is not a non-negative integer.
    #[error("invalid value '{value}' for request metadata '{key}'")]
    InvalidMetadata { key: String, value: String },

    /// Adapter configuration is incomplete.
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn missing_binding_message(name: &str, parameters_provided: &bool) -> String {
    if *parameters_provided {
        format!("Unable to parse qualification, the '{name}' parameter was referenced but not provided.")
    } else {
        format!(
            "Unable to parse qualification, the '{name}' parameter was referenced but no parameters were provided."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binding_message_depends_on_whether_parameters_exist() {
        let none = BridgeError::MissingParameterBinding {
            name: "date".to_string(),
            parameters_provided: false,
        };
        assert!(none.to_string().contains("no parameters were provided"));

        let unbound = BridgeError::MissingParameterBinding {
            name: "date".to_string(),
            parameters_provided: true,
        };
        assert!(unbound.to_string().contains("'date' parameter was referenced but not provided"));
    }

    #[test]
    fn upstream_error_carries_status() {
        let err = BridgeError::UpstreamProtocolError {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert!(err.to_string().contains("503"));
    }
}
