//! Job-manager client error types

/// Errors surfaced by the job-manager REST client.
///
/// Every call is single-shot: transport failures, non-success status codes
/// and undecodable bodies are all reported to the caller unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request could not be sent or the response body could not be read
    #[error("request to {endpoint} failed: {source}")]
    Http {
        /// Full URL of the failed request
        endpoint: String,
        /// Underlying transport error
        source: reqwest::Error,
    },

    /// The job manager answered with a non-2xx status
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        /// Full URL of the request
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Raw response body (the job manager puts its error list here)
        body: String,
    },

    /// The response body did not match the expected shape
    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        /// Full URL of the request
        endpoint: String,
        /// Underlying JSON error
        source: serde_json::Error,
    },

    /// The base URL or a derived path was not a valid URL
    #[error("invalid job manager url {url}: {source}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Parse failure
        source: url::ParseError,
    },

    /// The HTTP client could not be constructed
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
}

impl ClientError {
    /// HTTP status code if the job manager answered with an error status
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_reports_code_and_body() {
        let err = ClientError::Status {
            endpoint: "http://app-abc.ns:8081/overview".to_string(),
            status: 503,
            body: r#"{"errors":["not ready"]}"#.to_string(),
        };
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(
            err.to_string(),
            r#"http://app-abc.ns:8081/overview returned 503: {"errors":["not ready"]}"#
        );
    }

    #[test]
    fn decode_error_has_no_status() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ClientError::Decode {
            endpoint: "http://x:8081/jobs".to_string(),
            source,
        };
        assert_eq!(err.status_code(), None);
        assert!(err.to_string().starts_with("failed to decode response from http://x:8081/jobs"));
    }
}
