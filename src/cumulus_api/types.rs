use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Cumulus SDK error type
///
/// Represents all possible errors that can occur when acquiring credentials,
/// routing a request, or talking to the Cumulus API.
#[derive(Debug)]
pub enum CumulusError {
    /// No usable credential source, conflicting sources, or a bad config value
    Config(String),
    /// Remote certificate URI is not of the form `s3://<bucket>/<key>`
    InvalidPathFormat(String),
    /// PKCS12 bundle could not be decrypted or is missing its key/certificate
    CredentialDecode(String),
    /// Any other failure while exchanging the certificate for a bearer token
    AuthExchange { stage: AuthStage, message: String },
    /// HTTP verb outside GET/POST/PUT/DELETE
    UnsupportedVerb(String),
    /// A record is missing the field needed to build its resource path
    MissingIdentifier {
        resource: &'static str,
        field: &'static str,
    },
    /// No route exists for this action/resource pair
    UnsupportedOperation { action: String, resource: String },
    /// API request failed (network, timeout, request building)
    Api(ApiError),
    /// Token cache or collaborator storage failed
    Storage(crate::storage::StorageError),
    /// A fan-out worker task panicked or was cancelled
    Task(String),
    /// A plugin failed for a reason of its own
    Plugin(String),
}

impl fmt::Display for CumulusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CumulusError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CumulusError::InvalidPathFormat(path) => {
                write!(f, "{} is not of the format s3://<bucket_name>/path", path)
            }
            CumulusError::CredentialDecode(msg) => {
                write!(f, "{}: {}", AuthStage::Decode.description(), msg)
            }
            CumulusError::AuthExchange { stage, message } => {
                write!(f, "{}: {}", stage.description(), message)
            }
            CumulusError::UnsupportedVerb(verb) => {
                write!(f, "{} is not a supported http request", verb)
            }
            CumulusError::MissingIdentifier { resource, field } => write!(
                f,
                "Cannot build {} path: record is missing required field '{}'",
                resource, field
            ),
            CumulusError::UnsupportedOperation { action, resource } => {
                write!(f, "Unsupported operation: {} {}", action, resource)
            }
            CumulusError::Api(err) => write!(f, "API error: {}", err),
            CumulusError::Storage(err) => write!(f, "Storage error: {}", err),
            CumulusError::Task(msg) => write!(f, "Worker task failed: {}", msg),
            CumulusError::Plugin(msg) => write!(f, "Plugin error: {}", msg),
        }
    }
}

impl std::error::Error for CumulusError {}

impl From<ApiError> for CumulusError {
    fn from(err: ApiError) -> Self {
        CumulusError::Api(err)
    }
}

impl From<crate::storage::StorageError> for CumulusError {
    fn from(err: crate::storage::StorageError) -> Self {
        CumulusError::Storage(err)
    }
}

/// Stage of the Launchpad certificate exchange at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    CertificateRetrieval,
    PassphraseRetrieval,
    Decode,
    Exchange,
}

impl AuthStage {
    /// Static operator-facing description logged with every failure
    pub fn description(&self) -> &'static str {
        match self {
            AuthStage::CertificateRetrieval => "Retrieving launchpad certificate",
            AuthStage::PassphraseRetrieval => "Retrieving launchpad passphrase",
            AuthStage::Decode => "Getting launchpad adapter",
            AuthStage::Exchange => "Getting launchpad token",
        }
    }
}

/// Transport-level errors
#[derive(Debug)]
pub enum ApiError {
    /// Network error (connection, timeout, etc.)
    Network(String),
    /// HTTP error with status code
    Http { status: u16, message: String },
    /// Failed to parse response
    Parse(String),
    /// Request building failed
    Request(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "Network error: {}", msg),
            ApiError::Http { status, message } => {
                write!(f, "HTTP {} error: {}", status, message)
            }
            ApiError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ApiError::Request(msg) => write!(f, "Request error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("Request timeout".to_string())
        } else if err.is_connect() {
            ApiError::Network(format!("Connection failed: {}", err))
        } else if err.is_builder() {
            ApiError::Request(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Body of a Cumulus API response
///
/// The API answers with JSON almost everywhere, but gateways in front of it
/// can return HTML or plain-text error pages. Those are kept as raw bytes
/// rather than turned into errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Raw(Vec<u8>),
}

/// Response returned by [`crate::CumulusClient::invoke`]
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Borrow the JSON body, if the response had one
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Raw(_) => None,
        }
    }

    /// Consume the response, converting a raw body into a JSON string value
    pub fn into_json(self) -> Value {
        match self.body {
            ResponseBody::Json(value) => value,
            ResponseBody::Raw(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    /// Structured view of an error envelope, if the body is one
    pub fn upstream_error(&self) -> Option<UpstreamError> {
        self.json().and_then(UpstreamError::from_body)
    }
}

/// Message the API Gateway returns when a workflow definition pushes a
/// request over the step-function input limit.
const PAYLOAD_LIMIT_MARKER: &str = "Member must have length less than or equal to 8192";

/// Classified Cumulus error envelope (`{"error", "message", "statusCode"}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    #[serde(default)]
    pub status_code: Option<u16>,
    pub error: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpstreamErrorKind {
    BadRequest,
    Unauthorized,
    NotFound,
    /// Request rejected because a generated payload exceeded 8192 characters
    PayloadLimit,
    Other,
}

impl UpstreamError {
    /// Classify an error envelope; returns `None` for anything that is not one
    ///
    /// The upstream API exposes no machine-readable code for the payload limit,
    /// so this is the single place that inspects message text.
    pub fn from_body(body: &Value) -> Option<Self> {
        let error = body.get("error")?.as_str()?.to_string();
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let status_code = body
            .get("statusCode")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok());

        let kind = match (error.as_str(), status_code) {
            ("Bad Request", _) | (_, Some(400)) if message.contains(PAYLOAD_LIMIT_MARKER) => {
                UpstreamErrorKind::PayloadLimit
            }
            ("Bad Request", _) | (_, Some(400)) => UpstreamErrorKind::BadRequest,
            ("Unauthorized", _) | (_, Some(401)) | (_, Some(403)) => {
                UpstreamErrorKind::Unauthorized
            }
            ("Not Found", _) | (_, Some(404)) => UpstreamErrorKind::NotFound,
            _ => UpstreamErrorKind::Other,
        };

        Some(Self {
            kind,
            status_code,
            error,
            message,
        })
    }
}

/// Pagination metadata from a Cumulus list envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListMeta {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(rename = "searchContext", default)]
    pub search_context: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub page: Option<u64>,
}

/// Cumulus list envelope: `{results: [...], meta: {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T = Value> {
    pub results: Vec<T>,
    #[serde(default)]
    pub meta: ListMeta,
}

/// Response body of the Launchpad login endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchpadTokenResponse {
    pub sm_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_limit_is_classified() {
        let body = json!({
            "error": "Bad Request",
            "statusCode": 400,
            "message": "1 validation error detected: Value at 'input' failed to satisfy constraint: Member must have length less than or equal to 8192"
        });

        let err = UpstreamError::from_body(&body).unwrap();
        assert_eq!(err.kind, UpstreamErrorKind::PayloadLimit);
        assert_eq!(err.status_code, Some(400));
    }

    #[test]
    fn test_plain_bad_request_and_not_found() {
        let bad = json!({"error": "Bad Request", "message": "invalid field"});
        assert_eq!(
            UpstreamError::from_body(&bad).unwrap().kind,
            UpstreamErrorKind::BadRequest
        );

        let missing =
            json!({"error": "Not Found", "statusCode": 404, "message": "No record found"});
        assert_eq!(
            UpstreamError::from_body(&missing).unwrap().kind,
            UpstreamErrorKind::NotFound
        );
    }

    #[test]
    fn test_non_error_body_is_not_classified() {
        assert!(UpstreamError::from_body(&json!({"results": []})).is_none());
        assert!(UpstreamError::from_body(&json!({"error": 12})).is_none());
    }

    #[test]
    fn test_raw_body_into_json() {
        let response = ApiResponse {
            status: 502,
            body: ResponseBody::Raw(b"<html>Bad Gateway</html>".to_vec()),
        };
        assert!(!response.is_success());
        assert!(response.json().is_none());
        assert_eq!(response.into_json(), json!("<html>Bad Gateway</html>"));
    }

    #[test]
    fn test_error_display_includes_stage() {
        let err = CumulusError::AuthExchange {
            stage: AuthStage::Exchange,
            message: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "Getting launchpad token: connection refused");

        let err = CumulusError::InvalidPathFormat("/fake/path/launchpad.pfx".to_string());
        assert_eq!(
            err.to_string(),
            "/fake/path/launchpad.pfx is not of the format s3://<bucket_name>/path"
        );
    }
}
