use http::Method;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stable machine-readable discriminant for [`Error`], usable in logs and
/// metrics without formatting the full error chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    Configuration,
    TransportSetup,
    Validation,
    Marshal,
    InvalidHeaderName,
    InvalidHeaderValue,
    Request,
    UnexpectedStatus,
    ForcedRetry,
    Decode,
    Canceled,
    DeadlineExceeded,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::TransportSetup => "transport_setup",
            Self::Validation => "validation",
            Self::Marshal => "marshal",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::Request => "request",
            Self::UnexpectedStatus => "unexpected_status",
            Self::ForcedRetry => "forced_retry",
            Self::Decode => "decode",
            Self::Canceled => "canceled",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("base url is required")]
    MissingBaseUrl,
    #[error("failed to parse base url {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid client configuration: {message}")]
    Configuration { message: String },
    #[error("invalid request url for path {path}: {source}")]
    InvalidUrl {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to wrap transport: {source}")]
    TransportSetup {
        #[source]
        source: BoxError,
    },
    #[error("failed to validate request: {source}")]
    Validation {
        #[source]
        source: BoxError,
    },
    #[error("failed to marshal request body: {source}")]
    Marshal {
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to do request {method} {url} after {attempts} attempt(s): {source}")]
    Request {
        method: Method,
        url: String,
        attempts: u32,
        #[source]
        source: BoxError,
    },
    #[error("unexpected response ({status}): {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("force retried HTTP status {}: [{body}]", status_line(*.status))]
    ForcedRetry { status: u16, body: String },
    #[error("failed to decode response body: {source}; body={body}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Status line with the canonical reason phrase, e.g. `200 OK`.
fn status_line(status: u16) -> String {
    match http::StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
    {
        Some(reason) => format!("{status} {reason}"),
        None => status.to_string(),
    }
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MissingBaseUrl
            | Self::InvalidBaseUrl { .. }
            | Self::Configuration { .. }
            | Self::InvalidUrl { .. } => ErrorCode::Configuration,
            Self::TransportSetup { .. } => ErrorCode::TransportSetup,
            Self::Validation { .. } => ErrorCode::Validation,
            Self::Marshal { .. } => ErrorCode::Marshal,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::Request { .. } => ErrorCode::Request,
            Self::UnexpectedStatus { .. } => ErrorCode::UnexpectedStatus,
            Self::ForcedRetry { .. } => ErrorCode::ForcedRetry,
            Self::Decode { .. } => ErrorCode::Decode,
            Self::Canceled => ErrorCode::Canceled,
            Self::DeadlineExceeded => ErrorCode::DeadlineExceeded,
        }
    }

    /// HTTP status carried by this error, looking through the request-failure
    /// wrapper so callers can match on the terminal status after retries.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } | Self::ForcedRetry { status, .. } => {
                Some(*status)
            }
            Self::Request { source, .. } => source.downcast_ref::<Error>().and_then(Error::status),
            _ => None,
        }
    }
}
