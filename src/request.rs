use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::transport::BoxError;

/// Describes one HTTP request: the required shape (method and path) plus
/// optional capabilities consulted during assembly.
///
/// Every optional method defaults to "not provided", so a descriptor only
/// implements what it actually contributes. `validate` runs before any
/// network work; a failing validation aborts the call without sending.
///
/// When both [`body`](RequestDescriptor::body) and
/// [`body_json`](RequestDescriptor::body_json) are provided, the raw body
/// wins and the JSON value is ignored.
pub trait RequestDescriptor: Send + Sync {
    fn method(&self) -> Method;

    /// Path joined against the effective base URL. May be empty to target
    /// the base URL itself.
    fn path(&self) -> String;

    fn validate(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Query pairs appended to the assembled URL.
    fn query(&self) -> Option<Vec<(String, String)>> {
        None
    }

    fn headers(&self) -> Option<HeaderMap> {
        None
    }

    /// Raw request body, sent as-is.
    fn body(&self) -> Option<Bytes> {
        None
    }

    /// JSON request body; serialization failures surface as marshal errors
    /// and the `Content-Type` header is set to `application/json`.
    fn body_json(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Minimal descriptor backing [`crate::Client::request`].
pub(crate) struct PlainRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: Option<HeaderMap>,
    pub(crate) body: Option<Bytes>,
}

impl RequestDescriptor for PlainRequest {
    fn method(&self) -> Method {
        self.method.clone()
    }

    fn path(&self) -> String {
        self.path.clone()
    }

    fn headers(&self) -> Option<HeaderMap> {
        self.headers.clone()
    }

    fn body(&self) -> Option<Bytes> {
        self.body.clone()
    }
}
