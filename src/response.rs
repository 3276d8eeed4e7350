use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::util::truncate_body;

/// Fully buffered response handed to response handlers.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpResponse {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON. Decode failures carry a bounded body excerpt
    /// for diagnostics.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|source| Error::Decode {
            source,
            body: truncate_body(&self.body),
        })
    }

    /// Errors with a bounded body excerpt unless the status is 2xx.
    pub fn expect_success(&self) -> Result<(), Error> {
        if self.status.is_success() {
            return Ok(());
        }
        Err(Error::UnexpectedStatus {
            status: self.status.as_u16(),
            body: truncate_body(&self.body),
        })
    }
}
