use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method, Uri};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use url::Url;

use crate::client::Client;
use crate::context::Context;
use crate::error::Error;
use crate::overrides::{Overrides, BASE_URL_OVERRIDE_KEY, HEADER_OVERRIDE_KEY};
use crate::request::{PlainRequest, RequestDescriptor};
use crate::response::HttpResponse;
use crate::util::encode_query;
use crate::Result;

impl Client {
    /// Assembles and sends `request`, then hands the buffered response to
    /// `handler`.
    ///
    /// Assembly order: context base URL override (falling back to the
    /// client's), descriptor validation, path join, query, headers (context
    /// header overrides replace descriptor headers per name), body. A raw
    /// descriptor body wins over a JSON one; a JSON body sets `Content-Type:
    /// application/json` unconditionally.
    pub async fn execute_with<T, F>(
        &self,
        ctx: &Context,
        request: &dyn RequestDescriptor,
        handler: F,
    ) -> Result<T>
    where
        F: FnOnce(HttpResponse) -> Result<T>,
    {
        let base_url = ctx
            .value::<Url>(BASE_URL_OVERRIDE_KEY)
            .unwrap_or_else(|| self.base_url.clone());

        request
            .validate()
            .map_err(|source| Error::Validation { source })?;

        let path = request.path();
        let mut url = base_url
            .join(&path)
            .map_err(|source| Error::InvalidUrl { path, source })?;
        if let Some(pairs) = request.query() {
            if !pairs.is_empty() {
                url.set_query(Some(&encode_query(&pairs)));
            }
        }

        let mut headers = request.headers().unwrap_or_default();
        let body = match request.body() {
            Some(raw) => raw,
            None => match request.body_json() {
                Some(value) => {
                    let encoded =
                        serde_json::to_vec(&value).map_err(|source| Error::Marshal { source })?;
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    Bytes::from(encoded)
                }
                None => Bytes::new(),
            },
        };
        if let Some(overrides) = ctx.value::<HeaderMap>(HEADER_OVERRIDE_KEY) {
            for (name, value) in &overrides {
                headers.insert(name.clone(), value.clone());
            }
        }

        let method = request.method();
        let uri: Uri = url
            .as_str()
            .parse()
            .map_err(|source: http::uri::InvalidUri| Error::Configuration {
                message: format!("assembled URL is not a valid URI: {source}"),
            })?;

        let response = self.sender.send(ctx, method.clone(), uri, headers, body).await?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let collected = ctx
            .guard(response.into_body().collect())
            .await?
            .map_err(|source| Error::Request {
                method,
                url: url.to_string(),
                attempts: 1,
                source,
            })?;

        handler(HttpResponse::new(status, response_headers, collected.to_bytes()))
    }

    /// Like [`execute_with`](Self::execute_with) with the default handler:
    /// non-2xx statuses error, an empty body yields `None`, otherwise the
    /// body is decoded as JSON.
    pub async fn execute<T>(
        &self,
        ctx: &Context,
        request: &dyn RequestDescriptor,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        self.execute_with(ctx, request, default_response_handler::<T>)
            .await
    }

    /// One-off request against the client's base URL without a descriptor
    /// type.
    pub async fn request<T, F>(
        &self,
        ctx: &Context,
        method: Method,
        path: impl Into<String>,
        headers: Option<HeaderMap>,
        body: Option<Bytes>,
        handler: F,
    ) -> Result<T>
    where
        F: FnOnce(HttpResponse) -> Result<T>,
    {
        let request = PlainRequest {
            method,
            path: path.into(),
            headers,
            body,
        };
        self.execute_with(ctx, &request, handler).await
    }

    /// One-off request against an absolute URL, bypassing the client's base
    /// URL for this call only.
    pub async fn request_url<T, F>(
        &self,
        ctx: &Context,
        method: Method,
        url: &str,
        headers: Option<HeaderMap>,
        body: Option<Bytes>,
        handler: F,
    ) -> Result<T>
    where
        F: FnOnce(HttpResponse) -> Result<T>,
    {
        let target = Url::parse(url).map_err(|source| Error::InvalidBaseUrl {
            url: url.to_owned(),
            source,
        })?;
        let ctx = Overrides::new().base_url(target).apply(ctx);
        let request = PlainRequest {
            method,
            path: String::new(),
            headers,
            body,
        };
        self.execute_with(&ctx, &request, handler).await
    }
}

/// Default response handling: status check, then optional JSON decode.
pub fn default_response_handler<T>(response: HttpResponse) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    response.expect_success()?;
    if response.body().is_empty() {
        return Ok(None);
    }
    response.json().map(Some)
}

/// Convenience for handlers that only care about success.
pub fn discard_response_handler(response: HttpResponse) -> Result<()> {
    response.expect_success()
}
