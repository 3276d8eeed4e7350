use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;

use crate::context::Context;
use crate::error::Error;
use crate::tls::client_tls_config;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed response body every transport hands back, so custom transports and
/// mocks are constructible without hyper internals.
pub type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, BoxError>> + Send + 'a>>;

/// One framed HTTP exchange: send a request, return a response or error.
///
/// Request bodies are buffered (`Full<Bytes>`) so the retry layer can replay
/// them. The caller's [`Context`] rides in the request extensions.
/// Substitutable via [`crate::ClientBuilder::transport`] for proxying,
/// mocking, or mutual-TLS setups.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request<Full<Bytes>>) -> TransportFuture<'_>;
}

/// Hook applied once at client construction, replacing the transport with a
/// wrapped one. Invoked with the builder-supplied context.
pub type TransportWrapper =
    Box<dyn FnOnce(&Context, Arc<dyn Transport>) -> Result<Arc<dyn Transport>, BoxError>>;

pub(crate) fn build_transport_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &Bytes,
    ctx: &Context,
) -> Request<Full<Bytes>> {
    let mut request = Request::new(Full::new(body.clone()));
    *request.method_mut() = method.clone();
    *request.uri_mut() = uri.clone();
    *request.headers_mut() = headers.clone();
    request.extensions_mut().insert(ctx.clone());
    request
}

type HyperHttpsClient = HyperClient<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Default transport: a hyper connection-pooling client over rustls.
pub struct HyperTransport {
    client: HyperHttpsClient,
}

impl HyperTransport {
    /// A non-pooled transport keeps no idle connections, so every request
    /// dials a fresh connection. A pooled transport needs at least one idle
    /// slot per host.
    pub fn new(
        pooled: bool,
        max_idle_connections: usize,
        insecure_skip_verify: bool,
    ) -> Result<Self, Error> {
        if pooled && max_idle_connections == 0 {
            return Err(Error::Configuration {
                message: "max_idle_connections must be at least 1 on a pooled transport"
                    .to_owned(),
            });
        }
        let tls = client_tls_config(insecure_skip_verify)?;
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(connector);

        let max_idle = if pooled { max_idle_connections } else { 0 };
        let client = HyperClient::builder(TokioExecutor::new())
            .pool_max_idle_per_host(max_idle)
            .build(https);
        Ok(Self { client })
    }
}

impl Transport for HyperTransport {
    fn send(&self, request: Request<Full<Bytes>>) -> TransportFuture<'_> {
        let call = self.client.request(request);
        Box::pin(async move {
            let response = call.await.map_err(|source| Box::new(source) as BoxError)?;
            Ok(response.map(|body| {
                body.map_err(|source| Box::new(source) as BoxError)
                    .boxed_unsync()
            }))
        })
    }
}
