use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, Response, Uri};
use url::Url;

use crate::context::Context;
use crate::error::Error;
use crate::retry::{
    default_backoff, default_retry_decision, BackoffFn, RetryDecisionFn, RetrySettings,
    RetryingClient,
};
use crate::transport::{
    build_transport_request, HyperTransport, ResponseBody, Transport, TransportWrapper,
};

pub(crate) const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 100;
pub(crate) const DEFAULT_RETRY_WAIT_MIN: Duration = Duration::from_secs(1);
pub(crate) const DEFAULT_RETRY_WAIT_MAX: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_RETRY_MAX: u32 = 4;

/// Configures and builds a [`Client`].
///
/// Defaults: pooled connections with 100 idle per host, retry enabled with
/// exponential backoff from 1s to 30s and up to 4 retries, TLS verification
/// on.
pub struct ClientBuilder {
    base_url: String,
    pooled: bool,
    max_idle_connections: usize,
    insecure_skip_verify: bool,
    transport: Option<Arc<dyn Transport>>,
    transport_wrapper: Option<TransportWrapper>,
    wrapper_context: Context,
    disable_retry: bool,
    retry_wait_min: Duration,
    retry_wait_max: Duration,
    retry_max: u32,
    retry_decision: RetryDecisionFn,
    backoff: BackoffFn,
}

impl ClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            pooled: true,
            max_idle_connections: DEFAULT_MAX_IDLE_CONNECTIONS,
            insecure_skip_verify: false,
            transport: None,
            transport_wrapper: None,
            wrapper_context: Context::background(),
            disable_retry: false,
            retry_wait_min: DEFAULT_RETRY_WAIT_MIN,
            retry_wait_max: DEFAULT_RETRY_WAIT_MAX,
            retry_max: DEFAULT_RETRY_MAX,
            retry_decision: Arc::new(default_retry_decision),
            backoff: Arc::new(default_backoff),
        }
    }

    /// Disables connection pooling; every request dials fresh.
    pub fn pooled(mut self, pooled: bool) -> Self {
        self.pooled = pooled;
        self
    }

    /// Idle connections kept per host. Must be at least 1 while pooling is
    /// enabled; zero is only valid together with `pooled(false)`.
    pub fn max_idle_connections(mut self, max: usize) -> Self {
        self.max_idle_connections = max;
        self
    }

    /// Skips TLS server certificate verification. Test environments only.
    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    /// Replaces the default hyper transport entirely. Incompatible with
    /// [`insecure_skip_verify`](Self::insecure_skip_verify).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Wraps whichever transport the builder ends up with. Applied once at
    /// build time with [`wrapper_context`](Self::wrapper_context).
    pub fn transport_wrapper(mut self, wrapper: TransportWrapper) -> Self {
        self.transport_wrapper = Some(wrapper);
        self
    }

    pub fn wrapper_context(mut self, ctx: Context) -> Self {
        self.wrapper_context = ctx;
        self
    }

    pub fn disable_retry(mut self, disable: bool) -> Self {
        self.disable_retry = disable;
        self
    }

    pub fn retry_wait_min(mut self, wait: Duration) -> Self {
        self.retry_wait_min = wait;
        self
    }

    pub fn retry_wait_max(mut self, wait: Duration) -> Self {
        self.retry_wait_max = wait;
        self
    }

    /// Maximum number of retries after the initial attempt.
    pub fn retry_max(mut self, retries: u32) -> Self {
        self.retry_max = retries;
        self
    }

    pub fn retry_decision(mut self, decision: RetryDecisionFn) -> Self {
        self.retry_decision = decision;
        self
    }

    pub fn backoff(mut self, backoff: BackoffFn) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn try_build(self) -> Result<Client, Error> {
        if self.base_url.is_empty() {
            return Err(Error::MissingBaseUrl);
        }
        let base_url = Url::parse(&self.base_url).map_err(|source| Error::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        })?;
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            return Err(Error::Configuration {
                message: format!("unsupported base URL scheme: {}", base_url.scheme()),
            });
        }
        if !self.disable_retry && self.retry_wait_min > self.retry_wait_max {
            return Err(Error::Configuration {
                message: format!(
                    "retry wait minimum {:?} exceeds maximum {:?}",
                    self.retry_wait_min, self.retry_wait_max
                ),
            });
        }
        if self.transport.is_some() && self.insecure_skip_verify {
            return Err(Error::Configuration {
                message: "insecure_skip_verify has no effect on a custom transport".to_owned(),
            });
        }

        let mut transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new(
                self.pooled,
                self.max_idle_connections,
                self.insecure_skip_verify,
            )?),
        };
        if let Some(wrapper) = self.transport_wrapper {
            transport = wrapper(&self.wrapper_context, transport)
                .map_err(|source| Error::TransportSetup { source })?;
        }

        let sender = if self.disable_retry {
            Sender::Direct(transport)
        } else {
            Sender::Retrying(RetryingClient::new(
                transport,
                RetrySettings {
                    wait_min: self.retry_wait_min,
                    wait_max: self.retry_wait_max,
                    max_retries: self.retry_max,
                    decision: self.retry_decision,
                    backoff: self.backoff,
                },
            ))
        };
        Ok(Client { sender, base_url })
    }
}

/// Context-aware HTTP client with configured defaults that per-call
/// [`crate::Overrides`] can shadow. Cheap to share behind an `Arc`.
pub struct Client {
    pub(crate) sender: Sender,
    pub(crate) base_url: Url,
}

impl Client {
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

pub(crate) enum Sender {
    Direct(Arc<dyn Transport>),
    Retrying(RetryingClient),
}

impl Sender {
    pub(crate) async fn send(
        &self,
        ctx: &Context,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response<ResponseBody>, Error> {
        match self {
            Self::Retrying(retrying) => retrying.send(ctx, method, uri, headers, body).await,
            Self::Direct(transport) => {
                if let Some(done) = ctx.error() {
                    return Err(done);
                }
                let request = build_transport_request(&method, &uri, &headers, &body, ctx);
                match ctx.guard(transport.send(request)).await? {
                    Ok(response) => Ok(response),
                    Err(source) => Err(Error::Request {
                        method,
                        url: uri.to_string(),
                        attempts: 1,
                        source,
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use http::Request;
    use http_body_util::Full;

    use super::Client;
    use crate::transport::{Transport, TransportFuture};

    struct UnreachableTransport;

    impl Transport for UnreachableTransport {
        fn send(&self, _request: Request<Full<Bytes>>) -> TransportFuture<'_> {
            Box::pin(async { Err("transport should not be used".into()) })
        }
    }

    #[test]
    fn build_rejects_empty_base_url() {
        let result = Client::builder("").try_build();
        assert!(matches!(result, Err(crate::Error::MissingBaseUrl)));
    }

    #[test]
    fn build_rejects_malformed_base_url() {
        let result = Client::builder("not a url").try_build();
        assert!(matches!(result, Err(crate::Error::InvalidBaseUrl { .. })));
    }

    #[test]
    fn build_rejects_non_http_scheme() {
        let result = Client::builder("ftp://example.com").try_build();
        assert!(matches!(result, Err(crate::Error::Configuration { .. })));
    }

    #[test]
    fn build_rejects_inverted_retry_waits() {
        let result = Client::builder("http://example.com")
            .retry_wait_min(Duration::from_secs(10))
            .retry_wait_max(Duration::from_secs(1))
            .try_build();
        assert!(matches!(result, Err(crate::Error::Configuration { .. })));
    }

    #[test]
    fn build_rejects_skip_verify_with_custom_transport() {
        let result = Client::builder("http://example.com")
            .transport(Arc::new(UnreachableTransport))
            .insecure_skip_verify(true)
            .try_build();
        assert!(matches!(result, Err(crate::Error::Configuration { .. })));
    }

    #[test]
    fn build_rejects_zero_idle_connections_on_pooled_transport() {
        let result = Client::builder("http://example.com")
            .max_idle_connections(0)
            .try_build();
        assert!(matches!(result, Err(crate::Error::Configuration { .. })));
    }

    #[test]
    fn zero_idle_connections_is_valid_without_pooling() {
        let result = Client::builder("http://example.com")
            .pooled(false)
            .max_idle_connections(0)
            .try_build();
        assert!(result.is_ok());
    }

    #[test]
    fn inverted_retry_waits_are_ignored_when_retry_is_disabled() {
        let result = Client::builder("http://example.com")
            .retry_wait_min(Duration::from_secs(10))
            .retry_wait_max(Duration::from_secs(1))
            .disable_retry(true)
            .try_build();
        assert!(result.is_ok());
    }
}
