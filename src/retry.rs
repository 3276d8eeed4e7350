use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::{HeaderMap, Method, Response, StatusCode, Uri};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::Error;
use crate::overrides::RETRY_OVERRIDE_KEY;
use crate::transport::{build_transport_request, BoxError, ResponseBody, Transport};
use crate::util::{parse_retry_after, read_bounded, RESPONSE_ERR_LIMIT};

/// Per-call retry override, attached to a context via
/// [`crate::Overrides::retry`]. Scoped to that call only; never mutates the
/// client's configured defaults.
#[derive(Clone, Debug, Default)]
pub struct RetryOverride {
    /// Stop after the first attempt, whatever the outcome.
    pub disable: bool,
    /// Status codes that must never trigger a retry.
    pub never_retry: Vec<u16>,
    /// Status codes that always trigger a retry, with a synthesized error so
    /// the eventual failure is diagnosable.
    pub always_retry: Vec<u16>,
}

impl RetryOverride {
    pub fn disabled() -> Self {
        Self {
            disable: true,
            ..Self::default()
        }
    }
}

/// Outcome of one retry-decision consultation.
#[derive(Debug)]
pub enum RetryVerdict {
    /// Do not retry; the last response or error stands.
    Stop,
    /// Do not retry; surface this error as the terminal one.
    StopWith(Error),
    /// Retry; an already-present error is augmented with a body excerpt.
    Retry,
    /// Retry even though the transport reported success; a descriptive error
    /// is synthesized from the status line and a body excerpt.
    ForceRetry,
}

pub type RetryDecisionFn =
    Arc<dyn Fn(&Context, Option<StatusCode>, Option<&BoxError>) -> RetryVerdict + Send + Sync>;

/// Status and headers of the last response, handed to the backoff function
/// so it can honor server throttle hints.
#[derive(Clone, Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

pub type BackoffFn =
    Arc<dyn Fn(u32, Duration, Duration, Option<&ResponseHead>) -> Duration + Send + Sync>;

/// Default retry decision: context cancellation wins, then context-scoped
/// [`RetryOverride`]s, then the propagated-error fallback (retry on
/// connection-level errors and 5xx except 501).
pub fn default_retry_decision(
    ctx: &Context,
    status: Option<StatusCode>,
    error: Option<&BoxError>,
) -> RetryVerdict {
    if let Some(done) = ctx.error() {
        return RetryVerdict::StopWith(done);
    }

    if let Some(retry) = ctx.value::<RetryOverride>(RETRY_OVERRIDE_KEY) {
        if retry.disable {
            return RetryVerdict::Stop;
        }
        if let Some(status) = status {
            if retry.never_retry.contains(&status.as_u16()) {
                return RetryVerdict::Stop;
            }
            if retry.always_retry.contains(&status.as_u16()) {
                return RetryVerdict::ForceRetry;
            }
        }
    }

    if let Some(error) = error {
        if is_tls_error(error) {
            return RetryVerdict::Stop;
        }
        return RetryVerdict::Retry;
    }
    if let Some(status) = status {
        if status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED {
            return RetryVerdict::Retry;
        }
    }
    RetryVerdict::Stop
}

// Certificate problems will not heal on retry.
fn is_tls_error(error: &BoxError) -> bool {
    let text = error.to_string().to_ascii_lowercase();
    text.contains("tls") || text.contains("certificate") || text.contains("handshake")
}

/// Default backoff: `Retry-After` for 429/503 when present, otherwise
/// exponential from `wait_min` doubling per attempt, capped at `wait_max`.
pub fn default_backoff(
    attempt: u32,
    wait_min: Duration,
    wait_max: Duration,
    response: Option<&ResponseHead>,
) -> Duration {
    if let Some(head) = response {
        if head.status == StatusCode::TOO_MANY_REQUESTS
            || head.status == StatusCode::SERVICE_UNAVAILABLE
        {
            if let Some(delay) = parse_retry_after(&head.headers, SystemTime::now()) {
                return delay.min(wait_max);
            }
        }
    }

    let multiplier = 1_u128 << attempt.min(31);
    let wait_ms = wait_min
        .as_millis()
        .max(1)
        .saturating_mul(multiplier)
        .min(wait_max.as_millis().max(1))
        .min(u64::MAX as u128) as u64;
    Duration::from_millis(wait_ms)
}

pub(crate) struct RetrySettings {
    pub(crate) wait_min: Duration,
    pub(crate) wait_max: Duration,
    pub(crate) max_retries: u32,
    pub(crate) decision: RetryDecisionFn,
    pub(crate) backoff: BackoffFn,
}

/// Retry-capable decorator around a [`Transport`]: pure delegation plus the
/// backoff/attempt loop. Owns nothing about the decision itself beyond
/// calling the configured policy.
pub(crate) struct RetryingClient {
    inner: Arc<dyn Transport>,
    settings: RetrySettings,
}

impl RetryingClient {
    pub(crate) fn new(inner: Arc<dyn Transport>, settings: RetrySettings) -> Self {
        Self { inner, settings }
    }

    pub(crate) async fn send(
        &self,
        ctx: &Context,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response<ResponseBody>, Error> {
        let mut attempt: u32 = 0;
        loop {
            if let Some(done) = ctx.error() {
                return Err(done);
            }

            debug!(
                method = %method,
                uri = %uri,
                attempt,
                max_retries = self.settings.max_retries,
                "sending request"
            );
            let request = build_transport_request(&method, &uri, &headers, &body, ctx);
            let result = match ctx.guard(self.inner.send(request)).await {
                Ok(result) => result,
                Err(done) => return Err(done),
            };

            match result {
                Ok(response) => {
                    let status = response.status();
                    let verdict = (self.settings.decision)(ctx, Some(status), None);
                    match verdict {
                        RetryVerdict::Stop => return Ok(response),
                        RetryVerdict::StopWith(error) => return Err(error),
                        RetryVerdict::Retry | RetryVerdict::ForceRetry => {
                            let forced = matches!(verdict, RetryVerdict::ForceRetry);
                            let head = ResponseHead {
                                status,
                                headers: response.headers().clone(),
                            };
                            let excerpt = discard_with_excerpt(response).await;
                            let error = if forced {
                                Error::ForcedRetry {
                                    status: status.as_u16(),
                                    body: excerpt,
                                }
                            } else {
                                Error::UnexpectedStatus {
                                    status: status.as_u16(),
                                    body: excerpt,
                                }
                            };
                            if attempt >= self.settings.max_retries {
                                return Err(give_up(attempt + 1, &method, &uri, error));
                            }
                            let delay = (self.settings.backoff)(
                                attempt,
                                self.settings.wait_min,
                                self.settings.wait_max,
                                Some(&head),
                            );
                            warn!(
                                status = status.as_u16(),
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "retrying request after status"
                            );
                            if let Err(done) = ctx.guard(sleep(delay)).await {
                                return Err(done);
                            }
                        }
                    }
                }
                Err(source) => {
                    let verdict = (self.settings.decision)(ctx, None, Some(&source));
                    match verdict {
                        RetryVerdict::StopWith(error) => return Err(error),
                        RetryVerdict::Stop => {
                            return Err(give_up_boxed(attempt + 1, &method, &uri, source));
                        }
                        RetryVerdict::Retry | RetryVerdict::ForceRetry => {
                            if attempt >= self.settings.max_retries {
                                return Err(give_up_boxed(attempt + 1, &method, &uri, source));
                            }
                            let delay = (self.settings.backoff)(
                                attempt,
                                self.settings.wait_min,
                                self.settings.wait_max,
                                None,
                            );
                            warn!(
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %source,
                                "retrying request after transport error"
                            );
                            if let Err(done) = ctx.guard(sleep(delay)).await {
                                return Err(done);
                            }
                        }
                    }
                }
            }
            attempt += 1;
        }
    }
}

/// Reads a bounded excerpt for diagnostics, then drops the rest of the body.
async fn discard_with_excerpt(response: Response<ResponseBody>) -> String {
    let mut body = response.into_body();
    let excerpt = read_bounded(&mut body, RESPONSE_ERR_LIMIT).await;
    String::from_utf8_lossy(&excerpt).into_owned()
}

fn give_up(attempts: u32, method: &Method, uri: &Uri, source: Error) -> Error {
    give_up_boxed(attempts, method, uri, Box::new(source))
}

fn give_up_boxed(attempts: u32, method: &Method, uri: &Uri, source: BoxError) -> Error {
    Error::Request {
        method: method.clone(),
        url: uri.to_string(),
        attempts,
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{HeaderMap, HeaderValue, StatusCode};

    use super::{default_backoff, default_retry_decision, ResponseHead, RetryOverride, RetryVerdict};
    use crate::context::Context;
    use crate::overrides::Overrides;

    #[test]
    fn fallback_retries_server_errors() {
        let ctx = Context::background();
        let verdict =
            default_retry_decision(&ctx, Some(StatusCode::INTERNAL_SERVER_ERROR), None);
        assert!(matches!(verdict, RetryVerdict::Retry));
    }

    #[test]
    fn fallback_does_not_retry_not_implemented() {
        let ctx = Context::background();
        let verdict = default_retry_decision(&ctx, Some(StatusCode::NOT_IMPLEMENTED), None);
        assert!(matches!(verdict, RetryVerdict::Stop));
    }

    #[test]
    fn fallback_does_not_retry_client_errors() {
        let ctx = Context::background();
        let verdict = default_retry_decision(&ctx, Some(StatusCode::BAD_REQUEST), None);
        assert!(matches!(verdict, RetryVerdict::Stop));
    }

    #[test]
    fn override_disable_stops_on_server_error() {
        let ctx = Overrides::new()
            .retry(RetryOverride::disabled())
            .apply(&Context::background());
        let verdict =
            default_retry_decision(&ctx, Some(StatusCode::INTERNAL_SERVER_ERROR), None);
        assert!(matches!(verdict, RetryVerdict::Stop));
    }

    #[test]
    fn override_never_retry_wins_over_fallback() {
        let ctx = Overrides::new()
            .retry(RetryOverride {
                never_retry: vec![503],
                ..RetryOverride::default()
            })
            .apply(&Context::background());
        let verdict =
            default_retry_decision(&ctx, Some(StatusCode::SERVICE_UNAVAILABLE), None);
        assert!(matches!(verdict, RetryVerdict::Stop));
    }

    #[test]
    fn override_always_retry_forces_retry_on_success() {
        let ctx = Overrides::new()
            .retry(RetryOverride {
                always_retry: vec![200],
                ..RetryOverride::default()
            })
            .apply(&Context::background());
        let verdict = default_retry_decision(&ctx, Some(StatusCode::OK), None);
        assert!(matches!(verdict, RetryVerdict::ForceRetry));
    }

    #[test]
    fn canceled_context_stops_with_cancellation() {
        let (ctx, token) = Context::background().with_cancellation();
        token.cancel();
        let verdict =
            default_retry_decision(&ctx, Some(StatusCode::INTERNAL_SERVER_ERROR), None);
        match verdict {
            RetryVerdict::StopWith(error) => {
                assert!(matches!(error, crate::Error::Canceled));
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let min = Duration::from_millis(100);
        let max = Duration::from_millis(350);
        assert_eq!(default_backoff(0, min, max, None), Duration::from_millis(100));
        assert_eq!(default_backoff(1, min, max, None), Duration::from_millis(200));
        assert_eq!(default_backoff(2, min, max, None), Duration::from_millis(350));
        assert_eq!(default_backoff(10, min, max, None), Duration::from_millis(350));
    }

    #[test]
    fn backoff_honors_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("2"));
        let head = ResponseHead {
            status: StatusCode::TOO_MANY_REQUESTS,
            headers,
        };
        let delay = default_backoff(
            0,
            Duration::from_millis(100),
            Duration::from_secs(30),
            Some(&head),
        );
        assert_eq!(delay, Duration::from_secs(2));
    }

    #[test]
    fn backoff_ignores_retry_after_on_other_statuses() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("9"));
        let head = ResponseHead {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers,
        };
        let delay = default_backoff(
            0,
            Duration::from_millis(100),
            Duration::from_secs(30),
            Some(&head),
        );
        assert_eq!(delay, Duration::from_millis(100));
    }
}
