//! Context-scoped HTTP client: one shared client whose base URL, headers,
//! and retry behavior callers override per call through a derived
//! [`Context`], without touching the client's configuration.
//!
//! Built on hyper with rustls, connection pooling, and retry with
//! exponential backoff that honors `Retry-After`.
//!
//! ```no_run
//! use reqscope::{Client, Context, Overrides, RetryOverride};
//!
//! #[tokio::main]
//! async fn main() -> reqscope::Result<()> {
//!     let client = Client::builder("https://api.example.com").try_build()?;
//!
//!     // Shared defaults, per-call overrides.
//!     let ctx = Overrides::new()
//!         .try_header("authorization", "Bearer token")?
//!         .retry(RetryOverride::disabled())
//!         .apply(&Context::background());
//!
//!     let info: Option<serde_json::Value> = client
//!         .execute(
//!             &ctx,
//!             &reqscope::get("/v1/info"),
//!         )
//!         .await?;
//!     println!("{info:?}");
//!     Ok(())
//! }
//! ```

mod client;
mod context;
mod error;
mod execute;
mod overrides;
mod request;
mod response;
mod retry;
mod tls;
mod transport;
mod util;

#[cfg(test)]
mod tests;

pub use client::{Client, ClientBuilder};
pub use context::{Context, ValueStore};
pub use error::{Error, ErrorCode};
pub use execute::{default_response_handler, discard_response_handler};
pub use overrides::Overrides;
pub use request::RequestDescriptor;
pub use response::HttpResponse;
pub use retry::{
    default_backoff, default_retry_decision, BackoffFn, ResponseHead, RetryDecisionFn,
    RetryOverride, RetryVerdict,
};
pub use transport::{
    BoxError, HyperTransport, ResponseBody, Transport, TransportFuture, TransportWrapper,
};

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, Error>;

/// Descriptor for a bare GET of `path`, for calls with nothing to configure.
pub fn get(path: impl Into<String>) -> impl RequestDescriptor {
    request::PlainRequest {
        method: http::Method::GET,
        path: path.into(),
        headers: None,
        body: None,
    }
}

pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, Context, Error, ErrorCode, HttpResponse, Overrides,
        RequestDescriptor, Result, RetryOverride,
    };
}
