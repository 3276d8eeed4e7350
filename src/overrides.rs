use http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::context::Context;
use crate::error::Error;
use crate::retry::RetryOverride;
use crate::util::{parse_header_name, parse_header_value};

pub(crate) const HEADER_OVERRIDE_KEY: &str = "reqscope.header";
pub(crate) const RETRY_OVERRIDE_KEY: &str = "reqscope.retry";
pub(crate) const BASE_URL_OVERRIDE_KEY: &str = "reqscope.base_url";

/// Per-call overrides attached to a [`Context`], consulted during request
/// assembly ahead of the client's configured defaults.
///
/// Headers merge per name into any override already on the context; retry
/// and base URL replace wholesale. Applying overrides never touches the
/// client itself, so one client serves callers with different needs.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    headers: HeaderMap,
    retry: Option<RetryOverride>,
    base_url: Option<Url>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header applied to every request made under the derived context,
    /// replacing any descriptor-provided value for the same name.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Like [`header`](Self::header) but parsing the name and value,
    /// failing on malformed input.
    pub fn try_header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn retry(mut self, retry: RetryOverride) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Base URL replacing the client's for requests under the derived
    /// context.
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Derives a context carrying these overrides. Headers merge into any
    /// header override already present; later writes win per name.
    pub fn apply(self, ctx: &Context) -> Context {
        let mut ctx = ctx.clone();
        if !self.headers.is_empty() {
            let mut merged = ctx
                .value::<HeaderMap>(HEADER_OVERRIDE_KEY)
                .unwrap_or_default();
            for (name, value) in &self.headers {
                merged.insert(name.clone(), value.clone());
            }
            ctx = ctx.with_value(HEADER_OVERRIDE_KEY, merged);
        }
        if let Some(retry) = self.retry {
            ctx = ctx.with_value(RETRY_OVERRIDE_KEY, retry);
        }
        if let Some(base_url) = self.base_url {
            ctx = ctx.with_value(BASE_URL_OVERRIDE_KEY, base_url);
        }
        ctx
    }
}
