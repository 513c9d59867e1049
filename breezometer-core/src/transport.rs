use std::{collections::HashMap, fmt::Debug, time::Duration};

use async_trait::async_trait;
use reqwest::{
    Client, Url,
    header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT},
};

use crate::{error::TransportError, normalize::QueryParams};

pub const DEFAULT_BASE_URL: &str = "https://api.breezometer.com/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Status code and raw body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// Issues a single GET. Retrying and classification happen above this seam.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn get(&self, path: &str, query: &QueryParams) -> Result<HttpReply, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    base_url: Url,
    http: Client,
}

impl ReqwestTransport {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        headers: &HashMap<String, String>,
    ) -> Result<Self, TransportError> {
        let base_url = parse_base_url(base_url)?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("breezometer-rs/", env!("CARGO_PKG_VERSION"))),
        );
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Other(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Other(format!("invalid header value for '{name}': {e}")))?;
            default_headers.insert(name, value);
        }

        let http = Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .gzip(true)
            .build()?;

        Ok(Self { base_url, http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, path: &str, query: &QueryParams) -> Result<HttpReply, TransportError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| TransportError::BaseUrl {
                url: format!("{}{path}", self.base_url),
                reason: e.to_string(),
            })?;

        let res = self.http.get(url).query(query.pairs()).send().await?;

        let status = res.status().as_u16();
        let body = res.text().await?;

        Ok(HttpReply { status, body })
    }
}

/// `Url::join` drops the last path segment unless the base ends in a slash.
fn parse_base_url(raw: &str) -> Result<Url, TransportError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };

    Url::parse(&normalized).map_err(|e| TransportError::BaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Shortens response bodies for error messages.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let cut = (0..=MAX).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}
