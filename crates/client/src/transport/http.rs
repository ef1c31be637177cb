//! reqwest-backed [`Transport`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use freightdesk_core::{AppConfig, Error, Method};
use reqwest::{Client, StatusCode, header};
use url::Url;

use super::endpoint::{parse_base, resolve};
use super::{Transport, TransportRequest, TransportResponse};

/// Error bodies longer than this are cut before landing in [`Error::HttpError`].
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base URL relative request paths are joined to.
    pub base_url: String,

    /// Request timeout (default: 10s)
    pub timeout: Duration,

    /// User agent string (default: "freightdesk/0.1")
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for HttpTransportConfig {
    fn from(config: &AppConfig) -> Self {
        Self { base_url: config.base_url.clone(), timeout: config.timeout(), user_agent: config.user_agent.clone() }
    }
}

/// JSON-over-HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, Error> {
        let base = parse_base(&config.base_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, base })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Self::new(HttpTransportConfig::from(config))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
        let start = Instant::now();
        let url = resolve(&self.base, &request.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let mut builder = self
            .http
            .request(to_reqwest_method(request.method), url.as_str())
            .header(header::ACCEPT, "application/json");

        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(revision) = &request.if_none_match {
            builder = builder.header(header::IF_NONE_MATCH, revision.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status();

        tracing::debug!(
            method = %request.method,
            url = %url,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "http exchange"
        );

        if status == StatusCode::NOT_MODIFIED {
            return Ok(TransportResponse::NotModified);
        }

        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        let revision = headers.get(header::ETAG.as_str()).cloned();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            let body: String = String::from_utf8_lossy(&bytes).chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(Error::HttpError { status: status.as_u16(), body });
        }

        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok(TransportResponse::Success { status: status.as_u16(), headers, body, revision })
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn map_send_error(err: reqwest::Error) -> Error {
    if err.is_timeout() { Error::Timeout(err.to_string()) } else { Error::Network(format!("network error: {}", err)) }
}
