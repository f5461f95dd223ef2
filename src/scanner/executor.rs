use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{redirect, Method};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Cancelled, ScanResult};

#[derive(Clone, Debug, Default)]
pub struct RawResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest keeps the useful part (refused, dns, timeout) in the source chain
        let mut message = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self { message }
    }
}

// one HTTP round trip. the response body is always drained so the size is exact.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, method: &Method, url: &str) -> Result<RawResponse, TransportError>;
}

#[derive(Clone, Debug)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
    pub headers: Vec<(String, String)>,
    pub skip_tls_verify: bool,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub pool_size: usize,
}

#[derive(Debug, Error)]
pub enum HttpSetupError {
    #[error("invalid header name '{name}'")]
    HeaderName { name: String },

    #[error("invalid value for header '{name}'")]
    HeaderValue { name: String },

    #[error("failed to build HTTP client: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(settings: &HttpSettings) -> Result<Self, HttpSetupError> {
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(&settings.user_agent).map_err(|_| {
            HttpSetupError::HeaderValue {
                name: USER_AGENT.to_string(),
            }
        })?;
        headers.insert(USER_AGENT, user_agent);
        for (name, value) in settings.headers.iter() {
            let key = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| HttpSetupError::HeaderName { name: name.clone() })?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| HttpSetupError::HeaderValue { name: name.clone() })?;
            headers.insert(key, value);
        }

        let redirect_policy = if settings.follow_redirects {
            redirect::Policy::limited(settings.max_redirects)
        } else {
            redirect::Policy::none()
        };

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(redirect_policy)
            .timeout(settings.timeout)
            .danger_accept_invalid_hostnames(settings.skip_tls_verify)
            .danger_accept_invalid_certs(settings.skip_tls_verify)
            .pool_max_idle_per_host(settings.pool_size.max(1))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HttpSetupError::Client { source: e })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, method: &Method, url: &str) -> Result<RawResponse, TransportError> {
        let resp = self.client.request(method.clone(), url).send().await?;
        let status = resp.status().as_u16();

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (k, v) in resp.headers().iter() {
            let v = String::from_utf8_lossy(v.as_bytes());
            headers
                .entry(k.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&v);
                })
                .or_insert_with(|| v.to_string());
        }

        let body = match resp.bytes().await {
            Ok(body) => body.to_vec(),
            Err(e) => {
                warn!(url, error = %TransportError::from(e), "failed to read response body");
                Vec::new()
            }
        };

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

// what to keep from a response besides status and size
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capture {
    pub headers: bool,
    pub body: bool,
}

#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    retry_count: u32,
    retry_delay: Duration,
    capture: Capture,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        retry_count: u32,
        retry_delay: Duration,
        capture: Capture,
    ) -> Self {
        Self {
            transport,
            retry_count,
            retry_delay,
            capture,
        }
    }

    // runs up to `retry_count + 1` attempts. a transport failure on the last
    // attempt becomes a failed `ScanResult`, only cancellation is an `Err`.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        method: &Method,
        url: &str,
        depth: usize,
    ) -> Result<ScanResult, Cancelled> {
        let mut last_error: Option<TransportError> = None;
        for attempt in 0..=self.retry_count {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                outcome = self.transport.send(method, url) => outcome,
            };
            match outcome {
                Ok(resp) => return Ok(self.summarize(method, url, resp, depth)),
                Err(e) => {
                    if attempt < self.retry_count {
                        debug!(url, method = %method, attempt = attempt + 1, error = %e, "request failed, retrying");
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Err(Cancelled),
                            _ = tokio::time::sleep(self.retry_delay) => {}
                        }
                    }
                    last_error = Some(e);
                }
            }
        }
        let message = last_error.map(|e| e.to_string()).unwrap_or_default();
        Ok(ScanResult::failure(url, method.as_str(), message, depth))
    }

    fn summarize(&self, method: &Method, url: &str, resp: RawResponse, depth: usize) -> ScanResult {
        let RawResponse {
            status,
            headers,
            body,
        } = resp;
        let mut result =
            ScanResult::response(url, method.as_str(), status, body.len() as u64, depth);
        if self.capture.headers {
            result = result.with_headers(headers);
        }
        if self.capture.body {
            result = result.with_body(String::from_utf8_lossy(&body).into_owned());
        }
        result
    }
}
