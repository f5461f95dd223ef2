mod executor;
mod extract;
mod rate_limit;
mod result;

use std::sync::Arc;

use reqwest::Method;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ScanConfig;
use crate::filter::{FilterError, ResultFilter};

pub use executor::{
    Capture, HttpSettings, HttpSetupError, HttpTransport, RawResponse, RequestExecutor,
    Transport, TransportError,
};
pub use extract::extract_paths;
pub use rate_limit::{RateLimiter, MAX_REQUESTS_PER_SECOND};
pub use result::ScanResult;

#[cfg(test)]
pub(crate) use executor::testing;

// wordlist entries still carrying this marker were meant for a fuzzing mode
// and are never requested.
pub const FUZZ_MARKER: &str = "%FUZZ%";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("scan cancelled")]
pub struct Cancelled;

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error(transparent)]
    Http(#[from] HttpSetupError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

pub struct Scanner {
    target: String,
    methods: Vec<Method>,
    executor: RequestExecutor,
    filter: ResultFilter,
    limiter: RateLimiter,
}

impl Scanner {
    // must be called from within a tokio runtime when rate limiting is on
    pub fn new(config: &ScanConfig) -> Result<Self, ScannerError> {
        let transport = HttpTransport::new(&http_settings(config))?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(
        config: &ScanConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ScannerError> {
        let filter = ResultFilter::new(&config.filter)?;
        let capture = Capture {
            headers: config.output.verbose,
            // recursion needs the body for link extraction even when it is not shown
            body: config.output.verbose || config.recursive,
        };
        let executor = RequestExecutor::new(
            transport,
            config.retry_count,
            config.retry_delay,
            capture,
        );
        let limiter = if config.rate_limit.enabled {
            RateLimiter::per_second(config.rate_limit.requests_per_second)
        } else {
            RateLimiter::disabled()
        };
        Ok(Self {
            target: config.target.trim().to_string(),
            methods: config.methods.clone(),
            executor,
            filter,
            limiter,
        })
    }

    pub fn url_for(&self, path: &str) -> String {
        join_url(&self.target, path)
    }

    pub fn filter(&self) -> &ResultFilter {
        &self.filter
    }

    // one logical check of `path`: every configured method is tried in order
    // and the first result passing the filter wins. `Ok(None)` means nothing
    // is worth reporting for this path.
    pub async fn scan_path(
        &self,
        cancel: &CancellationToken,
        path: &str,
        depth: usize,
    ) -> Result<Option<ScanResult>, Cancelled> {
        self.limiter.acquire(cancel).await?;

        if path.contains(FUZZ_MARKER) {
            debug!(path, "skipping path with unexpanded fuzz marker");
            return Ok(None);
        }

        let url = self.url_for(path);
        for method in self.methods.iter() {
            let result = self.executor.execute(cancel, method, &url, depth).await?;
            if self.filter.include(&result) {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    pub fn close(&mut self) {
        self.limiter.close();
    }
}

pub fn join_url(target: &str, path: &str) -> String {
    format!(
        "{}/{}",
        target.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn http_settings(config: &ScanConfig) -> HttpSettings {
    HttpSettings {
        timeout: config.timeout,
        user_agent: config.user_agent.clone(),
        headers: config.headers.clone(),
        skip_tls_verify: config.skip_tls_verify,
        follow_redirects: config.follow_redirects,
        max_redirects: config.max_redirects,
        pool_size: config.threads,
    }
}
