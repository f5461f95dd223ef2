use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::Serialize;

// the outcome of probing one path. a result either carries a status code
// (the request got an answer) or an error (every attempt failed), never both.
#[derive(Clone, Debug, Serialize)]
pub struct ScanResult {
    url: String,
    status_code: u16,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    depth: usize,
    method: String,
    timestamp: DateTime<Local>,
}

impl ScanResult {
    pub fn response(
        url: impl Into<String>,
        method: impl Into<String>,
        status_code: u16,
        size: u64,
        depth: usize,
    ) -> Self {
        Self {
            url: url.into(),
            status_code,
            size,
            headers: None,
            body: None,
            error: None,
            depth,
            method: method.into(),
            timestamp: Local::now(),
        }
    }

    pub fn failure(
        url: impl Into<String>,
        method: impl Into<String>,
        error: impl Into<String>,
        depth: usize,
    ) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = "request failed".to_string();
        }
        Self {
            url: url.into(),
            status_code: 0,
            size: 0,
            headers: None,
            body: None,
            error: Some(error),
            depth,
            method: method.into(),
            timestamp: Local::now(),
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    // drops the captured content, used when the body was only kept around
    // for link extraction.
    pub fn without_content(mut self) -> Self {
        self.headers = None;
        self.body = None;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn headers(&self) -> Option<&BTreeMap<String, String>> {
        self.headers.as_ref()
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    // 2xx and 3xx answers are the ones worth descending into.
    pub fn is_found(&self) -> bool {
        (200..400).contains(&self.status_code)
    }
}
