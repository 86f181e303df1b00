use std::time::Duration;

use log::trace;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use thiserror::Error;

use crate::zerochan::tag::SITE_ROOT;

/// Browser user agent; the site serves a challenge page to unknown clients.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Why a single request produced no usable body.
#[derive(Error, Debug)]
pub(crate) enum SendError {
    #[error("not found (HTTP {0})")]
    NotFound(u16),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl SendError {
    /// Whether the server said the resource does not exist. Only these trigger the
    /// extension fallback.
    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, SendError::NotFound(_))
    }

    /// Classifies a non-success status.
    pub(crate) fn from_status(status: u16) -> Self {
        match status {
            403 | 404 | 410 => SendError::NotFound(status),
            _ => SendError::Status(status),
        }
    }
}

/// Blocking GET access to the site. Implemented by [RequestSender] and by scripted fakes in
/// tests.
pub(crate) trait Transport {
    /// Fetches a page as text.
    fn get_text(&self, url: &str) -> Result<String, SendError>;

    /// Fetches a binary body.
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SendError>;
}

/// Sends every request with the headers the site expects.
#[derive(Clone, Debug)]
pub(crate) struct RequestSender {
    client: Client,
}

impl RequestSender {
    /// Builds the client with a fixed timeout.
    pub(crate) fn new(timeout: Duration) -> Result<Self, SendError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(REFERER, HeaderValue::from_static(SITE_ROOT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, SendError> {
        trace!("[HTTP] GET {}", url);
        let response = self.client.get(url).send()?;
        let status = response.status();
        trace!("[HTTP] -> {}", status);

        if status != StatusCode::OK {
            return Err(SendError::from_status(status.as_u16()));
        }

        Ok(response)
    }
}

impl Transport for RequestSender {
    fn get_text(&self, url: &str) -> Result<String, SendError> {
        Ok(self.get(url)?.text()?)
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SendError> {
        let bytes = self.get(url)?.bytes()?;
        trace!("[HTTP] {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
