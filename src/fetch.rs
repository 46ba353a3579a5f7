//! Single-request HTTP fetcher for the direct pipeline.
//!
//! `HttpFetcher` owns the policy (status handling, encoding detection) while
//! the `Transport` trait performs the actual GET. The production transport is
//! reqwest's blocking client, built without its decompression features so the
//! body arrives exactly as the server sent it.

use std::time::Duration;

use log::{debug, info};
use reqwest::blocking::Client;

use crate::decode::Encoding;
use crate::{Error, Result};

/// Raw response body plus the metadata the decoder needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    pub bytes: Vec<u8>,
    pub encoding: Encoding,
    pub status_code: u16,
}

/// What a transport hands back for one GET
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    /// Reason phrase, when the transport knows one
    pub reason: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Performs one blocking GET.
///
/// Implementations report an expired `timeout` as [`Error::FetchTimeout`] and
/// other connection problems as [`Error::NetworkError`]. Non-2xx statuses are
/// returned as ordinary responses; the fetcher decides what they mean.
pub trait Transport {
    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse>;
}

/// `Transport` backed by `reqwest::blocking`
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<TransportResponse> {
        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                Error::FetchTimeout { url: url.to_string(), seconds: timeout.as_secs() }
            } else {
                Error::NetworkError(format!("GET {} failed: {}", url, e))
            }
        };

        let res = request.send().map_err(map_err)?;

        let status = res.status();
        let headers = res
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = res.bytes().map_err(map_err)?.to_vec();

        Ok(TransportResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            headers,
            body,
        })
    }
}

/// Issues the GET and turns the response into a [`RawPayload`]
pub struct HttpFetcher<T: Transport> {
    transport: T,
}

impl<T: Transport> HttpFetcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn fetch(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout_seconds: u64,
    ) -> Result<RawPayload> {
        info!("fetching {}", url);
        let res = self
            .transport
            .get(url, headers, Duration::from_secs(timeout_seconds))?;

        if !(200..300).contains(&res.status) {
            return Err(Error::HttpStatusFailure {
                status: res.status,
                reason: res.reason.clone().unwrap_or_default(),
            });
        }

        let encoding = Encoding::from_header(res.header("content-encoding"));
        debug!(
            "{} answered {} with {} bytes ({})",
            url,
            res.status,
            res.body.len(),
            encoding
        );

        Ok(RawPayload {
            bytes: res.body,
            encoding,
            status_code: res.status,
        })
    }
}
