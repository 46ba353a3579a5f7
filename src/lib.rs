//! Turnout Fetch
//!
//! Retrieves a voter-turnout page and turns it into canonical, pretty-printed
//! HTML. Two pipelines feed the same normalizer:
//!
//! - **Direct**: one HTTP GET with browser-like headers, followed by explicit
//!   gzip/brotli decoding (`fetch` + `decode`).
//! - **Rendered**: load the page in Chrome, enter an iframe, wait for a button,
//!   click it and capture the resulting DOM (`render` + `cdp`).
//!
//! # Example
//!
//! ```no_run
//! use turnout_fetch::{pipeline, FetchConfig, FetchTarget};
//! use turnout_fetch::fetch::{HttpFetcher, ReqwestTransport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FetchConfig { timeout_seconds: 10, ..Default::default() };
//! let target = FetchTarget::new("https://example.com/turnout")?;
//!
//! let fetcher = HttpFetcher::new(ReqwestTransport::new()?);
//! let document = pipeline::fetch_direct(&fetcher, &target, &config)?;
//! println!("{}", document.text);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, ErrorKind, Result};

pub mod decode;
pub mod fetch;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod sink;

// Chrome DevTools Protocol backend for the rendered pipeline
#[cfg(feature = "cdp")]
pub mod cdp;

pub use decode::Encoding;
pub use normalize::NormalizedDocument;

/// Chrome flags needed to run unattended in containers and CI.
pub const REQUIRED_CHROME_ARGS: [&str; 3] =
    ["--disable-gpu", "--no-sandbox", "--disable-dev-shm-usage"];

/// Configuration shared by both pipelines
///
/// Every default lives in the `Default` impl:
/// - a 20 second bound on each blocking step
/// - headless Chrome with the flags from [`REQUIRED_CHROME_ARGS`]
/// - a desktop-Chrome header set; `Referer` is filled in per target by
///   [`FetchConfig::headers_for`]
///
/// # Examples
///
/// ```
/// let cfg = turnout_fetch::FetchConfig::default();
/// assert!(cfg.headless);
/// assert_eq!(cfg.header("accept-encoding"), Some("gzip, deflate, br"));
/// ```
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Upper bound for each blocking step (HTTP request, navigation, each wait)
    pub timeout_seconds: u64,
    /// Whether Chrome runs without a window
    pub headless: bool,
    /// Extra command-line arguments for Chrome
    pub chrome_args: Vec<String>,
    /// Request headers for the direct pipeline, in send order
    pub headers: Vec<(String, String)>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 20,
            headless: true,
            chrome_args: REQUIRED_CHROME_ARGS.iter().map(|a| a.to_string()).collect(),
            headers: default_headers(),
        }
    }
}

fn default_headers() -> Vec<(String, String)> {
    [
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        ),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Accept-Encoding", "gzip, deflate, br"),
        ("Connection", "keep-alive"),
        ("Upgrade-Insecure-Requests", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl FetchConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing value with the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    /// The headers actually sent for `target`. Adds a `Referer` pointing at
    /// the target's origin unless one is configured.
    pub fn headers_for(&self, target: &FetchTarget) -> Vec<(String, String)> {
        let mut headers = self.headers.clone();
        if self.header("referer").is_none() {
            headers.push(("Referer".to_string(), target.origin()));
        }
        headers
    }

    /// Chrome arguments with the required flags appended when missing.
    pub fn effective_chrome_args(&self) -> Vec<String> {
        let mut args = self.chrome_args.clone();
        for required in REQUIRED_CHROME_ARGS {
            if !args.iter().any(|a| a == required) {
                args.push(required.to_string());
            }
        }
        args
    }
}

/// The page to retrieve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    url: url::Url,
}

impl FetchTarget {
    pub fn new(url: &str) -> Result<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::ConfigError(format!("invalid target URL '{}': {}", url, e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(Self { url: parsed }),
            other => Err(Error::ConfigError(format!(
                "unsupported URL scheme '{}' in '{}'",
                other, url
            ))),
        }
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// `scheme://host[:port]/`
    pub fn origin(&self) -> String {
        format!("{}/", self.url.origin().ascii_serialization())
    }
}

/// What to do in the rendered pipeline once the page has loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    /// Title attribute of the iframe holding the button, if any
    pub frame_title: Option<String>,
    /// `id` of the button that reveals the data panel
    pub element_id: String,
}

impl Default for Interaction {
    fn default() -> Self {
        Self {
            frame_title: Some("Data Hub - Voter Registration".to_string()),
            element_id: "AbsenteeBallots".to_string(),
        }
    }
}
