//! Content-Encoding dispatch for raw response bodies.
//!
//! The transport never decompresses on its own, so whatever the server
//! declared in `Content-Encoding` is resolved here into exactly one action.
//! Declarations we cannot honour fail instead of being passed through.

use std::fmt;
use std::io::Read;

use flate2::read::MultiGzDecoder;
use log::debug;

use crate::fetch::RawPayload;
use crate::{Error, Result};

/// Content encoding declared by a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    /// No `Content-Encoding`, or `identity`
    Identity,
    Gzip,
    Brotli,
    /// Anything else, kept verbatim for the error message
    Unknown(String),
}

impl Encoding {
    /// Interpret a `Content-Encoding` header value (`None` when absent).
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(raw) = value else {
            return Encoding::Identity;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Encoding::Identity,
            "gzip" | "x-gzip" => Encoding::Gzip,
            "br" => Encoding::Brotli,
            _ => Encoding::Unknown(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Identity => f.write_str("identity"),
            Encoding::Gzip => f.write_str("gzip"),
            Encoding::Brotli => f.write_str("br"),
            Encoding::Unknown(name) => f.write_str(name),
        }
    }
}

const BROTLI_BUFFER_SIZE: usize = 4096;

/// Decompress `payload` according to its declared encoding.
pub fn decode(payload: &RawPayload) -> Result<Vec<u8>> {
    let decoded = match &payload.encoding {
        Encoding::Identity => payload.bytes.clone(),
        Encoding::Gzip => {
            let mut out = Vec::new();
            MultiGzDecoder::new(payload.bytes.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| Error::DecodeFailure(format!("gzip: {}", e)))?;
            out
        }
        Encoding::Brotli => {
            let mut out = Vec::new();
            brotli::Decompressor::new(payload.bytes.as_slice(), BROTLI_BUFFER_SIZE)
                .read_to_end(&mut out)
                .map_err(|e| Error::DecodeFailure(format!("brotli: {}", e)))?;
            out
        }
        Encoding::Unknown(name) => return Err(Error::UnsupportedEncoding(name.clone())),
    };

    debug!(
        "decoded {} body: {} -> {} bytes",
        payload.encoding,
        payload.bytes.len(),
        decoded.len()
    );
    Ok(decoded)
}
