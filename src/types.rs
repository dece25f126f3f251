//! Core data types shared by the controller, the policy and the bindings.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Chunk`] | One piece of request body, already decoded to bytes |
//! | [`Encoding`] | Text encodings accepted by [`Chunk::encoded`] |
//! | [`HopRequest`] | URL, method and headers of a single hop |
//! | [`ResponseDetails`] | Status and headers of a redirect response, handed to the hook |
//! | [`RedirectRecord`] | One entry of the redirect history |
//! | [`SocketInfo`] | Addresses of the connection serving the current hop |

use crate::error::{FollowError, Result};
use crate::protocol::headers::header_snapshot;
use base64::Engine;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use url::Url;

/// Text encodings a body chunk may be supplied in.
///
/// # Examples
///
/// ```
/// use follow_redirects::Encoding;
///
/// assert_eq!("utf8".parse::<Encoding>().unwrap(), Encoding::Utf8);
/// assert_eq!("BASE64".parse::<Encoding>().unwrap(), Encoding::Base64);
/// assert!("rot13".parse::<Encoding>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// UTF-8 text, sent as is.
    #[default]
    Utf8,
    /// One byte per character; characters above U+00FF are rejected.
    Latin1,
    /// Standard base64 with padding.
    Base64,
}

impl FromStr for Encoding {
    type Err = FollowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "latin1" | "binary" => Ok(Encoding::Latin1),
            "base64" => Ok(Encoding::Base64),
            other => Err(FollowError::InvalidChunk(format!("Unknown encoding: {other}"))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Utf8 => f.write_str("utf8"),
            Encoding::Latin1 => f.write_str("latin1"),
            Encoding::Base64 => f.write_str("base64"),
        }
    }
}

/// A piece of request body.
///
/// Text and raw bytes convert infallibly; text in another encoding goes through
/// [`Chunk::encoded`], which is where invalid input is caught.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Chunk(Bytes);

impl Chunk {
    /// Decode `text` with the named encoding.
    ///
    /// # Errors
    ///
    /// [`FollowError::InvalidChunk`] if the encoding is unknown or the text does not
    /// decode.
    pub fn encoded(text: &str, encoding: &str) -> Result<Self> {
        let encoding: Encoding = encoding.parse()?;
        Self::decode(text, encoding)
    }

    /// Decode `text` with an already parsed encoding.
    pub fn decode(text: &str, encoding: Encoding) -> Result<Self> {
        match encoding {
            Encoding::Utf8 => Ok(Chunk(Bytes::copy_from_slice(text.as_bytes()))),
            Encoding::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        FollowError::InvalidChunk(format!(
                            "character {c:?} is not representable in latin1"
                        ))
                    })
                })
                .collect::<Result<Vec<u8>>>()
                .map(|bytes| Chunk(Bytes::from(bytes))),
            Encoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map(|bytes| Chunk(Bytes::from(bytes)))
                .map_err(|e| FollowError::InvalidChunk(format!("invalid base64 data: {e}"))),
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the chunk carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The underlying bytes.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Chunk(bytes)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Chunk(Bytes::from(bytes))
    }
}

impl From<&[u8]> for Chunk {
    fn from(bytes: &[u8]) -> Self {
        Chunk(Bytes::copy_from_slice(bytes))
    }
}

impl<const N: usize> From<&[u8; N]> for Chunk {
    fn from(bytes: &[u8; N]) -> Self {
        Chunk(Bytes::copy_from_slice(bytes))
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Chunk(Bytes::from(text))
    }
}

impl From<&str> for Chunk {
    fn from(text: &str) -> Self {
        Chunk(Bytes::copy_from_slice(text.as_bytes()))
    }
}

/// Target, method and headers of one hop.
///
/// The controller derives a fresh `HopRequest` for every redirect; the pre-redirect hook
/// receives the next one mutably and the one that was just redirected read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct HopRequest {
    /// Absolute target URL.
    pub url: Url,
    /// HTTP method.
    pub method: Method,
    /// Request headers.
    pub headers: HeaderMap,
}

impl HopRequest {
    /// Create a hop request.
    pub fn new(url: Url, method: Method, headers: HeaderMap) -> Self {
        HopRequest {
            url,
            method,
            headers,
        }
    }

    /// `host[:port]` of the target URL, the way a `Host` header would spell it.
    pub fn authority(&self) -> String {
        authority_of(&self.url)
    }
}

/// `host[:port]` of a URL, omitting the scheme's default port.
pub(crate) fn authority_of(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

/// Status and headers of a response that triggered a redirect.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDetails {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
}

/// One hop observed while following a chain.
///
/// Headers are flattened into a sorted map of lowercase names; repeated headers are
/// joined with `", "`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectRecord {
    /// URL requested on this hop.
    pub url: String,
    /// Status code the hop answered with.
    pub status_code: u16,
    /// Response headers of the hop.
    pub headers: BTreeMap<String, String>,
}

impl RedirectRecord {
    /// Snapshot a hop's response.
    pub fn new(url: &Url, status: StatusCode, headers: &HeaderMap) -> Self {
        RedirectRecord {
            url: url.to_string(),
            status_code: status.as_u16(),
            headers: header_snapshot(headers),
        }
    }

    /// Look up a response header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Connection identity of the hop currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SocketInfo {
    /// Local address, when the binding knows it.
    pub local_addr: Option<SocketAddr>,
    /// Peer address.
    pub remote_addr: Option<SocketAddr>,
}

impl SocketInfo {
    /// Socket info with only the peer address known.
    pub fn remote(addr: SocketAddr) -> Self {
        SocketInfo {
            local_addr: None,
            remote_addr: Some(addr),
        }
    }
}
