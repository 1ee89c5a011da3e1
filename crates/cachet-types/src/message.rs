//! Request and response model.
//!
//! Deliberately small: a request is a method, an absolute URL, a mode and
//! headers; a response is a status, a kind, headers and a body held in
//! [`Bytes`] so cloning a response for a cache write is cheap.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, header};
use url::Url;

use crate::error::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestMode {
    /// Top-level document navigation.
    Navigate,
    /// Same-origin subresource request.
    #[default]
    SameOrigin,
    /// Cross-origin request without CORS; yields opaque responses.
    NoCors,
    /// Cross-origin request using CORS.
    Cors,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    mode: RequestMode,
    headers: HeaderMap,
}

impl Request {
    /// Create a request for an absolute URL.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            mode: RequestMode::default(),
            headers: HeaderMap::new(),
        }
    }

    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parse `url` and create a request for it.
    pub fn parse(method: Method, url: &str) -> Result<Self> {
        Ok(Self::new(method, Url::parse(url)?))
    }

    /// Set the request mode.
    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the URL, keeping method, mode and headers.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn mode(&self) -> RequestMode {
        self.mode
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The URL used as a cache key: the full URL without its fragment.
    pub fn cache_key(&self) -> String {
        strip_fragment(&self.url)
    }
}

/// Render `url` without its fragment.
pub fn strip_fragment(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

/// Response classification, mirroring what a browser-style fetch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResponseKind {
    /// Same-origin response.
    #[default]
    Basic,
    /// Cross-origin response obtained with CORS.
    Cors,
    /// Cross-origin response whose status and body are hidden. Status is 0.
    Opaque,
    /// Transport-level failure surfaced as a response. Status is 0.
    Error,
}

/// A response produced by the network or read from a cache.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    kind: ResponseKind,
    headers: HeaderMap,
    body: Bytes,
    url: Option<Url>,
}

impl Response {
    /// Create a basic response with the given status and body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            kind: ResponseKind::Basic,
            headers: HeaderMap::new(),
            body: body.into(),
            url: None,
        }
    }

    /// Create a `200 OK` response.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, body)
    }

    /// Create an opaque response (status 0, empty body).
    pub fn opaque() -> Self {
        Self {
            kind: ResponseKind::Opaque,
            ..Self::new(0, Bytes::new())
        }
    }

    /// Create a transport-level error response.
    pub fn error() -> Self {
        Self {
            kind: ResponseKind::Error,
            ..Self::new(0, Bytes::new())
        }
    }

    /// Set the response kind.
    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace all headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Record the final URL the response was served from.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_opaque(&self) -> bool {
        self.kind == ResponseKind::Opaque
    }

    /// Whether this response stands for a transport failure.
    pub fn is_error(&self) -> bool {
        self.kind == ResponseKind::Error
    }

    /// Whether the response declares `Vary: *`, which makes it uncacheable.
    pub fn varies_on_everything(&self) -> bool {
        self.headers
            .get_all(header::VARY)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|v| v.trim() == "*")
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header_str(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
