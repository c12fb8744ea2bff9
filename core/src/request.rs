//! Immutable requests and the builder that produces them.
//!
//! # Design
//! `RequestBuilder` is a consuming builder: every setter takes `self` and
//! returns the updated builder, and `build()` validates everything at once
//! before freezing the result into a `Request`. A `Request` is never mutated
//! afterwards, so one value can be dispatched from several threads.
//!
//! Byte bodies are reference counted (`bytes::Bytes`) and replay for free.
//! Streaming bodies are shared behind a lock and can be read by exactly one
//! dispatch.

use std::fmt;
use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use url::Url;

use crate::error::FetchError;
use crate::headers::Headers;
use crate::http::{Method, Scheme};

/// Default cap on followed redirects.
pub const DEFAULT_MAX_REDIRECTS: u32 = 20;

type SharedReader = Arc<Mutex<Option<Box<dyn Read + Send>>>>;

/// Request payload.
#[derive(Clone, Default)]
pub struct Body {
    kind: BodyKind,
}

#[derive(Clone, Default)]
enum BodyKind {
    #[default]
    Empty,
    Bytes(Bytes),
    Stream { reader: SharedReader, len: Option<u64> },
}

impl Body {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A body read from `reader` and sent with chunked transfer encoding.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self::stream(Box::new(reader), None)
    }

    /// A body read from `reader` that yields exactly `len` bytes.
    pub fn sized_reader(reader: impl Read + Send + 'static, len: u64) -> Self {
        Self::stream(Box::new(reader), Some(len))
    }

    fn stream(reader: Box<dyn Read + Send>, len: Option<u64>) -> Self {
        Self {
            kind: BodyKind::Stream {
                reader: Arc::new(Mutex::new(Some(reader))),
                len,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.kind {
            BodyKind::Empty => true,
            BodyKind::Bytes(bytes) => bytes.is_empty(),
            BodyKind::Stream { len, .. } => *len == Some(0),
        }
    }

    /// Length in bytes, when known up front.
    pub fn len(&self) -> Option<u64> {
        match &self.kind {
            BodyKind::Empty => Some(0),
            BodyKind::Bytes(bytes) => Some(bytes.len() as u64),
            BodyKind::Stream { len, .. } => *len,
        }
    }

    /// The payload, for in-memory bodies.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            BodyKind::Empty => Some(&[]),
            BodyKind::Bytes(bytes) => Some(bytes),
            BodyKind::Stream { .. } => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.kind, BodyKind::Stream { .. })
    }

    /// Whether the body can still be sent, i.e. it is in memory or its
    /// stream has not been taken by an earlier dispatch.
    pub fn is_available(&self) -> bool {
        match &self.kind {
            BodyKind::Stream { reader, .. } => reader
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some(),
            _ => true,
        }
    }

    pub(crate) fn source(&self) -> Result<BodySource, FetchError> {
        match &self.kind {
            BodyKind::Empty => Ok(BodySource::Bytes(Bytes::new())),
            BodyKind::Bytes(bytes) => Ok(BodySource::Bytes(bytes.clone())),
            BodyKind::Stream { reader, len } => reader
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .map(|reader| BodySource::Stream { reader, len: *len })
                .ok_or(FetchError::BodyAlreadyConsumed),
        }
    }
}

/// A body ready to be written by the transport.
pub(crate) enum BodySource {
    Bytes(Bytes),
    Stream {
        reader: Box<dyn Read + Send>,
        len: Option<u64>,
    },
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BodyKind::Empty => f.write_str("Body::Empty"),
            BodyKind::Bytes(bytes) => write!(f, "Body::Bytes({} bytes)", bytes.len()),
            BodyKind::Stream { len: Some(len), .. } => write!(f, "Body::Stream({len} bytes)"),
            BodyKind::Stream { len: None, .. } => f.write_str("Body::Stream(chunked)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self {
            kind: BodyKind::Bytes(bytes),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Bytes::from_static(bytes).into()
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

/// A validated, immutable HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Headers,
    body: Body,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    follow_redirects: bool,
    max_redirects: u32,
}

impl Request {
    pub fn builder(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Budget for connect, write, and reading the response head.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Per-request override of `Config::connect_timeout`.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Per-request override of `Config::read_timeout`.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn follow_redirects(&self) -> bool {
        self.follow_redirects
    }

    pub fn max_redirects(&self) -> u32 {
        self.max_redirects
    }
}

#[derive(Debug, Clone)]
pub(crate) enum MethodInput {
    Parsed(Method),
    Named(String),
}

/// Accumulates request parts; `build()` validates and freezes them.
#[derive(Debug, Clone)]
#[must_use]
pub struct RequestBuilder {
    url: String,
    method: MethodInput,
    headers: Headers,
    query: Vec<(String, String)>,
    body: Body,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    follow_redirects: bool,
    max_redirects: u32,
    strict: bool,
}

impl RequestBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: MethodInput::Parsed(Method::Get),
            headers: Headers::new(),
            query: Vec::new(),
            body: Body::empty(),
            timeout: None,
            connect_timeout: None,
            read_timeout: None,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            strict: true,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = MethodInput::Parsed(method);
        self
    }

    /// Set the method by name. Validated by `build()`.
    pub fn method_name(mut self, name: impl Into<String>) -> Self {
        self.method = MethodInput::Named(name.into());
        self
    }

    pub(crate) fn method_input(mut self, method: MethodInput) -> Self {
        self.method = method;
        self
    }

    /// Set a header, replacing any values already present for `name`.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Add a header value without removing existing ones.
    pub fn append_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Merge headers in order; names already present gain extra values.
    pub fn headers(mut self, headers: &Headers) -> Self {
        for (name, value) in headers.iter() {
            self.headers.append(name, value);
        }
        self
    }

    pub fn content_type(self, content_type: impl Into<String>) -> Self {
        self.header("Content-Type", content_type)
    }

    /// Append a query parameter; the value is percent-encoded.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Bound on each socket read or write, body reads included.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    /// When on (the default), only standard methods are accepted.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn build(self) -> Result<Request, FetchError> {
        let mut url = Url::parse(&self.url).map_err(|e| FetchError::invalid_url(&self.url, e))?;
        if Scheme::from_url(&url).is_none() {
            return Err(FetchError::invalid_url(
                &self.url,
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(FetchError::invalid_url(&self.url, "missing host"));
        }
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }

        let method = match self.method {
            MethodInput::Parsed(method) => method,
            MethodInput::Named(name) => name.parse()?,
        };
        if self.strict && !method.is_standard() {
            return Err(FetchError::InvalidMethod(method.to_string()));
        }

        if let Some(name) = self.headers.find_invalid() {
            return Err(FetchError::InvalidHeader(name));
        }

        Ok(Request {
            method,
            url,
            headers: self.headers,
            body: self.body,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            follow_redirects: self.follow_redirects,
            max_redirects: self.max_redirects,
        })
    }
}
