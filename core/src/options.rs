//! Per-call options for the `fetch` entry points.
//!
//! `FetchOptions` is the chaining parameter object passed next to a URL. It
//! holds only what the caller set; anything left unset falls back to the
//! `Client`'s `Config` when the options are turned into a `RequestBuilder`.

use std::time::Duration;

use crate::headers::Headers;
use crate::http::Method;
use crate::request::{Body, MethodInput, RequestBuilder};

/// Options for a single fetch: method, headers, body, timeout, redirects.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct FetchOptions {
    method: Option<MethodInput>,
    headers: Headers,
    query: Vec<(String, String)>,
    body: Option<Body>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    follow_redirects: Option<bool>,
    max_redirects: Option<u32>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request method. Defaults to GET.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(MethodInput::Parsed(method));
        self
    }

    /// Request method by name, validated when the request is built.
    pub fn method_name(mut self, name: impl Into<String>) -> Self {
        self.method = Some(MethodInput::Named(name.into()));
        self
    }

    /// Set a header, replacing earlier values of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn append_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn content_type(self, content_type: impl Into<String>) -> Self {
        self.header("Content-Type", content_type)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Bound on connect + write + reading the response head.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override `Config::connect_timeout` for this call.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Override `Config::read_timeout` for this call.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = Some(follow);
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = Some(max);
        self
    }

    /// Layer these options over `builder`.
    pub fn apply(self, builder: RequestBuilder) -> RequestBuilder {
        let mut builder = builder.headers(&self.headers);
        if let Some(method) = self.method {
            builder = builder.method_input(method);
        }
        for (key, value) in self.query {
            builder = builder.query(key, value);
        }
        if let Some(body) = self.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = self.read_timeout {
            builder = builder.read_timeout(timeout);
        }
        if let Some(follow) = self.follow_redirects {
            builder = builder.follow_redirects(follow);
        }
        if let Some(max) = self.max_redirects {
            builder = builder.max_redirects(max);
        }
        builder
    }
}
