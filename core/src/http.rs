//! HTTP vocabulary shared by the request and transport layers.
//!
//! # Design
//! `Method` is a closed enum for the standard methods plus an `Extension`
//! variant for other valid tokens. Whether an extension method is accepted is
//! decided at `RequestBuilder::build` time by the strict-mode flag, so parsing
//! itself only rejects strings that could never appear on a request line.

use std::fmt;
use std::str::FromStr;

use crate::error::FetchError;

/// HTTP method for a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
    /// A non-standard method token, kept in upper case.
    Extension(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Extension(name) => name,
        }
    }

    /// Parse a method name, rejecting anything outside the standard set.
    pub fn parse_strict(name: &str) -> Result<Self, FetchError> {
        match name.parse::<Method>()? {
            Method::Extension(_) => Err(FetchError::InvalidMethod(name.to_string())),
            method => Ok(method),
        }
    }

    pub fn is_standard(&self) -> bool {
        !matches!(self, Method::Extension(_))
    }

    /// Methods whose requests conventionally carry a body.
    pub(crate) fn expects_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl FromStr for Method {
    type Err = FetchError;

    /// Case-insensitive. Unknown but well-formed tokens become `Extension`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_token(s) {
            return Err(FetchError::InvalidMethod(s.to_string()));
        }
        let upper = s.to_ascii_uppercase();
        Ok(match upper.as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            _ => Method::Extension(upper),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// URL scheme supported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub(crate) fn from_url(url: &url::Url) -> Option<Self> {
        match url.scheme() {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            _ => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RFC 9110 `token`: one or more tchar.
pub(crate) fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}
