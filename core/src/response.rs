//! Responses and one-shot body consumption.
//!
//! # Design
//! The body stays on the connection until a consuming method is called.
//! `text`, `bytes`, `json`, and `body_stream` each take it exactly once;
//! afterwards every consuming method fails with `BodyAlreadyConsumed`.
//! Metadata accessors keep working regardless of the body state.

use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use url::Url;

use crate::charset::{charset_param, Charset};
use crate::error::FetchError;
use crate::headers::Headers;
use crate::transport::body::BodyStream;
use crate::transport::codec::ResponseHead;

enum BodyState {
    Unconsumed(BodyStream),
    Consumed,
}

/// A received HTTP response.
pub struct Response {
    status: u16,
    status_text: String,
    url: Url,
    redirected: bool,
    headers: Headers,
    body: BodyState,
}

impl Response {
    pub(crate) fn new(head: ResponseHead, url: Url, redirected: bool, body: BodyStream) -> Self {
        Self {
            status: head.status,
            status_text: head.reason,
            url,
            redirected,
            headers: head.headers,
            body: BodyState::Unconsumed(body),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase from the status line, as sent by the server.
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// `true` for any status in 200..=299.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Final URL after any redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn redirected(&self) -> bool {
        self.redirected
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    /// Media type from `Content-Type`, without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|media| !media.is_empty())
    }

    /// The `charset` parameter of `Content-Type`, if present.
    pub fn charset(&self) -> Option<&str> {
        self.header("content-type").and_then(charset_param)
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.header("content-encoding")
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")?.trim().parse().ok()
    }

    /// Whether a consuming method has already taken the body.
    pub fn body_used(&self) -> bool {
        matches!(self.body, BodyState::Consumed)
    }

    /// Decode the body with the charset from `Content-Type`, falling back to
    /// UTF-8 when none is given or it is not supported.
    pub fn text(&mut self) -> Result<String, FetchError> {
        let charset = self
            .charset()
            .and_then(|label| Charset::from_label(label).ok())
            .unwrap_or(Charset::Utf8);
        let bytes = self.read_body()?;
        Ok(charset.decode(&bytes))
    }

    /// Decode the body with an explicit charset. An unsupported name fails
    /// without consuming the body.
    pub fn text_with_charset(&mut self, charset: &str) -> Result<String, FetchError> {
        let charset = Charset::from_label(charset)?;
        let bytes = self.read_body()?;
        Ok(charset.decode(&bytes))
    }

    pub fn bytes(&mut self) -> Result<Bytes, FetchError> {
        self.read_body().map(Bytes::from)
    }

    pub fn json<T: DeserializeOwned>(&mut self) -> Result<T, FetchError> {
        let bytes = self.read_body()?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Take the body as a reader, for large or incremental downloads.
    pub fn body_stream(&mut self) -> Result<BodyStream, FetchError> {
        self.take_body()
    }

    fn read_body(&mut self) -> Result<Vec<u8>, FetchError> {
        self.take_body()?.read_all()
    }

    fn take_body(&mut self) -> Result<BodyStream, FetchError> {
        match std::mem::replace(&mut self.body, BodyState::Consumed) {
            BodyState::Unconsumed(stream) => Ok(stream),
            BodyState::Consumed => Err(FetchError::BodyAlreadyConsumed),
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("status_text", &self.status_text)
            .field("url", &self.url.as_str())
            .field("redirected", &self.redirected)
            .field("headers", &self.headers)
            .field("body_used", &self.body_used())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::codec::{parse_response_head, ResponseFraming};
    use crate::transport::testing::ScriptedConnection;
    use serde::Deserialize;
    use std::io::Read;
    use test_case::test_case;

    fn response(head: &str, body: &[u8]) -> Response {
        let raw = format!("{head}\r\n\r\n");
        let (head, _) = parse_response_head(raw.as_bytes()).unwrap().unwrap();
        let stream = BodyStream::new(
            Box::new(ScriptedConnection::new(body)),
            Vec::new(),
            ResponseFraming::Length(body.len() as u64),
            true,
            None,
            None,
        );
        Response::new(head, Url::parse("http://example.test/").unwrap(), false, stream)
    }

    #[test_case(199, false)]
    #[test_case(200, true)]
    #[test_case(204, true)]
    #[test_case(299, true)]
    #[test_case(300, false)]
    #[test_case(404, false)]
    fn ok_covers_2xx(status: u16, expected: bool) {
        let res = response(&format!("HTTP/1.1 {status} Whatever"), b"");
        assert_eq!(res.ok(), expected);
    }

    #[test]
    fn body_is_consumed_once() {
        let mut res = response("HTTP/1.1 200 OK", b"hi");
        assert!(!res.body_used());
        assert_eq!(res.text().unwrap(), "hi");
        assert!(res.body_used());
        assert!(matches!(res.text(), Err(FetchError::BodyAlreadyConsumed)));
        assert!(matches!(res.bytes(), Err(FetchError::BodyAlreadyConsumed)));
        assert!(matches!(res.body_stream(), Err(FetchError::BodyAlreadyConsumed)));
        assert_eq!(res.status(), 200);
    }

    #[test]
    fn stream_then_text_fails() {
        let mut res = response("HTTP/1.1 200 OK", b"abc");
        let mut stream = res.body_stream().unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abc");
        assert!(matches!(res.text(), Err(FetchError::BodyAlreadyConsumed)));
    }

    #[test]
    fn text_uses_declared_charset() {
        let mut res = response("HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=ISO-8859-1", b"caf\xE9");
        assert_eq!(res.content_type(), Some("text/plain"));
        assert_eq!(res.charset(), Some("ISO-8859-1"));
        assert_eq!(res.text().unwrap(), "café");
    }

    #[test]
    fn unknown_charset_falls_back_to_utf8() {
        let mut res = response("HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=x-unknown", "ü".as_bytes());
        assert_eq!(res.text().unwrap(), "ü");
    }

    #[test]
    fn invalid_explicit_charset_keeps_body() {
        let mut res = response("HTTP/1.1 200 OK", b"abc");
        assert!(matches!(res.text_with_charset("nope"), Err(FetchError::InvalidCharset(_))));
        assert!(!res.body_used());
        assert_eq!(res.text_with_charset("us-ascii").unwrap(), "abc");
    }

    #[test]
    fn json_decodes_and_reports_errors() {
        #[derive(Deserialize)]
        struct Item {
            id: u32,
        }
        let mut res = response("HTTP/1.1 200 OK\r\nContent-Type: application/json", br#"{"id":7}"#);
        assert_eq!(res.json::<Item>().unwrap().id, 7);

        let mut res = response("HTTP/1.1 200 OK", b"not json");
        assert!(matches!(res.json::<Item>(), Err(FetchError::Decode(_))));
    }

    #[test]
    fn truncated_body_keeps_status_and_headers() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Length: 10\r\nX-A: 1\r\n\r\n";
        let (head, _) = parse_response_head(raw.as_bytes()).unwrap().unwrap();
        let stream = BodyStream::new(
            Box::new(ScriptedConnection::new(b"abc")),
            Vec::new(),
            ResponseFraming::Length(10),
            true,
            None,
            None,
        );
        let mut res = Response::new(head, Url::parse("http://example.test/").unwrap(), false, stream);

        assert!(matches!(res.text(), Err(FetchError::Protocol(_))));
        assert_eq!(res.status(), 200);
        assert_eq!(res.header("x-a"), Some("1"));
        assert_eq!(res.content_length(), Some(10));
        assert!(res.body_used());
    }

    #[test]
    fn metadata_accessors() {
        let res = response(
            "HTTP/1.1 201 Created\r\nContent-Length: 0\r\nContent-Encoding: gzip\r\nX-A: 1\r\nX-A: 2",
            b"",
        );
        assert_eq!(res.status_text(), "Created");
        assert_eq!(res.content_length(), Some(0));
        assert_eq!(res.content_encoding(), Some("gzip"));
        assert!(res.has_header("x-a"));
        assert_eq!(res.headers().get_all("X-A"), ["1", "2"]);
        assert!(!res.redirected());
        assert_eq!(res.url().as_str(), "http://example.test/");
        assert!(!format!("{res:?}").contains("BodyStream"));
    }
}
