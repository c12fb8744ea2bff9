//! HTTP/1.1 wire format: request heads out, response heads in.
//!
//! # Design
//! Everything here is pure except `write_body`, which only needs a `Write`.
//! Reading from the socket, and the timeouts around it, belong to the
//! exchange; this module only turns bytes into values and back so it can be
//! checked against fixed vectors.

use std::fmt::Write as _;
use std::io::{self, Read, Write};

use httparse::Status;
use url::{Position, Url};

use crate::error::FetchError;
use crate::headers::Headers;
use crate::http::Method;
use crate::request::{Body, BodySource};

/// Most headers accepted in one response head.
pub const MAX_HEADERS: usize = 100;

/// Largest response head accepted, in bytes.
pub const MAX_HEAD_LEN: usize = 64 * 1024;

const CHUNK_LEN: usize = 8 * 1024;

/// How the request body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFraming {
    /// No body and no framing header.
    None,
    Length(u64),
    Chunked,
}

impl RequestFraming {
    pub fn for_body(method: &Method, body: &Body) -> Self {
        match body.len() {
            Some(0) if method.expects_body() => RequestFraming::Length(0),
            Some(0) => RequestFraming::None,
            Some(len) => RequestFraming::Length(len),
            None => RequestFraming::Chunked,
        }
    }
}

/// Serialize the request line and headers, including `Host` and framing.
///
/// Caller-supplied `Content-Length` and `Transfer-Encoding` are dropped in
/// favour of `framing`, so the head always matches the body that follows.
pub fn encode_request_head(
    method: &Method,
    url: &Url,
    headers: &Headers,
    framing: RequestFraming,
) -> Vec<u8> {
    let mut head = String::with_capacity(256);
    let _ = write!(head, "{method} {} HTTP/1.1\r\n", request_target(url));
    if !headers.contains("host") {
        let _ = write!(head, "Host: {}\r\n", host_header(url));
    }
    for (name, value) in headers.iter() {
        if name.eq_ignore_ascii_case("content-length")
            || name.eq_ignore_ascii_case("transfer-encoding")
        {
            continue;
        }
        let _ = write!(head, "{name}: {value}\r\n");
    }
    match framing {
        RequestFraming::None => {}
        RequestFraming::Length(len) => {
            let _ = write!(head, "Content-Length: {len}\r\n");
        }
        RequestFraming::Chunked => head.push_str("Transfer-Encoding: chunked\r\n"),
    }
    head.push_str("\r\n");
    head.into_bytes()
}

/// Origin-form target: path plus query, never the fragment.
pub fn request_target(url: &Url) -> &str {
    &url[Position::BeforePath..Position::AfterQuery]
}

/// `Host` header value; the port is omitted when it is the scheme default.
pub fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Write the body that follows a head encoded with the same framing.
pub(crate) fn write_body<W: Write + ?Sized>(writer: &mut W, source: BodySource) -> io::Result<()> {
    match source {
        BodySource::Bytes(bytes) => writer.write_all(&bytes),
        BodySource::Stream {
            reader,
            len: Some(len),
        } => {
            let copied = io::copy(&mut reader.take(len), writer)?;
            if copied != len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("request body ended after {copied} of {len} bytes"),
                ));
            }
            Ok(())
        }
        BodySource::Stream { reader, len: None } => write_chunked(reader, writer),
    }
}

fn write_chunked<R: Read, W: Write + ?Sized>(mut reader: R, writer: &mut W) -> io::Result<()> {
    let mut buf = vec![0u8; CHUNK_LEN];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(format!("{n:X}\r\n").as_bytes())?;
        writer.write_all(&buf[..n])?;
        writer.write_all(b"\r\n")?;
    }
    writer.write_all(b"0\r\n\r\n")
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Minor HTTP version: `1` for HTTP/1.1, `0` for HTTP/1.0.
    pub minor_version: u8,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
}

impl ResponseHead {
    /// Whether the server allows another request on this connection.
    pub fn keep_alive(&self) -> bool {
        let mut close = false;
        let mut keep_alive = false;
        for token in list_tokens(&self.headers, "connection") {
            close |= token.eq_ignore_ascii_case("close");
            keep_alive |= token.eq_ignore_ascii_case("keep-alive");
        }
        if close {
            return false;
        }
        self.minor_version >= 1 || keep_alive
    }

    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }
}

/// Parse a response head from the start of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the head and the
/// number of bytes it occupied.
pub fn parse_response_head(buf: &[u8]) -> Result<Option<(ResponseHead, usize)>, FetchError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    let len = match response.parse(buf) {
        Ok(Status::Complete(len)) => len,
        Ok(Status::Partial) => return Ok(None),
        Err(e) => return Err(FetchError::Protocol(e.to_string())),
    };

    let status = response.code.unwrap_or_default();
    if !(100..=599).contains(&status) {
        return Err(FetchError::Protocol(format!("status code {status} out of range")));
    }

    let mut parsed = Headers::new();
    for header in response.headers.iter() {
        parsed.append(header.name, String::from_utf8_lossy(header.value).into_owned());
    }

    Ok(Some((
        ResponseHead {
            minor_version: response.version.unwrap_or(1),
            status,
            reason: response.reason.unwrap_or_default().to_string(),
            headers: parsed,
        },
        len,
    )))
}

/// How the response body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFraming {
    Empty,
    Length(u64),
    Chunked,
    /// Body runs until the server closes the connection.
    UntilClose,
}

/// Decide body framing from the request method and the response head.
pub fn response_framing(method: &Method, head: &ResponseHead) -> Result<ResponseFraming, FetchError> {
    if *method == Method::Head || head.is_informational() || matches!(head.status, 204 | 304) {
        return Ok(ResponseFraming::Empty);
    }

    if let Some(last) = list_tokens(&head.headers, "transfer-encoding").last() {
        return Ok(if last.eq_ignore_ascii_case("chunked") {
            ResponseFraming::Chunked
        } else {
            ResponseFraming::UntilClose
        });
    }

    let mut length = None;
    for token in list_tokens(&head.headers, "content-length") {
        let value: u64 = token
            .parse()
            .map_err(|_| FetchError::Protocol(format!("invalid content-length `{token}`")))?;
        match length {
            Some(existing) if existing != value => {
                return Err(FetchError::Protocol("conflicting content-length values".into()));
            }
            _ => length = Some(value),
        }
    }

    Ok(length.map_or(ResponseFraming::UntilClose, ResponseFraming::Length))
}

/// Comma-separated tokens across every value of `name`.
fn list_tokens<'a>(headers: &'a Headers, name: &str) -> impl Iterator<Item = &'a str> {
    headers
        .get_all(name)
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn head(raw: &str) -> ResponseHead {
        parse_response_head(raw.as_bytes()).unwrap().unwrap().0
    }

    #[test]
    fn encodes_get_without_framing() {
        let url = Url::parse("http://example.test/ok#frag").unwrap();
        let bytes = encode_request_head(&Method::Get, &url, &Headers::new(), RequestFraming::None);
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "GET /ok HTTP/1.1\r\nHost: example.test\r\n\r\n"
        );
    }

    #[test]
    fn caller_framing_headers_are_replaced() {
        let url = Url::parse("http://example.test:8080/up?x=1").unwrap();
        let mut headers = Headers::new();
        headers.set("Content-Length", "999");
        headers.set("Host", "override.test");
        let bytes = encode_request_head(&Method::Post, &url, &headers, RequestFraming::Length(4));
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "POST /up?x=1 HTTP/1.1\r\nHost: override.test\r\nContent-Length: 4\r\n\r\n"
        );
    }

    #[test]
    fn framing_follows_body_and_method() {
        assert_eq!(RequestFraming::for_body(&Method::Get, &Body::empty()), RequestFraming::None);
        assert_eq!(RequestFraming::for_body(&Method::Post, &Body::empty()), RequestFraming::Length(0));
        assert_eq!(RequestFraming::for_body(&Method::Put, &Body::from("abc")), RequestFraming::Length(3));
        assert_eq!(
            RequestFraming::for_body(&Method::Post, &Body::from_reader(Cursor::new(vec![1, 2]))),
            RequestFraming::Chunked
        );
    }

    #[test]
    fn chunked_body_is_terminated() {
        let body = Body::from_reader(Cursor::new(b"hello world".to_vec()));
        let mut out = Vec::new();
        write_body(&mut out, body.source().unwrap()).unwrap();
        assert_eq!(out, b"B\r\nhello world\r\n0\r\n\r\n");
    }

    #[test]
    fn short_sized_reader_is_an_error() {
        let body = Body::sized_reader(Cursor::new(b"abc".to_vec()), 5);
        let mut out = Vec::new();
        let err = write_body(&mut out, body.source().unwrap()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn parses_head_and_reports_length() {
        let raw = b"HTTP/1.1 404 Not Found\r\nContent-Length: 3\r\nX-A: 1\r\nx-a: 2\r\n\r\nabc";
        let (head, len) = parse_response_head(raw).unwrap().unwrap();
        assert_eq!(head.status, 404);
        assert_eq!(head.reason, "Not Found");
        assert_eq!(head.headers.get_all("X-A"), ["1", "2"]);
        assert_eq!(&raw[len..], b"abc");
    }

    #[test]
    fn partial_head_needs_more() {
        assert!(parse_response_head(b"HTTP/1.1 200 OK\r\nContent-").unwrap().is_none());
    }

    #[test]
    fn rejects_out_of_range_status() {
        let err = parse_response_head(b"HTTP/1.1 600 Nope\r\n\r\n").unwrap_err();
        assert!(matches!(err, FetchError::Protocol(_)));
    }

    #[test]
    fn keep_alive_rules() {
        assert!(head("HTTP/1.1 200 OK\r\n\r\n").keep_alive());
        assert!(!head("HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n").keep_alive());
        assert!(!head("HTTP/1.0 200 OK\r\n\r\n").keep_alive());
        assert!(head("HTTP/1.0 200 OK\r\nConnection: Keep-Alive\r\n\r\n").keep_alive());
    }

    #[test]
    fn framing_rules() {
        let ok = head("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n");
        assert_eq!(response_framing(&Method::Get, &ok).unwrap(), ResponseFraming::Length(5));
        assert_eq!(response_framing(&Method::Head, &ok).unwrap(), ResponseFraming::Empty);

        let no_content = head("HTTP/1.1 204 No Content\r\nContent-Length: 5\r\n\r\n");
        assert_eq!(response_framing(&Method::Get, &no_content).unwrap(), ResponseFraming::Empty);

        let chunked = head("HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, chunked\r\nContent-Length: 5\r\n\r\n");
        assert_eq!(response_framing(&Method::Get, &chunked).unwrap(), ResponseFraming::Chunked);

        let open = head("HTTP/1.1 200 OK\r\n\r\n");
        assert_eq!(response_framing(&Method::Get, &open).unwrap(), ResponseFraming::UntilClose);

        let conflicting = head("HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Length: 6\r\n\r\n");
        assert!(response_framing(&Method::Get, &conflicting).is_err());

        let repeated = head("HTTP/1.1 200 OK\r\nContent-Length: 5, 5\r\n\r\n");
        assert_eq!(response_framing(&Method::Get, &repeated).unwrap(), ResponseFraming::Length(5));
    }
}
