//! Verify the wire codec against JSON test vectors stored in `test-vectors/`.
//!
//! Request vectors pin the exact bytes of an encoded head. Response vectors
//! describe a raw head and everything derived from it: status, reason,
//! headers in order, body framing, and keep-alive.

use fetch_core::transport::codec::{
    encode_request_head, parse_response_head, response_framing, RequestFraming, ResponseFraming,
};
use fetch_core::{FetchError, Headers, Method};
use serde_json::Value;
use url::Url;

fn parse_method(s: &str) -> Method {
    s.parse().unwrap_or_else(|e| panic!("bad method in vector: {e}"))
}

fn parse_headers(value: &Value) -> Headers {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|pair| {
            let pair = pair.as_array().unwrap();
            (pair[0].as_str().unwrap(), pair[1].as_str().unwrap())
        })
        .collect()
}

fn request_framing(value: &Value) -> RequestFraming {
    match value {
        Value::Number(n) => RequestFraming::Length(n.as_u64().unwrap()),
        Value::String(s) if s == "none" => RequestFraming::None,
        Value::String(s) if s == "chunked" => RequestFraming::Chunked,
        other => panic!("unknown request framing: {other}"),
    }
}

fn response_framing_from(value: &Value) -> ResponseFraming {
    match value {
        Value::Number(n) => ResponseFraming::Length(n.as_u64().unwrap()),
        Value::String(s) if s == "empty" => ResponseFraming::Empty,
        Value::String(s) if s == "chunked" => ResponseFraming::Chunked,
        Value::String(s) if s == "until_close" => ResponseFraming::UntilClose,
        other => panic!("unknown response framing: {other}"),
    }
}

fn assert_protocol_error(err: FetchError, name: &str) {
    assert!(matches!(err, FetchError::Protocol(_)), "{name}: expected Protocol, got {err:?}");
}

// ---------------------------------------------------------------------------
// Request heads
// ---------------------------------------------------------------------------

#[test]
fn request_head_vectors() {
    let raw = include_str!("../../test-vectors/request_heads.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let method = parse_method(case["method"].as_str().unwrap());
        let url = Url::parse(case["url"].as_str().unwrap()).unwrap();
        let headers = parse_headers(&case["headers"]);
        let framing = request_framing(&case["framing"]);

        let head = encode_request_head(&method, &url, &headers, framing);
        assert_eq!(
            String::from_utf8(head).unwrap(),
            case["expected"].as_str().unwrap(),
            "{name}: encoded head"
        );
    }
}

// ---------------------------------------------------------------------------
// Response heads
// ---------------------------------------------------------------------------

#[test]
fn response_head_vectors() {
    let raw = include_str!("../../test-vectors/response_heads.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let method = parse_method(case["request_method"].as_str().unwrap());
        let bytes = case["raw"].as_str().unwrap().as_bytes();

        let parsed = parse_response_head(bytes);
        if case.get("error").is_some() {
            assert_protocol_error(parsed.unwrap_err(), name);
            continue;
        }
        let parsed = parsed.unwrap();
        if case.get("incomplete").is_some() {
            assert!(parsed.is_none(), "{name}: expected an incomplete head");
            continue;
        }

        let (head, len) = parsed.unwrap_or_else(|| panic!("{name}: head should be complete"));
        if case.get("framing_error").is_some() {
            assert_protocol_error(response_framing(&method, &head).unwrap_err(), name);
            continue;
        }

        assert_eq!(u64::from(head.status), case["status"].as_u64().unwrap(), "{name}: status");
        assert_eq!(head.reason, case["reason"].as_str().unwrap(), "{name}: reason");
        assert_eq!(head.headers, parse_headers(&case["headers"]), "{name}: headers");
        assert_eq!(
            response_framing(&method, &head).unwrap(),
            response_framing_from(&case["framing"]),
            "{name}: framing"
        );
        assert_eq!(head.keep_alive(), case["keep_alive"].as_bool().unwrap(), "{name}: keep-alive");
        if let Some(offset) = case.get("body_offset") {
            assert_eq!(len as u64, offset.as_u64().unwrap(), "{name}: body offset");
        }
    }
}
