//! Stub HTTP server for exercising the fetch client end to end.
//!
//! Every route returns something the client has to handle specially:
//! redirects, slow responses, chunked bodies, non-UTF-8 text, and repeated
//! headers. `/echo` reflects the request back as JSON so tests can check
//! exactly what went over the wire.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, RawQuery},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// What `/echo` saw.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    /// Lowercase header name to every value received, in order.
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,
    pub query: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    pub id: u32,
    pub name: String,
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
pub struct RedirectTo {
    pub location: String,
    #[serde(default = "default_redirect_status")]
    pub status: u16,
}

fn default_redirect_status() -> u16 {
    302
}

#[derive(Deserialize)]
pub struct Slow {
    #[serde(default)]
    pub ms: u64,
}

pub fn app() -> Router {
    Router::new()
        .route("/ok", get(ok))
        .route("/echo", any(echo))
        .route("/status/{code}", any(status))
        .route("/redirect/{n}", any(redirect_chain))
        .route("/redirect-to", any(redirect_to))
        .route("/slow", get(slow))
        .route("/chunked", get(chunked))
        .route("/latin1", get(latin1))
        .route("/multi-header", get(multi_header))
        .route("/json", get(json))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    log::info!("mock server listening on {:?}", listener.local_addr().ok());
    axum::serve(listener, app()).await
}

async fn ok() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], "hi")
}

async fn echo(method: Method, headers: HeaderMap, RawQuery(query): RawQuery, body: Bytes) -> Json<Echo> {
    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &headers {
        seen.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    Json(Echo {
        method: method.to_string(),
        headers: seen,
        body: String::from_utf8_lossy(&body).into_owned(),
        query,
    })
}

async fn status(Path(code): Path<u16>) -> Result<Response, StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, format!("status {code}")).into_response())
}

/// `/redirect/{n}` answers with `n` more redirects before a 200.
async fn redirect_chain(Path(n): Path<u32>) -> Response {
    if n == 0 {
        return (StatusCode::OK, "done").into_response();
    }
    found(StatusCode::FOUND, &format!("/redirect/{}", n - 1))
}

async fn redirect_to(Query(params): Query<RedirectTo>) -> Result<Response, StatusCode> {
    let status = StatusCode::from_u16(params.status).map_err(|_| StatusCode::BAD_REQUEST)?;
    if !status.is_redirection() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(found(status, &params.location))
}

fn found(status: StatusCode, location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => (status, [(header::LOCATION, location)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn slow(Query(params): Query<Slow>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(params.ms)).await;
    "slow"
}

async fn chunked() -> Response {
    let parts: Vec<Result<Bytes, std::io::Error>> = ["alpha ", "beta ", "gamma"]
        .into_iter()
        .map(|part| Ok(Bytes::from_static(part.as_bytes())))
        .collect();
    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from_stream(futures::stream::iter(parts)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn latin1() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=ISO-8859-1")],
        Bytes::from_static(b"caf\xE9"),
    )
}

async fn multi_header() -> Response {
    let mut response = "multi".into_response();
    let headers = response.headers_mut();
    headers.append("x-multi", HeaderValue::from_static("one"));
    headers.append("x-multi", HeaderValue::from_static("two"));
    response
}

async fn json() -> Json<Vec<Item>> {
    Json(vec![
        Item {
            id: 1,
            name: "widget".to_string(),
            tags: vec!["blue".to_string()],
        },
        Item {
            id: 2,
            name: "gadget".to_string(),
            tags: Vec::new(),
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_serializes_to_json() {
        let echo = Echo {
            method: "POST".to_string(),
            headers: BTreeMap::from([("x-a".to_string(), vec!["1".to_string(), "2".to_string()])]),
            body: "payload".to_string(),
            query: None,
        };
        let json = serde_json::to_value(&echo).unwrap();
        assert_eq!(json["method"], "POST");
        assert_eq!(json["headers"]["x-a"][1], "2");
        assert!(json["query"].is_null());
    }

    #[test]
    fn redirect_status_defaults_to_found() {
        let params: RedirectTo = serde_json::from_str(r#"{"location":"/ok"}"#).unwrap();
        assert_eq!(params.status, 302);
    }

    #[test]
    fn slow_defaults_to_no_delay() {
        let params: Slow = serde_json::from_str("{}").unwrap();
        assert_eq!(params.ms, 0);
    }
}
