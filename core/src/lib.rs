//! A small, blocking, Fetch-style HTTP/1.1 client.
//!
//! # Overview
//! ```no_run
//! use fetch_core::{fetch, FetchOptions, Method};
//!
//! let mut res = fetch(
//!     "https://example.com/api/items",
//!     FetchOptions::new()
//!         .method(Method::Post)
//!         .content_type("application/json")
//!         .body(r#"{"name":"widget"}"#),
//! )?;
//! if res.ok() {
//!     println!("{}", res.text()?);
//! }
//! # Ok::<(), fetch_core::FetchError>(())
//! ```
//!
//! # Design
//! - `Request` values are immutable and validated up front by
//!   `RequestBuilder::build`, so nothing touches the network until the
//!   request is known to be well-formed.
//! - `Client` owns a connection pool keyed by (scheme, host, port). The free
//!   functions `fetch` and `get` share one lazily created default client.
//! - Non-2xx statuses are ordinary responses. Errors are reserved for things
//!   that prevented a response from being received or read.
//! - A response body is consumed at most once, via `text`, `bytes`, `json`,
//!   or `body_stream`.

pub mod charset;
pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod http;
pub mod options;
pub mod request;
pub mod response;
pub mod transport;

use lazy_static::lazy_static;

pub use client::Client;
pub use config::{Config, PoolConfig};
pub use error::FetchError;
pub use headers::Headers;
pub use http::{Method, Scheme};
pub use options::FetchOptions;
pub use request::{Body, Request, RequestBuilder};
pub use response::Response;
pub use transport::body::BodyStream;
pub use transport::pool::PoolStats;

lazy_static! {
    static ref DEFAULT_CLIENT: Client = Client::new();
}

/// The process-wide client behind `fetch` and `get`.
pub fn default_client() -> &'static Client {
    &DEFAULT_CLIENT
}

/// Send a request described by `options` using the default client.
pub fn fetch(url: &str, options: FetchOptions) -> Result<Response, FetchError> {
    default_client().fetch(url, options)
}

/// `GET url` using the default client.
pub fn get(url: &str) -> Result<Response, FetchError> {
    default_client().get(url)
}
