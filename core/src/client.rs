//! The blocking client: connection pool, redirects, and the fetch entry points.
//!
//! # Design
//! `Client` is a cheap handle: configuration, pool, and connector sit behind
//! `Arc`s, so clones share one pool and can be moved to other threads. A call
//! runs entirely on the caller's thread; the pool lock is the only point of
//! contention and is never held across I/O.
//!
//! Redirects are followed here, one exchange per hop, all under the single
//! deadline derived from the request timeout.

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::error::FetchError;
use crate::http::{Method, Scheme};
use crate::options::FetchOptions;
use crate::request::{Body, Request, RequestBuilder};
use crate::response::Response;
use crate::transport::exchange::{Deadline, Exchange};
use crate::transport::pool::{Pool, PoolStats};
use crate::transport::{Connector, TcpConnector};

/// Headers that are only forwarded when a redirect stays on the same origin.
const CREDENTIAL_HEADERS: [&str; 3] = ["authorization", "cookie", "host"];

/// Headers describing a body that a method downgrade discards.
const BODY_HEADERS: [&str; 5] = [
    "content-type",
    "content-length",
    "content-encoding",
    "content-language",
    "content-location",
];

/// Blocking HTTP/1.1 client with a shared connection pool.
#[derive(Clone)]
pub struct Client {
    config: Arc<Config>,
    pool: Arc<Pool>,
    connector: Arc<dyn Connector>,
}

impl Client {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_connector(config, Arc::new(TcpConnector::new()))
    }

    /// Use a custom connector, e.g. one with private TLS roots.
    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Self {
        Self {
            pool: Arc::new(Pool::new(config.pool)),
            config: Arc::new(config),
            connector,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A request builder seeded with this client's redirect and method policy.
    pub fn request(&self, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(url)
            .strict(self.config.strict_methods)
            .follow_redirects(self.config.follow_redirects)
            .max_redirects(self.config.max_redirects)
    }

    /// Build a request from `url` and `options`, then send it.
    pub fn fetch(&self, url: &str, options: FetchOptions) -> Result<Response, FetchError> {
        let request = options.apply(self.request(url)).build()?;
        self.execute(&request)
    }

    pub fn get(&self, url: &str) -> Result<Response, FetchError> {
        self.fetch(url, FetchOptions::new())
    }

    /// Send a prepared request, following redirects as it allows.
    ///
    /// Any status code, 4xx and 5xx included, comes back as a `Response`.
    pub fn execute(&self, request: &Request) -> Result<Response, FetchError> {
        let deadline = Deadline::new(request.timeout());
        let exchange = Exchange {
            connector: self.connector.as_ref(),
            pool: &self.pool,
            connect_timeout: request.connect_timeout().unwrap_or(self.config.connect_timeout),
            read_timeout: request.read_timeout().unwrap_or(self.config.read_timeout),
        };

        let mut method = request.method().clone();
        let mut url = request.url().clone();
        let mut headers = request.headers().clone();
        headers.fill_missing(&self.config.default_headers);
        let mut body = request.body().clone();
        let mut redirects = 0;

        loop {
            let (head, stream) = exchange.send(&method, &url, &headers, &body, &deadline)?;
            let status = head.status;

            let location = match head.headers.get("location") {
                Some(location) if request.follow_redirects() && is_redirect(status) => location,
                _ => return Ok(Response::new(head, url, redirects > 0, stream)),
            };
            let target = match redirect_target(&url, location) {
                Some(target) => target,
                None => {
                    warn!("not following {status} redirect to unusable location `{location}`");
                    return Ok(Response::new(head, url, redirects > 0, stream));
                }
            };
            if redirects == request.max_redirects() {
                return Err(FetchError::TooManyRedirects {
                    limit: request.max_redirects(),
                });
            }

            let next_method = redirect_method(&method, status);
            let downgraded = next_method != method;
            if !downgraded && body.is_stream() && !body.is_available() {
                warn!("not following {status} redirect to {target}: request body cannot be replayed");
                return Ok(Response::new(head, url, redirects > 0, stream));
            }

            debug!("following {status} redirect: {method} {url} -> {next_method} {target}");
            stream.close();

            if downgraded {
                body = Body::empty();
                for name in BODY_HEADERS {
                    headers.remove(name);
                }
            }
            if url.origin() != target.origin() {
                for name in CREDENTIAL_HEADERS {
                    headers.remove(name);
                }
            }

            method = next_method;
            url = target;
            redirects += 1;
        }
    }

    /// Idle connections currently held by the pool.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

pub(crate) fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Method for the next hop: 303 becomes GET (HEAD stays HEAD), 301 and 302
/// turn POST into GET, everything else is kept.
pub(crate) fn redirect_method(method: &Method, status: u16) -> Method {
    match status {
        303 if *method != Method::Head => Method::Get,
        301 | 302 if *method == Method::Post => Method::Get,
        _ => method.clone(),
    }
}

/// Resolve `Location` against the current URL; only http(s) targets qualify.
fn redirect_target(current: &Url, location: &str) -> Option<Url> {
    let mut target = current.join(location.trim()).ok()?;
    Scheme::from_url(&target)?;
    target.host_str().filter(|host| !host.is_empty())?;
    if target.fragment().is_none() {
        target.set_fragment(current.fragment());
    }
    Some(target)
}
