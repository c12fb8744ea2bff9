//! Client-wide configuration.

use std::time::Duration;

use crate::headers::Headers;
use crate::request::DEFAULT_MAX_REDIRECTS;

/// Default connect and read timeouts.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings shared by every request a `Client` sends.
///
/// Per-request values (`FetchOptions`, `RequestBuilder`) take precedence over
/// `follow_redirects`, `max_redirects`, and `strict_methods`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound for establishing a TCP connection.
    pub connect_timeout: Duration,
    /// Upper bound for any single socket read or write, body reads included.
    pub read_timeout: Duration,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    /// Reject methods outside the standard set when building requests.
    pub strict_methods: bool,
    /// Sent with every request that does not set the same header itself.
    pub default_headers: Headers,
    pub pool: PoolConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut default_headers = Headers::new();
        default_headers.set(
            "User-Agent",
            concat!("fetch-core/", env!("CARGO_PKG_VERSION")),
        );
        default_headers.set("Accept", "*/*");

        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            strict_methods: true,
            default_headers,
            pool: PoolConfig::default(),
        }
    }
}

/// Idle connection pool settings.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Idle connections kept per (scheme, host, port). Zero disables pooling.
    pub max_idle_per_host: usize,
    /// Idle connections older than this are closed instead of reused.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 6,
            idle_timeout: Duration::from_secs(90),
        }
    }
}
