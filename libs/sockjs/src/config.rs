//! Per-endpoint configuration.

use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(5);

/// Where the iframe page loads the SockJS client from.
pub const SOCKJS_CDN: &str = "https://cdn.jsdelivr.net/npm/sockjs-client@1/dist/sockjs.js";

/// Configuration for one SockJS endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Endpoint name, used to tell endpoints apart in log lines.
    pub name: String,
    /// URL prefix the endpoint is mounted under. A trailing slash is ignored.
    pub prefix: String,
    pub heartbeat_interval: Duration,
    pub session_timeout: Duration,
    pub gc_interval: Duration,
    /// Whether the `/info` payload tells clients to send the session cookie.
    pub cookie_needed: bool,
    /// CDN URL of the SockJS client, embedded in the iframe page.
    pub sockjs_cdn: String,
    /// Transport ids that answer 404 even though the server implements them.
    pub disabled_transports: HashSet<String>,
    /// Log the content of every inbound and outbound message.
    pub debug: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: "sockjs".to_string(),
            prefix: "/sockjs".to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            gc_interval: DEFAULT_GC_INTERVAL,
            cookie_needed: true,
            sockjs_cdn: SOCKJS_CDN.to_string(),
            disabled_transports: HashSet::new(),
            debug: false,
        }
    }
}
