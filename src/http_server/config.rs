//! Dev server listener settings

use std::net::IpAddr;

/// Request bodies larger than this get a 413
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Where the dev server listens and what it accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit: usize,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 8888)
    }
}

impl HttpServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// `host:port`, with IPv6 literals bracketed
    pub fn socket_addr(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{}]:{}", ip, self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }

    /// Whether only this machine can reach the server
    pub fn is_loopback(&self) -> bool {
        self.host.eq_ignore_ascii_case("localhost")
            || self
                .host
                .parse::<IpAddr>()
                .map(|ip| ip.is_loopback())
                .unwrap_or(false)
    }
}
