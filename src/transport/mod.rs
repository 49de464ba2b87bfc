//! # Transport Layer
//!
//! TCP sessions: the per-connection task topology, the listening server, the
//! reconnecting client and the session registry.
//!
//! ## Per-connection topology (server)
//! ```text
//!   socket ──► receive ──► mailbox ──► dispatch ──► ConnectionObserver
//!                                        ▲   │
//!        Connection::post ──► inbound ───┘   └─ tick timer
//!   socket ◄── send ◄── outbound ◄── Connection::send
//! ```
//! All three tasks share one [`Link`]. Whichever task stops first closes it,
//! and the other two follow at their next suspension point.

pub mod client;
pub mod connection;
pub mod link;
pub mod registry;
pub mod server;
mod session;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use tokio::net::lookup_host;

use crate::error::{NetworkError, Result};

pub use client::{Client, ClientSession, ClientState};
pub use connection::Connection;
pub use link::Link;
pub use registry::SessionRegistry;
pub use server::{BoundServer, Server};

/// Address family a server binds or a client dials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    /// Either family
    Tcp,
    /// IPv4 only
    Tcp4,
    /// IPv6 only
    Tcp6,
}

impl NetworkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkKind::Tcp => "tcp",
            NetworkKind::Tcp4 => "tcp4",
            NetworkKind::Tcp6 => "tcp6",
        }
    }

    /// Whether `addr` belongs to this family
    pub fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            NetworkKind::Tcp => true,
            NetworkKind::Tcp4 => addr.is_ipv4(),
            NetworkKind::Tcp6 => addr.is_ipv6(),
        }
    }

    /// Expand a bare `":port"` into the unspecified address of this family
    pub fn normalize(self, address: &str) -> String {
        match address.strip_prefix(':') {
            Some(port) if self == NetworkKind::Tcp6 => format!("[::]:{port}"),
            Some(port) => format!("0.0.0.0:{port}"),
            None => address.to_string(),
        }
    }

    /// Resolve `address` to the first socket address of this family
    pub async fn resolve(self, address: &str) -> Result<SocketAddr> {
        let target = self.normalize(address);
        let found = lookup_host(target.as_str())
            .await?
            .find(|addr| self.accepts(addr));
        found.ok_or_else(|| {
            NetworkError::ConfigError(format!("No {self} address found for '{address}'"))
        })
    }
}

impl FromStr for NetworkKind {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(NetworkKind::Tcp),
            "tcp4" => Ok(NetworkKind::Tcp4),
            "tcp6" => Ok(NetworkKind::Tcp6),
            other => Err(NetworkError::UnsupportedNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_network_kind() {
        assert_eq!("tcp4".parse::<NetworkKind>().unwrap(), NetworkKind::Tcp4);
        assert!(matches!(
            "udp".parse::<NetworkKind>(),
            Err(NetworkError::UnsupportedNetwork(_))
        ));
    }

    #[test]
    fn test_normalize_bare_port() {
        assert_eq!(NetworkKind::Tcp4.normalize(":9999"), "0.0.0.0:9999");
        assert_eq!(NetworkKind::Tcp6.normalize(":9999"), "[::]:9999");
        assert_eq!(NetworkKind::Tcp.normalize("10.1.2.3:80"), "10.1.2.3:80");
    }

    #[tokio::test]
    async fn test_resolve_filters_family() {
        let v4 = NetworkKind::Tcp4.resolve("127.0.0.1:80").await.unwrap();
        assert!(v4.is_ipv4());
        assert!(NetworkKind::Tcp6.resolve("127.0.0.1:80").await.is_err());

        let any = NetworkKind::Tcp4.resolve(":0").await.unwrap();
        assert!(any.ip().is_unspecified());
        assert_eq!(any.port(), 0);
    }
}
