//! # Endpoints
//!
//! `(ip, port)` pairs identifying a remote publisher.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A remote publisher address a subscriber connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Remote IP address.
    pub ip: IpAddr,
    /// Remote TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint from an already-parsed address.
    #[must_use]
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Parse the IP from its string form.
    ///
    /// # Errors
    ///
    /// Returns the address parse error for malformed IP strings.
    pub fn parse(ip: &str, port: u16) -> Result<Self, std::net::AddrParseError> {
        Ok(Self {
            ip: IpAddr::from_str(ip)?,
            port,
        })
    }

    /// The socket address form used by the transport layer.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self {
            ip: addr.ip(),
            port: addr.port(),
        }
    }
}
