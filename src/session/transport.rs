//! Transport endpoint of a backend GDB server.

use crate::error::Error;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const UNIX_PREFIX: &str = "unix:";

/// Address of a GDB server, `host:port` or `unix:<path>`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ServerAddress {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerAddress::Tcp { host, port } => write!(f, "{host}:{port}"),
            ServerAddress::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}

impl FromStr for ServerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(Error::InvalidAddress(s.to_string()));
            }
            return Ok(ServerAddress::Unix(PathBuf::from(path)));
        }
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidAddress(s.to_string()))?;
        let port = port
            .parse()
            .map_err(|_| Error::InvalidAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(Error::InvalidAddress(s.to_string()));
        }
        Ok(ServerAddress::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

impl Serialize for ServerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl ServerAddress {
    /// True if server accepts connections. Connection is closed right away.
    pub fn is_reachable(&self, timeout: Duration) -> bool {
        match self {
            ServerAddress::Tcp { host, port } => {
                let Ok(addrs) = (host.as_str(), *port).to_socket_addrs() else {
                    return false;
                };
                addrs
                    .into_iter()
                    .any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
            }
            ServerAddress::Unix(path) => UnixStream::connect(path).is_ok(),
        }
    }
}

/// Ask OS for a free TCP port on the host.
pub fn free_port(host: &str) -> Result<u16, Error> {
    let listener = TcpListener::bind((host, 0))?;
    Ok(listener.local_addr()?.port())
}
