// Endpoint resolution and transport-neutral socket wrappers.
//
// The relay core never looks at addresses: it works on `Listener` and
// `Stream`, which hide whether a connection is TCP or Unix-domain. Only
// endpoint construction differs between the two families — everything past
// `bind`/`connect` is identical byte plumbing.
//
// Host/port resolution goes through `ToSocketAddrs` (getaddrinfo under the
// hood) and takes the first usable address. Resolution and bind failures are
// fatal to the server; they are reported as `RelayError` so the binary can
// exit with a diagnostic.

use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::error::RelayError;

/// A listen or connect target: a host/port pair or a local-socket path.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Resolve a host/port pair to the first usable socket address.
pub fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no usable address for {host}:{port}"),
        )
    })
}

/// The address a listener actually bound. For TCP binds with port 0 this
/// carries the OS-assigned port (used heavily by tests).
#[derive(Debug, Clone)]
pub enum BoundAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl BoundAddr {
    /// The endpoint a client should connect to for this bound address.
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Tcp(addr) => Endpoint::Tcp {
                host: addr.ip().to_string(),
                port: addr.port(),
            },
            Self::Unix(path) => Endpoint::Unix { path: path.clone() },
        }
    }
}

impl fmt::Display for BoundAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{addr}"),
            Self::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A bound, listening endpoint of either transport family.
pub enum Listener {
    Tcp(TcpListener),
    Unix { inner: UnixListener, path: PathBuf },
}

impl Listener {
    /// Resolve and bind the given endpoint.
    pub fn bind(endpoint: &Endpoint) -> Result<Self, RelayError> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let addr = resolve(host, *port).map_err(|source| RelayError::Resolve {
                    host: host.clone(),
                    port: *port,
                    source,
                })?;
                let inner = TcpListener::bind(addr).map_err(|source| RelayError::Bind {
                    target: endpoint.to_string(),
                    source,
                })?;
                Ok(Self::Tcp(inner))
            }
            Endpoint::Unix { path } => {
                let inner = UnixListener::bind(path).map_err(|source| RelayError::Bind {
                    target: endpoint.to_string(),
                    source,
                })?;
                Ok(Self::Unix {
                    inner,
                    path: path.clone(),
                })
            }
        }
    }

    /// Accept one pending connection.
    pub fn accept(&self) -> io::Result<Stream> {
        match self {
            Self::Tcp(inner) => {
                let (stream, _addr) = inner.accept()?;
                Ok(Stream::Tcp(stream))
            }
            Self::Unix { inner, .. } => {
                let (stream, _addr) = inner.accept()?;
                Ok(Stream::Unix(stream))
            }
        }
    }

    /// The address this listener actually bound.
    pub fn bound(&self) -> io::Result<BoundAddr> {
        match self {
            Self::Tcp(inner) => Ok(BoundAddr::Tcp(inner.local_addr()?)),
            Self::Unix { path, .. } => Ok(BoundAddr::Unix(path.clone())),
        }
    }

    /// Close the listener; a Unix-domain listener also removes its bind
    /// path. Called on clean shutdown only — a fatal exit leaves the path
    /// behind for inspection.
    pub fn cleanup(self) {
        if let Self::Unix { inner, path } = self {
            drop(inner);
            if let Err(err) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %err, "failed to remove bind path");
            }
        }
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Tcp(inner) => inner.as_raw_fd(),
            Self::Unix { inner, .. } => inner.as_raw_fd(),
        }
    }
}

/// A connected stream of either transport family. Dropping it closes the
/// descriptor.
pub enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    /// Resolve and connect to the given endpoint.
    pub fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let addr = resolve(host, *port)?;
                Ok(Self::Tcp(TcpStream::connect(addr)?))
            }
            Endpoint::Unix { path } => Ok(Self::Unix(UnixStream::connect(path)?)),
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(inner) => inner.set_read_timeout(timeout),
            Self::Unix(inner) => inner.set_read_timeout(timeout),
        }
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match self {
            Self::Tcp(inner) => inner.shutdown(how),
            Self::Unix(inner) => inner.shutdown(how),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(inner) => inner.read(buf),
            Self::Unix(inner) => inner.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(inner) => inner.write(buf),
            Self::Unix(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(inner) => inner.flush(),
            Self::Unix(inner) => inner.flush(),
        }
    }
}

impl AsRawFd for Stream {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Tcp(inner) => inner.as_raw_fd(),
            Self::Unix(inner) => inner.as_raw_fd(),
        }
    }
}
