//! Opening control connections to the daemon

use async_trait::async_trait;
use libp2p::{multiaddr::Protocol, Multiaddr};
use std::io;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};

use super::ControlError;

/// A duplex byte stream usable as a control connection
pub trait ControlStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> ControlStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Source of fresh control connections.
///
/// Every call opens its own connection through [`Dialer::dial`]; nothing is
/// pooled or reused.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Stream: ControlStream;

    /// Open a new connection to the daemon
    async fn dial(&self) -> io::Result<Self::Stream>;
}

/// Where a control multiaddr points to
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    #[cfg(unix)]
    Unix(PathBuf),
    Tcp(SocketAddr),
}

/// Dials the daemon's control endpoint given as a multiaddr.
///
/// Supported forms are `/unix/<path>`, `/ip4/<ip>/tcp/<port>` and
/// `/ip6/<ip>/tcp/<port>`.
#[derive(Debug, Clone)]
pub struct MultiaddrDialer {
    addr: Multiaddr,
    target: Target,
}

impl MultiaddrDialer {
    /// Create a dialer, rejecting addresses it cannot dial
    pub fn new(addr: Multiaddr) -> Result<Self, ControlError> {
        let target = resolve(&addr)?;
        Ok(Self { addr, target })
    }

    /// The control address this dialer connects to
    pub fn addr(&self) -> &Multiaddr {
        &self.addr
    }
}

#[async_trait]
impl Dialer for MultiaddrDialer {
    type Stream = Box<dyn ControlStream>;

    async fn dial(&self) -> io::Result<Self::Stream> {
        let stream: Box<dyn ControlStream> = match &self.target {
            #[cfg(unix)]
            Target::Unix(path) => Box::new(tokio::net::UnixStream::connect(path).await?),
            Target::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr).await?;
                stream.set_nodelay(true)?;
                Box::new(stream)
            }
        };

        tracing::trace!("Opened control connection to {}", self.addr);
        Ok(stream)
    }
}

fn resolve(addr: &Multiaddr) -> Result<Target, ControlError> {
    let mut iter = addr.iter();
    match (iter.next(), iter.next(), iter.next()) {
        (Some(Protocol::Ip4(ip)), Some(Protocol::Tcp(port)), None) => {
            Ok(Target::Tcp(SocketAddr::new(ip.into(), port)))
        }
        (Some(Protocol::Ip6(ip)), Some(Protocol::Tcp(port)), None) => {
            Ok(Target::Tcp(SocketAddr::new(ip.into(), port)))
        }
        #[cfg(unix)]
        (Some(Protocol::Unix(path)), None, None) => {
            // Unix multiaddrs carry absolute paths; some encoders drop the leading slash
            let path = if path.starts_with('/') {
                PathBuf::from(&*path)
            } else {
                PathBuf::from(format!("/{}", path))
            };
            Ok(Target::Unix(path))
        }
        _ => Err(ControlError::UnsupportedAddress(addr.clone())),
    }
}
