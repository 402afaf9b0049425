//! p2pd client - DHT queries through a co-located libp2p daemon
//!
//! The daemon exposes its DHT over a local control socket. This crate opens
//! one control connection per call, sends a single request frame and reads
//! back either one response or a begin / value... / end stream of responses,
//! which it hands out as a [`ResultStream`].
//!
//! ```no_run
//! use futures::StreamExt;
//! use p2pd_client::{Client, ClientConfig, ContentId};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> p2pd_client::Result<()> {
//! let client = Client::new(ClientConfig::default())?;
//! let cid = ContentId::sha256(b"hello");
//!
//! let mut providers = client.find_providers(CancellationToken::new(), &cid).await?;
//! while let Some(provider) = providers.next().await {
//!     println!("{} at {:?}", provider.id, provider.addrs);
//! }
//! # Ok(())
//! # }
//! ```

pub mod control;
pub mod dht;

pub use control::{ControlError, Dialer, MultiaddrDialer};
pub use dht::{ContentId, PeerInfo, PeerInfoStream, RecordError, ResultStream};

use libp2p::{multiaddr::Protocol, Multiaddr};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use control::Connection;

/// Main error type for daemon client operations
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Control connection error: {0}")]
    Control(#[from] ControlError),

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid peer record: {0}")]
    Record(#[from] RecordError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Default daemon control socket
pub const DEFAULT_CONTROL_PATH: &str = "/tmp/p2pd.sock";

/// Default upper bound for one control message (4 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1 << 22;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Daemon control endpoint
    pub control_addr: Multiaddr,

    /// Largest message accepted from or sent to the daemon (in bytes)
    pub max_message_size: usize,

    /// Values buffered for the consumer of a streaming call
    pub stream_buffer: usize,

    /// Limit for a single frame read; `None` waits as long as the daemon does
    #[serde(default)]
    pub read_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            control_addr: Multiaddr::empty().with(Protocol::Unix(DEFAULT_CONTROL_PATH.into())),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            stream_buffer: 10,
            read_timeout: None,
        }
    }
}

/// Handle for issuing DHT calls to the daemon.
///
/// Cheap to clone; clones share the dialer. Calls never share connections.
pub struct Client<D = MultiaddrDialer> {
    dialer: Arc<D>,
    config: ClientConfig,
}

impl Client<MultiaddrDialer> {
    /// Create a client dialing `config.control_addr`
    pub fn new(config: ClientConfig) -> Result<Self> {
        let dialer = MultiaddrDialer::new(config.control_addr.clone())?;
        Ok(Self::with_dialer(config, dialer))
    }
}

impl<D: Dialer> Client<D> {
    /// Create a client opening connections through a custom dialer
    pub fn with_dialer(config: ClientConfig, dialer: D) -> Self {
        Self {
            dialer: Arc::new(dialer),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Open a fresh control connection
    async fn connect(&self) -> Result<Connection<D::Stream>> {
        let stream = self
            .dialer
            .dial()
            .await
            .map_err(ControlError::ConnectionFailed)?;

        Ok(Connection::new(
            stream,
            self.config.max_message_size,
            self.config.read_timeout,
        ))
    }
}

impl<D> Clone for Client<D> {
    fn clone(&self) -> Self {
        Self {
            dialer: Arc::clone(&self.dialer),
            config: self.config.clone(),
        }
    }
}
