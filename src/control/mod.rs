//! Control connection to the daemon
//!
//! One [`Connection`] is opened per call and owned by that call until it is
//! closed. Messages travel as varint-delimited protobuf frames (see
//! [`framing`]).

mod dialer;
pub mod framing;

pub use dialer::{ControlStream, Dialer, MultiaddrDialer};
pub use framing::MessageCodec;

use futures::{SinkExt, StreamExt};
use libp2p::Multiaddr;
use prost::Message;
use std::time::Duration;
use thiserror::Error;
use tokio_util::codec::Framed;

use crate::dht::protocol::Request;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid length prefix: {0}")]
    Header(unsigned_varint::decode::Error),

    #[error("Frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Malformed message: {0}")]
    Malformed(#[from] prost::DecodeError),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] prost::EncodeError),
}

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Cannot reach daemon: {0}")]
    ConnectionFailed(#[source] std::io::Error),

    #[error("Unsupported control address: {0}")]
    UnsupportedAddress(Multiaddr),

    #[error("Failed to write request: {0}")]
    Write(#[source] CodecError),

    #[error("Failed to read response: {0}")]
    Read(#[source] CodecError),

    #[error("Daemon closed the connection")]
    Closed,

    #[error("Timeout")]
    Timeout,
}

/// A framed control connection owned by a single call
pub struct Connection<S> {
    framed: Framed<S, MessageCodec>,

    /// Upper bound for a single frame read
    read_timeout: Option<Duration>,
}

impl<S: ControlStream> Connection<S> {
    /// Wrap a freshly dialed stream
    pub fn new(stream: S, max_message_size: usize, read_timeout: Option<Duration>) -> Self {
        Self {
            framed: Framed::new(stream, MessageCodec::new(max_message_size)),
            read_timeout,
        }
    }

    /// Write one message frame
    pub async fn send<M: Message>(&mut self, message: M) -> Result<(), ControlError> {
        self.framed.send(message).await.map_err(ControlError::Write)
    }

    /// Read one frame and decode it as `M`
    pub async fn recv<M: Message + Default>(&mut self) -> Result<M, ControlError> {
        let next = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.framed.next())
                .await
                .map_err(|_| ControlError::Timeout)?,
            None => self.framed.next().await,
        };

        let body = match next {
            Some(Ok(body)) => body,
            Some(Err(e)) => return Err(ControlError::Read(e)),
            None => return Err(ControlError::Closed),
        };

        M::decode(body).map_err(|e| ControlError::Read(e.into()))
    }

    /// Flush and shut down the write half, then drop the stream
    pub async fn close(mut self) {
        if let Err(e) = SinkExt::<Request>::close(&mut self.framed).await {
            tracing::debug!("Error while closing control connection: {}", e);
        }
    }
}
