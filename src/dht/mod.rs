//! DHT queries through the daemon
//!
//! Each operation opens its own control connection. Single-answer
//! operations read one response and close the connection before returning.
//! Streaming operations return a [`ResultStream`] fed by background tasks
//! that own the connection until the stream ends.

mod content;
mod peer;
pub mod protocol;
mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use content::{ContentId, ContentIdError, DAG_PB_CODEC, RAW_CODEC};
pub use peer::{PeerInfo, RecordError};
pub use protocol::{DhtRequest, DhtRequestType, DhtResponse, DhtResponseType, PeerRecord};
pub use stream::ResultStream;

use libp2p::PeerId;
use tokio_util::sync::CancellationToken;

use crate::control::{Connection, ControlStream, Dialer};
use crate::{Client, ClientError, Result};
use protocol::{Request, Response};

/// Stream of peers returned by peer and provider queries
pub type PeerInfoStream = ResultStream<PeerInfo>;

impl<D: Dialer> Client<D> {
    /// Query the daemon for a peer's addresses
    pub async fn find_peer(&self, peer: &PeerId) -> Result<PeerInfo> {
        let dht = self
            .dht_call(DhtRequest::find_peer(peer))
            .await?
            .ok_or_else(|| {
                ClientError::MalformedResponse("dht response was not populated in find peer".into())
            })?;

        Ok(PeerInfo::from_record(dht.peer.as_ref())?)
    }

    /// Query the DHT for peers that have an active connection to `peer`
    pub async fn find_peers_connected_to_peer(
        &self,
        cancel: CancellationToken,
        peer: &PeerId,
    ) -> Result<PeerInfoStream> {
        self.dht_stream(
            cancel,
            DhtRequest::find_peers_connected_to_peer(peer),
            peer_info_entry,
        )
        .await
    }

    /// Query the DHT for peers providing the content identified by `cid`
    pub async fn find_providers(
        &self,
        cancel: CancellationToken,
        cid: &ContentId,
    ) -> Result<PeerInfoStream> {
        self.dht_stream(cancel, DhtRequest::find_providers(cid), peer_info_entry)
            .await
    }

    /// Query the DHT for the peers closest to `key`
    pub async fn get_closest_peers(
        &self,
        cancel: CancellationToken,
        key: &[u8],
    ) -> Result<ResultStream<PeerId>> {
        self.dht_stream(cancel, DhtRequest::get_closest_peers(key), peer_id_entry)
            .await
    }

    /// Fetch the value stored under `key`
    pub async fn get_value(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.dht_call(DhtRequest::get_value(key))
            .await?
            .and_then(|dht| dht.value)
            .ok_or_else(|| {
                ClientError::MalformedResponse("dht response carried no value in get value".into())
            })
    }

    /// Store `value` under `key`
    pub async fn put_value(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.dht_call(DhtRequest::put_value(key, value)).await?;
        Ok(())
    }

    /// Announce this node as a provider of `cid`
    pub async fn provide(&self, cid: &ContentId) -> Result<()> {
        self.dht_call(DhtRequest::provide(cid)).await?;
        Ok(())
    }

    /// Send one request, read one response, close.
    async fn dht_call(&self, request: DhtRequest) -> Result<Option<DhtResponse>> {
        let kind = request.kind();
        let mut conn = self.connect().await?;

        let result = exchange(&mut conn, request).await;
        conn.close().await;

        if let Err(e) = &result {
            tracing::debug!("DHT {:?} failed: {}", kind, e);
        }
        result
    }

    async fn dht_stream<T, F>(
        &self,
        cancel: CancellationToken,
        request: DhtRequest,
        convert: F,
    ) -> Result<ResultStream<T>>
    where
        T: Send + 'static,
        F: Fn(DhtResponse) -> std::result::Result<T, RecordError> + Send + 'static,
    {
        let kind = request.kind();
        let mut conn = self.connect().await?;

        if let Err(e) = conn.send(Request::from(request)).await {
            conn.close().await;
            return Err(e.into());
        }

        let raw = stream::open_response_stream(conn, cancel).await?;
        tracing::debug!("DHT {:?} stream opened", kind);

        Ok(stream::spawn_converter(
            raw,
            self.config().stream_buffer,
            convert,
        ))
    }
}

async fn exchange<S: ControlStream>(
    conn: &mut Connection<S>,
    request: DhtRequest,
) -> Result<Option<DhtResponse>> {
    conn.send(Request::from(request)).await?;
    let response: Response = conn.recv().await?;
    response.into_dht()
}

fn peer_info_entry(entry: DhtResponse) -> std::result::Result<PeerInfo, RecordError> {
    PeerInfo::from_record(entry.peer.as_ref())
}

fn peer_id_entry(entry: DhtResponse) -> std::result::Result<PeerId, RecordError> {
    let bytes = entry.value.ok_or(RecordError::InvalidRecord)?;
    PeerId::from_bytes(&bytes).map_err(|e| RecordError::InvalidIdentity(e.to_string()))
}
