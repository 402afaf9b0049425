//! Daemon control protocol - protobuf messages for DHT operations
//!
//! Field numbers and enum values follow the daemon's `pb` schema; message
//! kinds and fields this client never uses are left out and skipped on
//! decode.

use libp2p::PeerId;
use prost::{Enumeration, Message};

use super::content::ContentId;
use crate::ClientError;

/// Control request kinds understood by the daemon
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum RequestType {
    Identify = 0,
    Connect = 1,
    StreamOpen = 2,
    StreamHandler = 3,
    Dht = 4,
    ListPeers = 5,
    ConnManager = 6,
    Disconnect = 7,
    Pubsub = 8,
}

/// Outbound control request
#[derive(Clone, PartialEq, Message)]
pub struct Request {
    #[prost(enumeration = "RequestType", required, tag = "1")]
    pub kind: i32,

    /// DHT query or update
    #[prost(message, optional, tag = "5")]
    pub dht: Option<DhtRequest>,
}

impl From<DhtRequest> for Request {
    fn from(request: DhtRequest) -> Self {
        Request {
            kind: RequestType::Dht.into(),
            dht: Some(request),
        }
    }
}

/// DHT request kinds understood by the daemon
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum DhtRequestType {
    FindPeer = 0,
    FindPeersConnectedToPeer = 1,
    FindProviders = 2,
    GetClosestPeers = 3,
    GetPublicKey = 4,
    GetValue = 5,
    SearchValue = 6,
    PutValue = 7,
    Provide = 8,
}

/// DHT request payload
#[derive(Clone, PartialEq, Message)]
pub struct DhtRequest {
    /// Query kind
    #[prost(enumeration = "DhtRequestType", required, tag = "1")]
    pub kind: i32,

    /// Raw peer id bytes (peer queries)
    #[prost(bytes = "vec", optional, tag = "2")]
    pub peer: Option<Vec<u8>>,

    /// Raw content id bytes (provider queries)
    #[prost(bytes = "vec", optional, tag = "3")]
    pub cid: Option<Vec<u8>>,

    /// Record key (value and closest-peer queries)
    #[prost(bytes = "vec", optional, tag = "4")]
    pub key: Option<Vec<u8>>,

    /// Record value (put)
    #[prost(bytes = "vec", optional, tag = "5")]
    pub value: Option<Vec<u8>>,
}

impl DhtRequest {
    fn new(kind: DhtRequestType) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Look up the addresses of a peer
    pub fn find_peer(peer: &PeerId) -> Self {
        Self {
            peer: Some(peer.to_bytes()),
            ..Self::new(DhtRequestType::FindPeer)
        }
    }

    /// Look up peers holding a connection to `peer`
    pub fn find_peers_connected_to_peer(peer: &PeerId) -> Self {
        Self {
            peer: Some(peer.to_bytes()),
            ..Self::new(DhtRequestType::FindPeersConnectedToPeer)
        }
    }

    /// Look up providers of a piece of content
    pub fn find_providers(cid: &ContentId) -> Self {
        Self {
            cid: Some(cid.as_bytes().to_vec()),
            ..Self::new(DhtRequestType::FindProviders)
        }
    }

    pub fn get_closest_peers(key: &[u8]) -> Self {
        Self {
            key: Some(key.to_vec()),
            ..Self::new(DhtRequestType::GetClosestPeers)
        }
    }

    pub fn get_value(key: &[u8]) -> Self {
        Self {
            key: Some(key.to_vec()),
            ..Self::new(DhtRequestType::GetValue)
        }
    }

    pub fn put_value(key: &[u8], value: &[u8]) -> Self {
        Self {
            key: Some(key.to_vec()),
            value: Some(value.to_vec()),
            ..Self::new(DhtRequestType::PutValue)
        }
    }

    /// Announce the local node as a provider of `cid`
    pub fn provide(cid: &ContentId) -> Self {
        Self {
            cid: Some(cid.as_bytes().to_vec()),
            ..Self::new(DhtRequestType::Provide)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum ResponseType {
    Ok = 0,
    Error = 1,
}

/// Failure reported by the daemon
#[derive(Clone, PartialEq, Message)]
pub struct ErrorResponse {
    #[prost(string, required, tag = "1")]
    pub msg: String,
}

/// Inbound control response
#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(enumeration = "ResponseType", required, tag = "1")]
    pub kind: i32,

    #[prost(message, optional, tag = "2")]
    pub error: Option<ErrorResponse>,

    /// DHT payload, when the request has one
    #[prost(message, optional, tag = "5")]
    pub dht: Option<DhtResponse>,
}

impl Response {
    pub fn ok(dht: DhtResponse) -> Self {
        Self {
            dht: Some(dht),
            ..Self::empty()
        }
    }

    /// Status-only success
    pub fn empty() -> Self {
        Self {
            kind: ResponseType::Ok.into(),
            error: None,
            dht: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            kind: ResponseType::Error.into(),
            error: Some(ErrorResponse { msg: msg.into() }),
            dht: None,
        }
    }

    /// Check the status and hand out the DHT payload.
    ///
    /// The payload is never looked at unless the daemon reported success.
    pub fn into_dht(self) -> Result<Option<DhtResponse>, ClientError> {
        match ResponseType::try_from(self.kind) {
            Ok(ResponseType::Ok) => Ok(self.dht),
            _ => Err(ClientError::Daemon(
                self.error.map(|e| e.msg).unwrap_or_default(),
            )),
        }
    }
}

/// Position of a frame within a streamed DHT response
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum DhtResponseType {
    Begin = 0,
    Value = 1,
    End = 2,
}

/// DHT payload of a response, or one frame of a DHT stream
#[derive(Clone, PartialEq, Message)]
pub struct DhtResponse {
    #[prost(enumeration = "DhtResponseType", required, tag = "1")]
    pub kind: i32,

    /// Peer record (peer and provider queries)
    #[prost(message, optional, tag = "2")]
    pub peer: Option<PeerRecord>,

    /// Raw value (value queries, closest-peer ids)
    #[prost(bytes = "vec", optional, tag = "3")]
    pub value: Option<Vec<u8>>,
}

impl DhtResponse {
    fn marker(kind: DhtResponseType) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn begin() -> Self {
        Self::marker(DhtResponseType::Begin)
    }

    pub fn end() -> Self {
        Self::marker(DhtResponseType::End)
    }

    /// Data entry carrying a peer record
    pub fn peer_entry(record: PeerRecord) -> Self {
        Self {
            peer: Some(record),
            ..Self::marker(DhtResponseType::Value)
        }
    }

    /// Data entry carrying raw bytes
    pub fn value_entry(value: Vec<u8>) -> Self {
        Self {
            value: Some(value),
            ..Self::marker(DhtResponseType::Value)
        }
    }
}

/// Peer as sent by the daemon: undecoded id and address bytes
#[derive(Clone, PartialEq, Message)]
pub struct PeerRecord {
    #[prost(bytes = "vec", required, tag = "1")]
    pub id: Vec<u8>,

    #[prost(bytes = "vec", repeated, tag = "2")]
    pub addrs: Vec<Vec<u8>>,
}
