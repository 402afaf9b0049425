//! Peer records returned by DHT queries

use libp2p::{Multiaddr, PeerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::protocol::PeerRecord;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Missing peer record")]
    InvalidRecord,

    #[error("Invalid peer id: {0}")]
    InvalidIdentity(String),

    #[error("Invalid multiaddr: {0}")]
    InvalidAddress(String),
}

/// A peer and its listen addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Peer ID
    pub id: PeerId,

    /// Listen addresses, in the order the daemon reported them
    pub addrs: Vec<Multiaddr>,
}

impl PeerInfo {
    /// Decode a peer record received from the daemon.
    ///
    /// The record is decoded as a whole: a bad id or any bad address fails
    /// the entire record.
    pub fn from_record(record: Option<&PeerRecord>) -> Result<Self, RecordError> {
        let record = record.ok_or(RecordError::InvalidRecord)?;

        let id = PeerId::from_bytes(&record.id)
            .map_err(|e| RecordError::InvalidIdentity(e.to_string()))?;

        let addrs = record
            .addrs
            .iter()
            .map(|bytes| {
                Multiaddr::try_from(bytes.clone())
                    .map_err(|e| RecordError::InvalidAddress(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { id, addrs })
    }

    /// Encode into the daemon's record form
    pub fn to_record(&self) -> PeerRecord {
        PeerRecord {
            id: self.id.to_bytes(),
            addrs: self.addrs.iter().map(|addr| addr.to_vec()).collect(),
        }
    }
}

impl TryFrom<&PeerRecord> for PeerInfo {
    type Error = RecordError;

    fn try_from(record: &PeerRecord) -> Result<Self, Self::Error> {
        Self::from_record(Some(record))
    }
}
