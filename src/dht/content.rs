//! Content identifiers used for provider records
//!
//! A content id is a self-describing hash of some content: either a bare
//! sha2-256 multihash (version 0) or `<version><codec><multihash>` with the
//! version and codec written as unsigned varints (version 1).

use libp2p::multihash::{self, Multihash};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use unsigned_varint::{decode, encode};

/// Multicodec for raw binary content
pub const RAW_CODEC: u64 = 0x55;

/// Multicodec for dag-pb encoded content
pub const DAG_PB_CODEC: u64 = 0x70;

const SHA2_256: u64 = 0x12;
const BLAKE3: u64 = 0x1e;

/// Encoded length of a version 0 id
const V0_LEN: usize = 34;

/// Multibase prefix of base58btc
const BASE58_PREFIX: char = 'z';

#[derive(Error, Debug)]
pub enum ContentIdError {
    #[error("Content id is empty")]
    Empty,

    #[error("Unsupported content id version: {0}")]
    UnsupportedVersion(u64),

    #[error("Invalid content id prefix: {0}")]
    Prefix(#[from] decode::Error),

    #[error("Invalid multihash: {0}")]
    Multihash(#[from] multihash::Error),

    #[error("Invalid encoding: {0}")]
    Encoding(String),
}

/// Validated content identifier
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ContentId {
    bytes: Vec<u8>,
    version: u64,
    codec: u64,
    hash: Multihash<64>,
}

impl ContentId {
    /// Version 1 id of raw content hashed with sha2-256
    pub fn sha256(data: &[u8]) -> Self {
        let hash = Multihash::wrap(SHA2_256, &Sha256::digest(data)).expect("32-byte digest fits");
        Self::v1(RAW_CODEC, hash)
    }

    /// Version 1 id of raw content hashed with BLAKE3
    pub fn blake3(data: &[u8]) -> Self {
        let hash =
            Multihash::wrap(BLAKE3, blake3::hash(data).as_bytes()).expect("32-byte digest fits");
        Self::v1(RAW_CODEC, hash)
    }

    fn v1(codec: u64, hash: Multihash<64>) -> Self {
        let mut bytes = Vec::with_capacity(4 + hash.encoded_len());
        bytes.extend_from_slice(encode::u64(1, &mut encode::u64_buffer()));
        bytes.extend_from_slice(encode::u64(codec, &mut encode::u64_buffer()));
        bytes.extend_from_slice(&hash.to_bytes());

        Self {
            bytes,
            version: 1,
            codec,
            hash,
        }
    }

    /// Parse and validate binary content id bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ContentIdError> {
        if bytes.is_empty() {
            return Err(ContentIdError::Empty);
        }

        // Version 0 is a bare sha2-256 multihash
        if bytes.len() == V0_LEN && bytes[0] == SHA2_256 as u8 {
            let hash = Multihash::from_bytes(&bytes)?;
            return Ok(Self {
                bytes,
                version: 0,
                codec: DAG_PB_CODEC,
                hash,
            });
        }

        let (version, rest) = decode::u64(&bytes)?;
        if version != 1 {
            return Err(ContentIdError::UnsupportedVersion(version));
        }
        let (codec, rest) = decode::u64(rest)?;
        let hash = Multihash::from_bytes(rest)?;

        Ok(Self {
            bytes,
            version,
            codec,
            hash,
        })
    }

    /// Raw bytes, as sent to the daemon
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Multicodec of the addressed content
    pub fn codec(&self) -> u64 {
        self.codec
    }

    pub fn hash(&self) -> &Multihash<64> {
        &self.hash
    }

    pub fn digest(&self) -> &[u8] {
        self.hash.digest()
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Base58 string form; version 1 ids carry the `z` multibase prefix
    pub fn to_base58(&self) -> String {
        let encoded = bs58::encode(&self.bytes).into_string();
        if self.version == 0 {
            encoded
        } else {
            format!("{}{}", BASE58_PREFIX, encoded)
        }
    }

    /// Parse from the string produced by [`ContentId::to_base58`]
    pub fn from_base58(s: &str) -> Result<Self, ContentIdError> {
        let encoded = s.strip_prefix(BASE58_PREFIX).unwrap_or(s);
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| ContentIdError::Encoding(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    /// Verify that data hashes to this id.
    ///
    /// Returns false for hash functions this crate cannot compute.
    pub fn verify(&self, data: &[u8]) -> bool {
        match self.hash.code() {
            SHA2_256 => Sha256::digest(data).as_slice() == self.digest(),
            BLAKE3 => blake3::hash(data).as_bytes().as_slice() == self.digest(),
            _ => false,
        }
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.to_base58())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl TryFrom<Vec<u8>> for ContentId {
    type Error = ContentIdError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}
