//! Varint-delimited protobuf framing for the daemon control socket.
//!
//! Each message is framed as:
//! - unsigned varint: body length
//! - N bytes: protobuf-encoded message
//!
//! The decoder yields raw bodies; [`super::Connection::recv`] picks the
//! message type, since the daemon switches from `Response` to bare
//! `DHTResponse` frames once a stream has begun.

use bytes::{Buf, BytesMut};
use prost::Message;
use tokio_util::codec::{Decoder, Encoder};
use unsigned_varint::decode;

use super::CodecError;

/// Codec writing any protobuf message and reading delimited frame bodies.
#[derive(Debug)]
pub struct MessageCodec {
    /// Largest body accepted in either direction
    max_size: usize,

    /// Body length of the frame being read, once its header was consumed
    current_length: Option<usize>,
}

impl MessageCodec {
    /// Create a codec enforcing `max_size` on every frame body
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            current_length: None,
        }
    }

    /// Maximum frame body size
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn check_size(&self, size: usize) -> Result<(), CodecError> {
        if size > self.max_size {
            return Err(CodecError::FrameTooLarge {
                size,
                max: self.max_size,
            });
        }
        Ok(())
    }
}

impl Decoder for MessageCodec {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let length = match self.current_length {
            Some(length) => length,
            None => {
                let (length, header_len) = match decode::usize(&src[..]) {
                    Ok((length, rest)) => (length, src.len() - rest.len()),
                    Err(decode::Error::Insufficient) => return Ok(None),
                    Err(e) => return Err(CodecError::Header(e)),
                };
                self.check_size(length)?;

                src.advance(header_len);
                self.current_length = Some(length);
                length
            }
        };

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        self.current_length = None;
        Ok(Some(src.split_to(length)))
    }
}

impl<M: Message> Encoder<M> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, message: M, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let length = message.encoded_len();
        self.check_size(length)?;

        dst.reserve(prost::length_delimiter_len(length) + length);
        message.encode_length_delimited(dst)?;

        Ok(())
    }
}
