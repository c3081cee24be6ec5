use std::io::{Error, ErrorKind};

use libp2p::gossipsub::{DataTransform, Message, RawMessage, TopicHash};
use snap::raw::{Decoder, Encoder, decompress_len};

/// Largest name record accepted after decompression.
pub const MAX_RECORD_SIZE: usize = 10 * 1024;

/// Snappy block compression of gossip payloads.
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    max_decompressed_len: usize,
}

impl Compressor {
    pub fn new(max_decompressed_len: usize) -> Self {
        Self {
            max_decompressed_len,
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(MAX_RECORD_SIZE)
    }
}

impl DataTransform for Compressor {
    fn inbound_transform(&self, raw_message: RawMessage) -> Result<Message, Error> {
        let len = decompress_len(&raw_message.data)?;
        if len > self.max_decompressed_len {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("payload of {len} bytes exceeds {}", self.max_decompressed_len),
            ));
        }

        let data = Decoder::new().decompress_vec(&raw_message.data)?;

        Ok(Message {
            topic: raw_message.topic,
            data,
            sequence_number: raw_message.sequence_number,
            source: raw_message.source,
        })
    }

    fn outbound_transform(&self, _topic: &TopicHash, data: Vec<u8>) -> Result<Vec<u8>, Error> {
        Ok(Encoder::new().compress_vec(&data)?)
    }
}
