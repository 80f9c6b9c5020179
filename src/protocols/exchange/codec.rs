//! Token batch codec.
//!
//! Protocol Buffers messages, declared with `prost` derives:
//!
//! ```text
//! message ClientToServer { repeated bytes hashes = 1; }
//! message HashAndBlock   { bytes hash = 1; bytes block = 2; }
//! message ServerToClient { repeated HashAndBlock hash_and_block = 1; }
//! ```

use crate::error::DecodeError;
use bytes::Bytes;
use prost::Message;

/// Request payload: a batch of tokens.
#[derive(Clone, PartialEq, Message)]
pub struct ClientToServer {
    #[prost(bytes = "bytes", repeated, tag = "1")]
    pub hashes: Vec<Bytes>,
}

/// One token with its block.
#[derive(Clone, PartialEq, Message)]
pub struct HashAndBlock {
    #[prost(bytes = "bytes", tag = "1")]
    pub hash: Bytes,
    #[prost(bytes = "bytes", tag = "2")]
    pub block: Bytes,
}

/// Response payload: the recognized tokens with their blocks.
#[derive(Clone, PartialEq, Message)]
pub struct ServerToClient {
    #[prost(message, repeated, tag = "1")]
    pub hash_and_block: Vec<HashAndBlock>,
}

pub fn encode_request(hashes: &[Bytes]) -> Bytes {
    ClientToServer {
        hashes: hashes.to_vec(),
    }
    .encode_to_vec()
    .into()
}

pub fn decode_request(body: &[u8]) -> Result<Vec<Bytes>, DecodeError> {
    Ok(ClientToServer::decode(body)?.hashes)
}

pub fn encode_response(batch: &[HashAndBlock]) -> Bytes {
    ServerToClient {
        hash_and_block: batch.to_vec(),
    }
    .encode_to_vec()
    .into()
}

pub fn decode_response(body: &[u8]) -> Result<Vec<HashAndBlock>, DecodeError> {
    Ok(ServerToClient::decode(body)?.hash_and_block)
}
