//! Datagrams exchanged between simulated hosts.
//!
//! This is a stand-in for the sync session's network traffic, just enough to
//! carry update notifications and fetches across turmoil's simulated links.
//! Each datagram is one CBOR-encoded [`SimMessage`].

use chronosim_core::{MissingDataInfo, Name, SeqNo};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest datagram a host will accept.
pub const MAX_DATAGRAM_SIZE: usize = 8 * 1024;

/// Errors from encoding or decoding a datagram.
#[derive(Debug, Error)]
pub enum WireError {
    /// CBOR encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR decoding failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// Encoded message does not fit in one datagram.
    #[error("message too large: {size} bytes (max {MAX_DATAGRAM_SIZE})")]
    TooLarge {
        /// Encoded size.
        size: usize,
    },
}

/// One datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimMessage {
    /// New data announced by `origin`.
    Update {
        /// Host name of the publisher, used to route fetches back to it.
        origin: String,
        /// Newly published ranges.
        updates: Vec<MissingDataInfo>,
    },

    /// Request for one sequence number of a session.
    Interest {
        /// Correlates the reply with the pending fetch.
        request_id: u64,
        /// Session being fetched.
        session: Name,
        /// Sequence number being fetched.
        seq: SeqNo,
    },

    /// Reply to an interest.
    Data {
        /// Copied from the interest.
        request_id: u64,
        /// Full data name.
        name: Name,
        /// Payload bytes.
        content: Vec<u8>,
        /// Freshness in milliseconds.
        freshness_ms: u64,
    },
}

impl SimMessage {
    /// Encode to CBOR.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| WireError::Encode(e.to_string()))?;
        if buf.len() > MAX_DATAGRAM_SIZE {
            return Err(WireError::TooLarge { size: buf.len() });
        }
        Ok(buf)
    }

    /// Decode from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(WireError::TooLarge { size: bytes.len() });
        }
        ciborium::from_reader(bytes).map_err(|e| WireError::Decode(e.to_string()))
    }
}
