//! Types exchanged with the sync session.
//!
//! The session announces new remote data as [`MissingDataInfo`] ranges and
//! answers fetches with [`Data`] packets.

use std::{ops::RangeInclusive, time::Duration};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::name::{Component, Name};

/// Per-session sequence number. The first publication of a session is 1.
pub type SeqNo = u64;

/// A range of sequence numbers a remote session has published and this node
/// has not seen yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDataInfo {
    /// Session name of the publishing peer.
    pub session: Name,
    /// First missing sequence number.
    pub low: SeqNo,
    /// Last missing sequence number (inclusive).
    pub high: SeqNo,
}

impl MissingDataInfo {
    /// Create a new range.
    pub fn new(session: Name, low: SeqNo, high: SeqNo) -> Self {
        Self { session, low, high }
    }

    /// All sequence numbers in the range. Empty when `low > high`.
    pub fn seqs(&self) -> RangeInclusive<SeqNo> {
        self.low..=self.high
    }

    /// Number of sequence numbers in the range, saturating at `u64::MAX`.
    pub fn width(&self) -> u64 {
        if self.low > self.high { 0 } else { (self.high - self.low).saturating_add(1) }
    }
}

/// A named data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    /// Full data name: session name followed by the sequence number.
    pub name: Name,
    /// Application payload.
    pub content: Bytes,
    /// How long caches may treat the packet as fresh.
    pub freshness: Duration,
}

impl Data {
    /// Create a data packet.
    pub fn new(name: Name, content: impl Into<Bytes>, freshness: Duration) -> Self {
        Self { name, content: content.into(), freshness }
    }

    /// The publishing peer, taken from name component 1.
    ///
    /// With a single-component routing prefix (`/ndn/peer0/...`) this is the
    /// user prefix of the publisher.
    pub fn peer_identity(&self) -> Option<&Component> {
        self.name.get(1)
    }

    /// Sequence number carried in the last name component.
    pub fn seq(&self) -> Option<SeqNo> {
        self.name.last().and_then(Component::to_number)
    }
}
