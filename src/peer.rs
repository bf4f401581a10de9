//! Peer identity and catalog records.
//!
//! A [`NodeAddress`] is the opaque network identity of a node in the overlay.
//! The manager never interprets the host part; it only compares addresses by
//! value, so onion addresses, DNS names, and raw IPs all work the same way.
//!
//! A [`Peer`] is a catalog record for a known peer. Equality and hashing are
//! by address alone: two records with the same address collide in any set,
//! regardless of when they were first seen or how often they failed.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Opaque network identity of a node in the overlay.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A peer known to the overlay, learned via gossip, persistence, or a live
/// connection.
///
/// `first_seen_ms` and `failed_attempts` are bookkeeping only: equality and
/// hashing ignore them, so re-learning an already known address never resets
/// its record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Peer {
    pub address: NodeAddress,
    pub first_seen_ms: u64,
    failed_attempts: u32,
}

impl Peer {
    /// Create a record first seen now.
    pub fn new(address: NodeAddress) -> Self {
        Self::with_first_seen(address, unix_time_ms())
    }

    /// Create a record with an explicit first-seen timestamp.
    pub fn with_first_seen(address: NodeAddress, first_seen_ms: u64) -> Self {
        Self { address, first_seen_ms, failed_attempts: 0 }
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn increase_failed_attempts(&mut self) {
        self.failed_attempts = self.failed_attempts.saturating_add(1);
    }

    /// Age of this record relative to `now_ms`.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.first_seen_ms)
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Peer {}

impl Hash for Peer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}
