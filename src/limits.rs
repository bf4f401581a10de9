//! Tiered connection limits derived from a single configured maximum.
//!
//! All limits are a fixed offset from `max_connections`, so operators tune
//! one number and the eviction ladder keeps its shape:
//!
//! | Limit | Value | Role |
//! |-------|-------|------|
//! | `min_connections` | `max(1, M - 4)` | below this the node is under-connected |
//! | `max_connections` | `M` | steady-state target |
//! | `peer_limit` | `M + 4` | above this any PEER connection may be evicted |
//! | `non_direct_limit` | `M + 8` | above this anything but direct-messaging may go |
//! | `absolute_limit` | `M + 18` | hard cap; above this nothing is privileged |

/// Connection limit ladder. Cheap to copy; changing the maximum at runtime
/// replaces the whole value in one assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionLimits {
    max_connections: usize,
    min_connections: usize,
    peer_limit: usize,
    non_direct_limit: usize,
    absolute_limit: usize,
}

impl ConnectionLimits {
    pub fn from_max(max_connections: usize) -> Self {
        Self {
            max_connections,
            min_connections: max_connections.saturating_sub(4).max(1),
            peer_limit: max_connections + 4,
            non_direct_limit: max_connections + 8,
            absolute_limit: max_connections + 18,
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn min_connections(&self) -> usize {
        self.min_connections
    }

    pub fn peer_limit(&self) -> usize {
        self.peer_limit
    }

    pub fn non_direct_limit(&self) -> usize {
        self.non_direct_limit
    }

    pub fn absolute_limit(&self) -> usize {
        self.absolute_limit
    }

    /// The limit the node advertises as its effective maximum: the hard cap,
    /// not the steady-state target.
    pub fn effective_max(&self) -> usize {
        self.absolute_limit
    }
}
