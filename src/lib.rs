//! # Peerwise - Peer Lifecycle Management for Overlay Networks
//!
//! Peerwise is the policy brain that sits above a transport layer and below
//! the gossip/messaging layers of a peer-to-peer overlay node. It governs
//! the lifecycle of inbound and outbound connections, maintains two durable
//! catalogs of known peers, and enforces global policies on how many
//! connections of which category the node retains:
//!
//! - **Admission & eviction**: a tiered ladder trims connections when the
//!   node exceeds healthy limits, preserving outbound peers, then any peers,
//!   then everything except direct-messaging sessions, before giving up
//!   privilege entirely.
//! - **Peer catalogs**: bounded *reported* and *persisted* sets with aging,
//!   uniform-random purge, and fault accounting; the persisted set survives
//!   restarts via a debounced store.
//! - **Liveness**: "all connections lost" and "awake from standby" edges are
//!   detected and fanned out to registered observers.
//!
//! ## Architecture
//!
//! The crate uses the actor pattern for safe concurrent state: the
//! [`PeerManager`] handle is cheap to clone and communicates with a private
//! actor over async channels. The actor owns all mutable state and processes
//! transport events, clock events, and commands sequentially, so policy
//! decisions never race.
//!
//! The transport itself is out of scope and consumed through the
//! [`Transport`]/[`PeerConnection`] traits; tests drive the manager with an
//! in-memory mock.
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `manager` | Peer Manager actor: policy engine, housekeeping, liveness |
//! | `catalog` | Bounded reported/persisted peer sets |
//! | `limits` | Tiered connection limits from one configured maximum |
//! | `transport` | Transport facade traits and connection contract |
//! | `storage` | Debounced persistence of the persisted peer set |
//! | `clock` | Tick source with standby detection |
//! | `observer` | Copy-on-write lifecycle event fan-out |
//! | `peer` | Node addresses and peer records |

mod catalog;
mod clock;
mod limits;
mod manager;
mod observer;
mod peer;
mod storage;
mod transport;

pub use catalog::{DEFAULT_MAX_FAILED_ATTEMPTS, MAX_AGE, MAX_PERSISTED, MAX_REPORTED};
pub use clock::{Clock, ClockEvent, IDLE_TOLERANCE, TICK_INTERVAL};
pub use limits::ConnectionLimits;
pub use manager::{
    PeerManager, PeerManagerBuilder, CHECK_MAX_CONN_DELAY, DEFAULT_MAX_CONNECTIONS,
    REMOVE_ANONYMOUS_PEER_DELAY,
};
pub use observer::{ObserverSet, PeerObserver};
pub use peer::{unix_time_ms, NodeAddress, Peer};
pub use storage::{PeerStore, PERSIST_DEBOUNCE};
pub use transport::{
    CloseReason, ConnectionId, ConnectionRef, Direction, PeerConnection, PeerKind, RuleViolation,
    Transport, TransportEvent,
};
