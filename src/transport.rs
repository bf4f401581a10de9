//! Transport facade consumed by the peer manager.
//!
//! The manager never opens or closes sockets itself. It observes the
//! transport through [`Transport`] snapshots, learns about connects and
//! disconnects from a [`TransportEvent`] channel, and asks individual
//! connections to shut down with a [`CloseReason`].
//!
//! Connection lifecycle callbacks are rendered as message types on a channel
//! rather than listener interfaces: `subscribe()` hands out the event stream,
//! and dropping the receiver detaches it.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::peer::NodeAddress;

/// Stable identifier for a live connection, assigned by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Role assigned to a live connection.
///
/// The manager sets `SeedNode` when the remote address matches the seed set;
/// the other variants are set by neighboring subsystems and respected here.
/// `DirectMsgPeer` is privileged: it is never a victim of ordinary eviction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerKind {
    SeedNode,
    Peer,
    DirectMsgPeer,
    InitialDataExchange,
}

/// Reason codes the manager passes to [`PeerConnection::shutdown`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    TooManyConnectionsOpen,
    TooManySeedNodesConnected,
    UnknownPeerAddress,
}

/// Protocol-rule breaches reported against a connection. The transport is
/// expected to escalate repeated violations on its own; the manager only
/// records the first one it causes and consumes any it observes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleViolation {
    TooManyReportedPeersSent,
}

/// A live connection handle, owned by the transport and borrowed by the
/// manager. All attribute getters are cheap snapshots.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// The remote peer's overlay address, once known. Freshly accepted
    /// inbound connections may not know it yet.
    fn peer_address(&self) -> Option<NodeAddress>;

    fn direction(&self) -> Direction;

    fn kind(&self) -> PeerKind;

    fn set_kind(&self, kind: PeerKind);

    /// Timestamp of the most recent activity on this connection, in
    /// milliseconds since the Unix epoch.
    fn last_activity_ms(&self) -> u64;

    fn is_closed(&self) -> bool;

    fn rule_violation(&self) -> Option<RuleViolation>;

    fn report_rule_violation(&self, violation: RuleViolation);

    /// Ask the transport to close this connection. Completion of the future
    /// means the transport has accepted the shutdown; the matching
    /// [`TransportEvent::Disconnected`] follows on the event stream.
    async fn shutdown(&self, reason: CloseReason);
}

pub type ConnectionRef = Arc<dyn PeerConnection>;

/// Events emitted by the transport, delivered FIFO. A `Connected` for a given
/// connection is always observed before its `Disconnected`.
pub enum TransportEvent {
    Connected(ConnectionRef),
    Disconnected(ConnectionRef),
    /// Transient transport error. The manager ignores these.
    Error(String),
}

/// Snapshot view of the transport's connection table.
pub trait Transport: Send + Sync {
    fn all_connections(&self) -> Vec<ConnectionRef>;

    /// Connections whose remote peer address is known.
    fn confirmed_connections(&self) -> Vec<ConnectionRef> {
        self.all_connections()
            .into_iter()
            .filter(|c| c.peer_address().is_some())
            .collect()
    }

    fn confirmed_addresses(&self) -> HashSet<NodeAddress> {
        self.confirmed_connections()
            .into_iter()
            .filter_map(|c| c.peer_address())
            .collect()
    }

    /// The local node's own overlay address, once discovered. May be absent
    /// while the node is still bootstrapping.
    fn local_address(&self) -> Option<NodeAddress>;

    /// Hand out the connection event stream. Called once by the manager at
    /// construction; dropping the receiver detaches it.
    fn subscribe(&self) -> mpsc::Receiver<TransportEvent>;
}
