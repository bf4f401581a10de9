//! Peer Manager actor: connection admission, eviction, and peer bookkeeping.
//!
//! The manager is the policy brain between the transport and the gossip
//! layers. It decides which connections to trim when the node exceeds its
//! limits, which peers to remember across restarts, and when the node is
//! effectively offline.
//!
//! ## Eviction ladder
//!
//! When the connection count exceeds a threshold, victims are drawn from
//! progressively wider candidate pools. A tier is consulted only when the
//! previous tier produced no candidates *and* its own threshold is exceeded:
//!
//! | Tier | Threshold | Candidates |
//! |------|-----------|------------|
//! | 1 | `max_connections` | inbound connections of kind `Peer` |
//! | 2 | `peer_limit` | any connection of kind `Peer` |
//! | 3 | `non_direct_limit` | anything but `DirectMsgPeer` |
//! | 4 | `absolute_limit` | every connection |
//!
//! Within the chosen pool the victim is the connection with the oldest
//! activity. Each pass removes at most one connection; the re-check runs as
//! a message posted back onto the actor, so other events interleave between
//! passes and the stack stays flat.
//!
//! ## Actor architecture
//!
//! - [`PeerManager`]: public handle, cheap to clone, commands via channels
//! - `ManagerActor`: owns all mutable state, processes events sequentially
//!
//! Transport and clock callbacks arrive as messages on their own channels;
//! the actor's `select!` loop is the single place state is touched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::catalog::{PeerCatalog, DEFAULT_MAX_FAILED_ATTEMPTS};
use crate::clock::{Clock, ClockEvent, IDLE_TOLERANCE};
use crate::limits::ConnectionLimits;
use crate::observer::{ObserverSet, PeerObserver};
use crate::peer::{unix_time_ms, NodeAddress, Peer};
use crate::storage::PeerStore;
use crate::transport::{
    CloseReason, ConnectionRef, Direction, PeerKind, RuleViolation, Transport, TransportEvent,
};

/// Delay before a housekeeping sweep runs, coalescing bursts of connects.
pub const CHECK_MAX_CONN_DELAY: Duration = Duration::from_secs(5);

/// Grace period before a connection with an unknown peer address is reaped.
/// Long, because a bootstrapping peer may not know its own externally
/// visible address yet.
pub const REMOVE_ANONYMOUS_PEER_DELAY: Duration = Duration::from_secs(120);

/// Default steady-state connection target.
pub const DEFAULT_MAX_CONNECTIONS: usize = 12;

const COMMAND_CHANNEL_CAPACITY: usize = 256;

enum Command {
    AddReportedPeers {
        batch: HashSet<Peer>,
        origin: ConnectionRef,
        reply: oneshot::Sender<()>,
    },
    ReportedPeers(oneshot::Sender<HashSet<Peer>>),
    PersistedPeers(oneshot::Sender<HashSet<Peer>>),
    HandleConnectionFault {
        address: NodeAddress,
        reply: oneshot::Sender<()>,
    },
    ShutdownConnection {
        connection: ConnectionRef,
        reason: CloseReason,
        reply: oneshot::Sender<()>,
    },
    ShutdownPeer {
        address: NodeAddress,
        reason: CloseReason,
        reply: oneshot::Sender<()>,
    },
    HasSufficientConnections(oneshot::Sender<bool>),
    IsSeedNode(NodeAddress, oneshot::Sender<bool>),
    IsSelf(NodeAddress, oneshot::Sender<bool>),
    IsConfirmed(NodeAddress, oneshot::Sender<bool>),
    ConnectedNonSeedPeers {
        exclude: Option<NodeAddress>,
        reply: oneshot::Sender<HashSet<Peer>>,
    },
    SetMaxConnections(usize, oneshot::Sender<()>),
    EffectiveMax(oneshot::Sender<usize>),
    Quit(oneshot::Sender<()>),
}

/// Work the actor defers and posts back to itself. Volume is bounded by the
/// connection table, never by remote input, so the channel is unbounded.
enum InternalEvent {
    HousekeepingExpired,
    AnonymousCheck(ConnectionRef),
    ContinueMaxConnCheck { limit: usize },
    ContinueSeedSweep,
}

/// Builder for [`PeerManager`]. The transport and storage directory are
/// mandatory; everything else has the production defaults.
pub struct PeerManagerBuilder {
    transport: Arc<dyn Transport>,
    storage_dir: PathBuf,
    max_connections: usize,
    seed_addresses: HashSet<NodeAddress>,
    max_failed_attempts: u32,
    catalog_seed: Option<u64>,
    clock_events: Option<mpsc::Receiver<ClockEvent>>,
}

impl PeerManagerBuilder {
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Seed addresses used for classification. May be empty: a lone
    /// bootstrap seed node has no other seeds to list.
    pub fn seed_addresses(mut self, seeds: HashSet<NodeAddress>) -> Self {
        self.seed_addresses = seeds;
        self
    }

    /// Failed connection attempts after which a persisted peer is evicted.
    pub fn max_failed_attempts(mut self, attempts: u32) -> Self {
        self.max_failed_attempts = attempts;
        self
    }

    /// Fix the catalog purge PRNG for deterministic tests.
    pub fn catalog_seed(mut self, seed: u64) -> Self {
        self.catalog_seed = Some(seed);
        self
    }

    /// Supply an external clock event stream instead of the system ticker.
    pub fn clock_events(mut self, events: mpsc::Receiver<ClockEvent>) -> Self {
        self.clock_events = Some(events);
        self
    }

    pub async fn spawn(self) -> PeerManager {
        let persisted = PeerStore::load(&self.storage_dir).await.unwrap_or_default();
        if !persisted.is_empty() {
            info!(count = persisted.len(), "loaded persisted peers");
        }
        let store = PeerStore::open(&self.storage_dir);
        let catalog = match self.catalog_seed {
            Some(seed) => PeerCatalog::with_seed(persisted, self.max_failed_attempts, seed),
            None => PeerCatalog::new(persisted, self.max_failed_attempts),
        };

        let (clock, clock_rx) = match self.clock_events {
            Some(rx) => (None, rx),
            None => {
                let (clock, rx) = Clock::spawn();
                (Some(Arc::new(clock)), rx)
            }
        };

        let transport_rx = self.transport.subscribe();
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let observers = Arc::new(ObserverSet::new());

        let actor = ManagerActor {
            transport: self.transport,
            seeds: self.seed_addresses,
            limits: ConnectionLimits::from_max(self.max_connections),
            catalog,
            store,
            observers: observers.clone(),
            internal_tx,
            check_timer: None,
            stopped: false,
            lost_all_connections: false,
        };
        tokio::spawn(actor.run(cmd_rx, transport_rx, clock_rx, internal_rx));

        PeerManager { cmd_tx, observers, clock }
    }
}

/// Public handle to the peer manager actor. Cheap to clone.
///
/// None of the operations return errors: failures are recovered and logged
/// inside the actor, and queries against a stopped actor yield defaults.
#[derive(Clone)]
pub struct PeerManager {
    cmd_tx: mpsc::Sender<Command>,
    observers: Arc<ObserverSet>,
    clock: Option<Arc<Clock>>,
}

impl PeerManager {
    pub fn builder(transport: Arc<dyn Transport>, storage_dir: impl AsRef<Path>) -> PeerManagerBuilder {
        PeerManagerBuilder {
            transport,
            storage_dir: storage_dir.as_ref().to_path_buf(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            seed_addresses: HashSet::new(),
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            catalog_seed: None,
            clock_events: None,
        }
    }

    /// Spawn with the standard constructor parameters.
    pub async fn spawn(
        transport: Arc<dyn Transport>,
        max_connections: usize,
        seed_addresses: HashSet<NodeAddress>,
        storage_dir: impl AsRef<Path>,
        clock_events: mpsc::Receiver<ClockEvent>,
    ) -> Self {
        Self::builder(transport, storage_dir)
            .max_connections(max_connections)
            .seed_addresses(seed_addresses)
            .clock_events(clock_events)
            .spawn()
            .await
    }

    pub fn add_listener(&self, observer: Arc<dyn PeerObserver>) {
        self.observers.add(observer);
    }

    pub fn remove_listener(&self, observer: &Arc<dyn PeerObserver>) -> bool {
        self.observers.remove(observer)
    }

    /// Union a gossip batch of reported peers into the catalogs. A batch
    /// violating the flood gate is dropped whole and `origin` is flagged
    /// with [`RuleViolation::TooManyReportedPeersSent`].
    pub async fn add_reported_peers(&self, batch: HashSet<Peer>, origin: ConnectionRef) {
        self.roundtrip_unit(|reply| Command::AddReportedPeers { batch, origin, reply })
            .await;
    }

    pub async fn reported_peers(&self) -> HashSet<Peer> {
        self.roundtrip(Command::ReportedPeers).await.unwrap_or_default()
    }

    pub async fn persisted_peers(&self) -> HashSet<Peer> {
        self.roundtrip(Command::PersistedPeers).await.unwrap_or_default()
    }

    /// Account a failed connection attempt the caller observed itself.
    pub async fn handle_connection_fault(&self, address: NodeAddress) {
        self.roundtrip_unit(|reply| Command::HandleConnectionFault { address, reply })
            .await;
    }

    /// Shut a connection down unless it is a privileged direct-messaging
    /// session.
    pub async fn shutdown_connection(&self, connection: ConnectionRef, reason: CloseReason) {
        self.roundtrip_unit(|reply| Command::ShutdownConnection { connection, reason, reply })
            .await;
    }

    /// Shut down the first non-privileged connection to `address`.
    pub async fn shutdown_peer(&self, address: NodeAddress, reason: CloseReason) {
        self.roundtrip_unit(|reply| Command::ShutdownPeer { address, reason, reply })
            .await;
    }

    pub async fn has_sufficient_connections(&self) -> bool {
        self.roundtrip(Command::HasSufficientConnections)
            .await
            .unwrap_or(false)
    }

    pub async fn is_seed_node(&self, address: NodeAddress) -> bool {
        self.roundtrip(|reply| Command::IsSeedNode(address, reply))
            .await
            .unwrap_or(false)
    }

    pub async fn is_self(&self, address: NodeAddress) -> bool {
        self.roundtrip(|reply| Command::IsSelf(address, reply))
            .await
            .unwrap_or(false)
    }

    /// Whether `address` is among the confirmed connections.
    pub async fn is_confirmed(&self, address: NodeAddress) -> bool {
        self.roundtrip(|reply| Command::IsConfirmed(address, reply))
            .await
            .unwrap_or(false)
    }

    /// Peer records for the confirmed, non-seed connections, optionally
    /// excluding one address. This is what peer exchange advertises.
    pub async fn connected_non_seed_peers(&self, exclude: Option<NodeAddress>) -> HashSet<Peer> {
        self.roundtrip(|reply| Command::ConnectedNonSeedPeers { exclude, reply })
            .await
            .unwrap_or_default()
    }

    /// Change the steady-state target; every derived limit follows in one
    /// atomic replacement.
    pub async fn set_max_connections(&self, max_connections: usize) {
        self.roundtrip_unit(|reply| Command::SetMaxConnections(max_connections, reply))
            .await;
    }

    /// The hard cap the node advertises (`absolute_limit`).
    pub async fn effective_max(&self) -> usize {
        self.roundtrip(Command::EffectiveMax).await.unwrap_or(0)
    }

    /// Stop the actor: cancels the housekeeping timer, flushes any pending
    /// persisted-set write, and detaches the clock.
    pub async fn shutdown(&self) {
        if let Some(clock) = &self.clock {
            clock.stop();
        }
        self.roundtrip_unit(Command::Quit).await;
    }

    async fn roundtrip<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(make(tx)).await.is_err() {
            return None;
        }
        rx.await.ok()
    }

    async fn roundtrip_unit(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) {
        let _ = self.roundtrip(make).await;
    }
}

struct ManagerActor {
    transport: Arc<dyn Transport>,
    seeds: HashSet<NodeAddress>,
    limits: ConnectionLimits,
    catalog: PeerCatalog,
    store: PeerStore,
    observers: Arc<ObserverSet>,
    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    check_timer: Option<JoinHandle<()>>,
    /// Latched when the last connection is gone; gates housekeeping.
    stopped: bool,
    lost_all_connections: bool,
}

impl ManagerActor {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut transport_rx: mpsc::Receiver<TransportEvent>,
        mut clock_rx: mpsc::Receiver<ClockEvent>,
        mut internal_rx: mpsc::UnboundedReceiver<InternalEvent>,
    ) {
        let mut transport_open = true;
        let mut clock_open = true;

        loop {
            tokio::select! {
                event = transport_rx.recv(), if transport_open => match event {
                    Some(event) => self.on_transport_event(event).await,
                    None => {
                        debug!("transport event stream closed");
                        transport_open = false;
                    }
                },
                event = internal_rx.recv() => match event {
                    Some(event) => self.on_internal_event(event).await,
                    // The actor holds a sender; this arm never yields None
                    // while it runs.
                    None => {}
                },
                event = clock_rx.recv(), if clock_open => match event {
                    Some(event) => self.on_clock_event(event),
                    None => {
                        debug!("clock event stream closed");
                        clock_open = false;
                    }
                },
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => {
                        if !self.on_command(cmd).await {
                            break;
                        }
                    }
                    None => {
                        debug!("peer manager handle dropped, actor quitting");
                        break;
                    }
                },
            }
        }

        self.stop_check_timer();
        self.store.flush().await;
    }

    // =========================================================================
    // Transport events
    // =========================================================================

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected(conn) => self.on_connection(conn).await,
            TransportEvent::Disconnected(conn) => self.on_disconnect(conn).await,
            TransportEvent::Error(error) => {
                // Transient transport errors carry no policy signal.
                trace!(%error, "transport error ignored");
            }
        }
    }

    async fn on_connection(&mut self, conn: ConnectionRef) {
        debug!(
            peer = ?conn.peer_address().map(|a| a.to_string()),
            open = self.transport.all_connections().len(),
            "connection established"
        );
        if self.is_seed_connection(&conn) {
            conn.set_kind(PeerKind::SeedNode);
        }

        self.arm_housekeeping();

        if self.lost_all_connections {
            self.lost_all_connections = false;
            self.stopped = false;
            info!("first connection after losing all");
            self.observers.notify_new_connection_after_all_connections_lost();
        }
    }

    async fn on_disconnect(&mut self, conn: ConnectionRef) {
        debug!(
            peer = ?conn.peer_address().map(|a| a.to_string()),
            open = self.transport.all_connections().len(),
            "connection closed"
        );
        if let Some(address) = conn.peer_address() {
            let had_violation = conn.rule_violation().is_some();
            if self.catalog.register_fault(&address, had_violation, unix_time_ms()) {
                self.queue_persist().await;
            }
        }

        self.lost_all_connections = self.transport.all_connections().is_empty();
        if self.lost_all_connections {
            self.stopped = true;
            info!("all connections lost");
            self.observers.notify_all_connections_lost();
        }
    }

    fn on_clock_event(&mut self, event: ClockEvent) {
        match event {
            ClockEvent::Tick => {}
            ClockEvent::MissedTicks { gap } => {
                if gap > IDLE_TOLERANCE {
                    warn!(gap_secs = gap.as_secs(), "awake from standby");
                    self.stopped = false;
                    self.observers.notify_awake_from_standby();
                }
            }
        }
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    fn arm_housekeeping(&mut self) {
        if self.check_timer.is_some() {
            return;
        }
        self.log_connected_peers();
        let tx = self.internal_tx.clone();
        self.check_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(CHECK_MAX_CONN_DELAY).await;
            let _ = tx.send(InternalEvent::HousekeepingExpired);
        }));
    }

    fn stop_check_timer(&mut self) {
        if let Some(timer) = self.check_timer.take() {
            timer.abort();
        }
    }

    async fn on_internal_event(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::HousekeepingExpired => self.run_housekeeping().await,
            InternalEvent::AnonymousCheck(conn) => {
                if conn.peer_address().is_none() && !conn.is_closed() {
                    info!(connection = ?conn.id(), "peer address still unknown, closing");
                    conn.shutdown(CloseReason::UnknownPeerAddress).await;
                }
            }
            InternalEvent::ContinueMaxConnCheck { limit } => {
                self.check_max_connections(limit).await;
            }
            InternalEvent::ContinueSeedSweep => {
                self.remove_superfluous_seed_nodes().await;
            }
        }
    }

    async fn run_housekeeping(&mut self) {
        self.stop_check_timer();
        if self.stopped {
            warn!("node is stopped, skipping housekeeping");
            return;
        }

        self.remove_anonymous_peers();
        self.remove_superfluous_seed_nodes().await;
        let now = unix_time_ms();
        self.catalog.purge_aged_reported(now);
        if self.catalog.purge_aged_persisted(now) {
            self.queue_persist().await;
        }
        self.check_max_connections(self.limits.max_connections()).await;
    }

    /// Schedule a reaping check for every connection whose peer address is
    /// still unknown. The check itself runs after the grace period; by then
    /// the address is usually known and the check is a no-op.
    fn remove_anonymous_peers(&self) {
        for conn in self.transport.all_connections() {
            if conn.peer_address().is_none() {
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(REMOVE_ANONYMOUS_PEER_DELAY).await;
                    let _ = tx.send(InternalEvent::AnonymousCheck(conn));
                });
            }
        }
    }

    /// Seed nodes are scarce shared infrastructure; a well-connected node
    /// releases them. Keeps at least one seed connection.
    async fn remove_superfluous_seed_nodes(&mut self) {
        let confirmed = self.transport.confirmed_connections();
        if confirmed.len() <= self.limits.max_connections() {
            return;
        }
        if !self.has_sufficient_connections() {
            return;
        }
        let mut candidates: Vec<ConnectionRef> = confirmed
            .into_iter()
            .filter(|c| self.is_seed_connection(c))
            .collect();
        if candidates.len() > 1 {
            candidates.sort_by_key(|c| c.last_activity_ms());
            let victim = candidates.remove(0);
            info!(
                seed = ?victim.peer_address().map(|a| a.to_string()),
                remaining = candidates.len(),
                "releasing oldest seed connection"
            );
            victim.shutdown(CloseReason::TooManySeedNodesConnected).await;
            let _ = self.internal_tx.send(InternalEvent::ContinueSeedSweep);
        }
    }

    /// One eviction pass against `limit`. Returns whether a victim was
    /// selected; the re-check after its shutdown arrives as an internal
    /// message.
    async fn check_max_connections(&mut self, limit: usize) -> bool {
        let all = self.transport.all_connections();
        let size = all.len();
        info!(open = size, limit, "checking connection count");

        if size <= limit {
            trace!(open = size, "connection count within limit");
            return false;
        }

        let mut candidates: Vec<ConnectionRef> = all
            .iter()
            .filter(|c| c.direction() == Direction::Inbound && c.kind() == PeerKind::Peer)
            .cloned()
            .collect();

        if candidates.is_empty() {
            info!(
                peer_limit = self.limits.peer_limit(),
                "no inbound peer candidates, widening to any peer"
            );
            if size > self.limits.peer_limit() {
                candidates = all.iter().filter(|c| c.kind() == PeerKind::Peer).cloned().collect();

                if candidates.is_empty() {
                    info!(
                        non_direct_limit = self.limits.non_direct_limit(),
                        "no peer candidates, widening to non-direct connections"
                    );
                    if size > self.limits.non_direct_limit() {
                        candidates = all
                            .iter()
                            .filter(|c| c.kind() != PeerKind::DirectMsgPeer)
                            .cloned()
                            .collect();

                        if candidates.is_empty() {
                            info!(
                                absolute_limit = self.limits.absolute_limit(),
                                "no non-direct candidates, widening to all connections"
                            );
                            if size > self.limits.absolute_limit() {
                                candidates = all.clone();
                            }
                        }
                    }
                }
            }
        }

        if candidates.is_empty() {
            // Reachable only while the absolute limit is not exceeded.
            warn!(open = size, "no eviction candidates");
            return false;
        }

        candidates.sort_by_key(|c| c.last_activity_ms());
        let victim = candidates.remove(0);
        info!(
            victim = ?victim.peer_address().map(|a| a.to_string()),
            last_activity_ms = victim.last_activity_ms(),
            "shutting down oldest connection"
        );
        if !victim.is_closed() {
            victim.shutdown(CloseReason::TooManyConnectionsOpen).await;
            let _ = self.internal_tx.send(InternalEvent::ContinueMaxConnCheck { limit });
        }
        true
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Returns `false` when the actor should exit.
    async fn on_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::AddReportedPeers { batch, origin, reply } => {
                self.add_reported_peers(batch, origin).await;
                let _ = reply.send(());
            }
            Command::ReportedPeers(reply) => {
                let _ = reply.send(self.catalog.reported().clone());
            }
            Command::PersistedPeers(reply) => {
                let _ = reply.send(self.catalog.persisted().clone());
            }
            Command::HandleConnectionFault { address, reply } => {
                if self.catalog.register_fault(&address, false, unix_time_ms()) {
                    self.queue_persist().await;
                }
                let _ = reply.send(());
            }
            Command::ShutdownConnection { connection, reason, reply } => {
                if connection.kind() != PeerKind::DirectMsgPeer {
                    connection.shutdown(reason).await;
                } else {
                    trace!("direct-messaging connection is privileged, not shut down");
                }
                let _ = reply.send(());
            }
            Command::ShutdownPeer { address, reason, reply } => {
                let target = self.transport.all_connections().into_iter().find(|c| {
                    c.peer_address().as_ref() == Some(&address)
                        && c.kind() != PeerKind::DirectMsgPeer
                });
                if let Some(conn) = target {
                    conn.shutdown(reason).await;
                }
                let _ = reply.send(());
            }
            Command::HasSufficientConnections(reply) => {
                let _ = reply.send(self.has_sufficient_connections());
            }
            Command::IsSeedNode(address, reply) => {
                let _ = reply.send(self.seeds.contains(&address));
            }
            Command::IsSelf(address, reply) => {
                let _ = reply.send(self.transport.local_address().as_ref() == Some(&address));
            }
            Command::IsConfirmed(address, reply) => {
                let _ = reply.send(self.transport.confirmed_addresses().contains(&address));
            }
            Command::ConnectedNonSeedPeers { exclude, reply } => {
                let _ = reply.send(self.connected_non_seed_peers(exclude));
            }
            Command::SetMaxConnections(max_connections, reply) => {
                self.limits = ConnectionLimits::from_max(max_connections);
                debug!(max_connections, "connection limits recomputed");
                let _ = reply.send(());
            }
            Command::EffectiveMax(reply) => {
                let _ = reply.send(self.limits.effective_max());
            }
            Command::Quit(reply) => {
                debug!("peer manager actor quitting");
                self.stop_check_timer();
                self.store.flush().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn add_reported_peers(&mut self, batch: HashSet<Peer>, origin: ConnectionRef) {
        debug!(count = batch.len(), "received reported peers");
        let local = self.transport.local_address();
        if self
            .catalog
            .add_reported(batch, self.limits.absolute_limit(), local.as_ref())
        {
            self.queue_persist().await;
            self.log_reported_peers();
        } else {
            warn!(
                connection = ?origin.id(),
                "too many reported peers in one batch, flagging rule violation"
            );
            origin.report_rule_violation(RuleViolation::TooManyReportedPeersSent);
        }
    }

    // =========================================================================
    // Queries and helpers
    // =========================================================================

    fn has_sufficient_connections(&self) -> bool {
        self.transport.confirmed_addresses().len() >= self.limits.min_connections()
    }

    fn is_seed_connection(&self, conn: &ConnectionRef) -> bool {
        conn.peer_address().map_or(false, |a| self.seeds.contains(&a))
    }

    fn connected_non_seed_peers(&self, exclude: Option<NodeAddress>) -> HashSet<Peer> {
        self.transport
            .confirmed_connections()
            .into_iter()
            .filter_map(|c| c.peer_address())
            .filter(|a| !self.seeds.contains(a))
            .filter(|a| exclude.as_ref() != Some(a))
            .map(Peer::new)
            .collect()
    }

    async fn queue_persist(&self) {
        self.store.save(self.catalog.persisted().clone()).await;
    }

    fn log_connected_peers(&self) {
        let confirmed = self.transport.confirmed_connections();
        if confirmed.is_empty() {
            return;
        }
        debug!(
            count = confirmed.len(),
            local = ?self.transport.local_address().map(|a| a.to_string()),
            "connected peers"
        );
        for conn in &confirmed {
            trace!(
                peer = ?conn.peer_address().map(|a| a.to_string()),
                kind = ?conn.kind(),
                "connected peer"
            );
        }
    }

    fn log_reported_peers(&self) {
        let reported = self.catalog.reported();
        if reported.is_empty() {
            return;
        }
        debug!(count = reported.len(), "collected reported peers");
        for peer in reported.iter() {
            trace!(peer = %peer.address, "reported peer");
        }
    }
}
