//! Integration tests for the peer manager public API.
//!
//! These tests drive the [`PeerManager`] handle against an in-memory mock
//! transport, validating the eviction ladder, the peer catalogs, and the
//! lifecycle edges in realistic end-to-end scenarios.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use peerwise::{
    ClockEvent, CloseReason, ConnectionId, ConnectionRef, Direction, NodeAddress, Peer,
    PeerConnection, PeerKind, PeerManager, PeerObserver, RuleViolation, Transport, TransportEvent,
    CHECK_MAX_CONN_DELAY, MAX_REPORTED, REMOVE_ANONYMOUS_PEER_DELAY,
};

// ============================================================================
// Mock transport
// ============================================================================

struct MockConnection {
    id: ConnectionId,
    direction: Direction,
    address: StdMutex<Option<NodeAddress>>,
    kind: StdMutex<PeerKind>,
    last_activity: AtomicU64,
    closed: AtomicBool,
    violation: StdMutex<Option<RuleViolation>>,
    close_reasons: StdMutex<Vec<CloseReason>>,
    transport: Weak<MockTransportState>,
}

impl MockConnection {
    fn close_reasons(&self) -> Vec<CloseReason> {
        self.close_reasons.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerConnection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_address(&self) -> Option<NodeAddress> {
        self.address.lock().unwrap().clone()
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn kind(&self) -> PeerKind {
        *self.kind.lock().unwrap()
    }

    fn set_kind(&self, kind: PeerKind) {
        *self.kind.lock().unwrap() = kind;
    }

    fn last_activity_ms(&self) -> u64 {
        self.last_activity.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn rule_violation(&self) -> Option<RuleViolation> {
        *self.violation.lock().unwrap()
    }

    fn report_rule_violation(&self, violation: RuleViolation) {
        *self.violation.lock().unwrap() = Some(violation);
    }

    async fn shutdown(&self, reason: CloseReason) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.close_reasons.lock().unwrap().push(reason);
        if let Some(state) = self.transport.upgrade() {
            state.remove_and_emit_disconnect(self.id);
        }
    }
}

struct MockTransportState {
    connections: StdMutex<Vec<Arc<MockConnection>>>,
    local: StdMutex<Option<NodeAddress>>,
    event_tx: mpsc::Sender<TransportEvent>,
    event_rx: StdMutex<Option<mpsc::Receiver<TransportEvent>>>,
    next_id: AtomicU64,
}

impl MockTransportState {
    fn remove_and_emit_disconnect(&self, id: ConnectionId) {
        let mut connections = self.connections.lock().unwrap();
        if let Some(pos) = connections.iter().position(|c| c.id == id) {
            let conn = connections.remove(pos);
            drop(connections);
            let _ = self.event_tx.try_send(TransportEvent::Disconnected(conn));
        }
    }
}

struct MockTransport {
    state: Arc<MockTransportState>,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        let (event_tx, event_rx) = mpsc::channel(1024);
        Arc::new(Self {
            state: Arc::new(MockTransportState {
                connections: StdMutex::new(Vec::new()),
                local: StdMutex::new(Some(NodeAddress::new("local.onion", 1))),
                event_tx,
                event_rx: StdMutex::new(Some(event_rx)),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    fn new_connection(
        &self,
        address: Option<NodeAddress>,
        direction: Direction,
        kind: PeerKind,
        last_activity_ms: u64,
    ) -> Arc<MockConnection> {
        Arc::new(MockConnection {
            id: ConnectionId(self.state.next_id.fetch_add(1, Ordering::SeqCst)),
            direction,
            address: StdMutex::new(address),
            kind: StdMutex::new(kind),
            last_activity: AtomicU64::new(last_activity_ms),
            closed: AtomicBool::new(false),
            violation: StdMutex::new(None),
            close_reasons: StdMutex::new(Vec::new()),
            transport: Arc::downgrade(&self.state),
        })
    }

    async fn connect(&self, conn: Arc<MockConnection>) {
        self.state.connections.lock().unwrap().push(conn.clone());
        let _ = self
            .state
            .event_tx
            .send(TransportEvent::Connected(conn))
            .await;
    }

    async fn disconnect(&self, conn: &Arc<MockConnection>) {
        conn.closed.store(true, Ordering::SeqCst);
        let mut connections = self.state.connections.lock().unwrap();
        if let Some(pos) = connections.iter().position(|c| c.id == conn.id) {
            connections.remove(pos);
        }
        drop(connections);
        let _ = self
            .state
            .event_tx
            .send(TransportEvent::Disconnected(conn.clone()))
            .await;
    }

    fn open_count(&self) -> usize {
        self.state.connections.lock().unwrap().len()
    }
}

impl Transport for MockTransport {
    fn all_connections(&self) -> Vec<ConnectionRef> {
        self.state
            .connections
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.clone() as ConnectionRef)
            .collect()
    }

    fn local_address(&self) -> Option<NodeAddress> {
        self.state.local.lock().unwrap().clone()
    }

    fn subscribe(&self) -> mpsc::Receiver<TransportEvent> {
        self.state
            .event_rx
            .lock()
            .unwrap()
            .take()
            .expect("transport already subscribed")
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct CountingObserver {
    lost: AtomicUsize,
    regained: AtomicUsize,
    awake: AtomicUsize,
}

impl PeerObserver for CountingObserver {
    fn on_all_connections_lost(&self) {
        self.lost.fetch_add(1, Ordering::SeqCst);
    }

    fn on_new_connection_after_all_connections_lost(&self) {
        self.regained.fetch_add(1, Ordering::SeqCst);
    }

    fn on_awake_from_standby(&self) {
        self.awake.fetch_add(1, Ordering::SeqCst);
    }
}

fn addr(n: usize) -> NodeAddress {
    NodeAddress::new(format!("peer{n}.onion"), 9999)
}

fn peer_batch(range: std::ops::Range<usize>) -> HashSet<Peer> {
    range.map(|n| Peer::new(addr(n))).collect()
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..800 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Let the actor drain everything already enqueued. Each sleep yields to the
/// runtime (and under paused time advances it a few milliseconds).
async fn settle() {
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn spawn_manager(
    transport: &Arc<MockTransport>,
    max_connections: usize,
    seeds: HashSet<NodeAddress>,
    dir: &tempfile::TempDir,
) -> (PeerManager, mpsc::Sender<ClockEvent>) {
    let (clock_tx, clock_rx) = mpsc::channel(16);
    let manager = PeerManager::builder(transport.clone() as Arc<dyn Transport>, dir.path())
        .max_connections(max_connections)
        .seed_addresses(seeds)
        .catalog_seed(7)
        .clock_events(clock_rx)
        .spawn()
        .await;
    (manager, clock_tx)
}

// ============================================================================
// Eviction ladder
// ============================================================================

#[tokio::test(start_paused = true)]
async fn tier_one_evicts_the_oldest_inbound_peer() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let seed_addr = addr(100);
    let (manager, _clock) = spawn_manager(
        &transport,
        10,
        HashSet::from([seed_addr.clone()]),
        &dir,
    )
    .await;

    // 11 connections, activity timestamps 100..=110, oldest is inbound PEER.
    let mut conns = Vec::new();
    for n in 0..6 {
        conns.push(transport.new_connection(
            Some(addr(n)),
            Direction::Inbound,
            PeerKind::Peer,
            100 + n as u64,
        ));
    }
    for n in 6..10 {
        conns.push(transport.new_connection(
            Some(addr(n)),
            Direction::Outbound,
            PeerKind::Peer,
            100 + n as u64,
        ));
    }
    conns.push(transport.new_connection(
        Some(seed_addr),
        Direction::Outbound,
        PeerKind::Peer,
        110,
    ));
    for conn in &conns {
        transport.connect(conn.clone()).await;
    }
    settle().await;

    tokio::time::advance(CHECK_MAX_CONN_DELAY + Duration::from_secs(1)).await;
    wait_until("oldest inbound peer evicted", || conns[0].is_closed()).await;

    assert_eq!(
        conns[0].close_reasons(),
        vec![CloseReason::TooManyConnectionsOpen]
    );
    wait_until("count settles at the limit", || transport.open_count() == 10).await;
    assert!(conns[1..].iter().all(|c| !c.is_closed()), "one victim only");
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn tier_four_takes_one_victim_from_direct_messaging_overload() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let (manager, _clock) = spawn_manager(&transport, 10, HashSet::new(), &dir).await;

    // 29 privileged sessions, one above the absolute limit of 28.
    let conns: Vec<_> = (1..=29)
        .map(|n| {
            transport.new_connection(
                Some(addr(n)),
                Direction::Outbound,
                PeerKind::DirectMsgPeer,
                n as u64,
            )
        })
        .collect();
    for conn in &conns {
        transport.connect(conn.clone()).await;
    }
    settle().await;

    tokio::time::advance(CHECK_MAX_CONN_DELAY + Duration::from_secs(1)).await;
    wait_until("oldest session evicted", || conns[0].is_closed()).await;

    assert_eq!(
        conns[0].close_reasons(),
        vec![CloseReason::TooManyConnectionsOpen]
    );
    // 28 is exactly the absolute limit, so the re-check stops there.
    wait_until("count settles at the absolute limit", || {
        transport.open_count() == 28
    })
    .await;
    assert!(conns[1..].iter().all(|c| !c.is_closed()));
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn direct_messaging_survives_while_lower_tiers_have_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let (manager, _clock) = spawn_manager(&transport, 1, HashSet::new(), &dir).await;

    // Oldest activity on the privileged session; it must still survive
    // because tier 1 has a candidate.
    let direct = transport.new_connection(
        Some(addr(1)),
        Direction::Inbound,
        PeerKind::DirectMsgPeer,
        1,
    );
    let inbound = transport.new_connection(Some(addr(2)), Direction::Inbound, PeerKind::Peer, 999);
    transport.connect(direct.clone()).await;
    transport.connect(inbound.clone()).await;
    settle().await;

    tokio::time::advance(CHECK_MAX_CONN_DELAY + Duration::from_secs(1)).await;
    wait_until("inbound peer evicted", || inbound.is_closed()).await;
    assert!(!direct.is_closed());
    manager.shutdown().await;
}

// ============================================================================
// Reported peers and the flood gate
// ============================================================================

#[tokio::test(start_paused = true)]
async fn oversized_gossip_batch_is_rejected_as_a_rule_violation() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    // max_connections 12 puts the absolute limit at 30 and the gate at 1040.
    let (manager, _clock) = spawn_manager(&transport, 12, HashSet::new(), &dir).await;

    let origin =
        transport.new_connection(Some(addr(5000)), Direction::Inbound, PeerKind::Peer, 1);
    transport.connect(origin.clone()).await;

    manager
        .add_reported_peers(peer_batch(0..MAX_REPORTED + 41), origin.clone() as ConnectionRef)
        .await;

    assert!(manager.reported_peers().await.is_empty(), "no mutation on rejection");
    assert!(manager.persisted_peers().await.is_empty());
    assert_eq!(
        origin.rule_violation(),
        Some(RuleViolation::TooManyReportedPeersSent)
    );
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn gossip_batch_at_the_gate_boundary_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let (manager, _clock) = spawn_manager(&transport, 12, HashSet::new(), &dir).await;

    let origin =
        transport.new_connection(Some(addr(5000)), Direction::Inbound, PeerKind::Peer, 1);
    transport.connect(origin.clone()).await;

    manager
        .add_reported_peers(peer_batch(0..MAX_REPORTED + 40), origin.clone() as ConnectionRef)
        .await;

    // Accepted and purged back to MAX_REPORTED - absolute_limit.
    assert_eq!(manager.reported_peers().await.len(), MAX_REPORTED - 30);
    assert!(origin.rule_violation().is_none());
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn own_address_is_filtered_from_gossip() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let (manager, _clock) = spawn_manager(&transport, 10, HashSet::new(), &dir).await;

    let origin = transport.new_connection(Some(addr(1)), Direction::Inbound, PeerKind::Peer, 1);
    transport.connect(origin.clone()).await;

    let mut batch = peer_batch(10..12);
    batch.insert(Peer::new(NodeAddress::new("local.onion", 1)));
    manager.add_reported_peers(batch, origin.clone() as ConnectionRef).await;

    let reported = manager.reported_peers().await;
    assert_eq!(reported.len(), 2);
    assert!(reported.iter().all(|p| p.address.host != "local.onion"));
    manager.shutdown().await;
}

// ============================================================================
// Fault accounting
// ============================================================================

#[tokio::test(start_paused = true)]
async fn five_connection_faults_evict_a_persisted_peer() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let (manager, _clock) = spawn_manager(&transport, 10, HashSet::new(), &dir).await;

    // Keep one connection open throughout so the node never latches stopped.
    let anchor = transport.new_connection(Some(addr(900)), Direction::Outbound, PeerKind::Peer, 1);
    transport.connect(anchor.clone()).await;

    let flaky = addr(50);
    let origin = anchor.clone() as ConnectionRef;
    let mut batch = peer_batch(60..62);
    batch.insert(Peer::new(flaky.clone()));
    manager.add_reported_peers(batch, origin).await;
    assert!(manager.persisted_peers().await.iter().any(|p| p.address == flaky));

    for round in 1..=5 {
        let conn =
            transport.new_connection(Some(flaky.clone()), Direction::Outbound, PeerKind::Peer, 10);
        transport.connect(conn.clone()).await;
        transport.disconnect(&conn).await;

        let expect_present = round < 5;
        settle().await;
        let persisted = manager.persisted_peers().await;
        assert_eq!(
            persisted.iter().any(|p| p.address == flaky),
            expect_present,
            "round {round}"
        );
    }

    assert!(!manager.reported_peers().await.iter().any(|p| p.address == flaky));
    // The unrelated peers stay persisted.
    assert!(manager.persisted_peers().await.iter().any(|p| p.address == addr(60)));
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rule_violating_disconnect_evicts_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let (manager, _clock) = spawn_manager(&transport, 10, HashSet::new(), &dir).await;

    let anchor = transport.new_connection(Some(addr(900)), Direction::Outbound, PeerKind::Peer, 1);
    transport.connect(anchor.clone()).await;

    let rogue = addr(51);
    let mut batch = HashSet::new();
    batch.insert(Peer::new(rogue.clone()));
    manager
        .add_reported_peers(batch, anchor.clone() as ConnectionRef)
        .await;

    let conn = transport.new_connection(Some(rogue.clone()), Direction::Inbound, PeerKind::Peer, 10);
    conn.report_rule_violation(RuleViolation::TooManyReportedPeersSent);
    transport.connect(conn.clone()).await;
    transport.disconnect(&conn).await;

    settle().await;
    assert!(!manager.persisted_peers().await.iter().any(|p| p.address == rogue));
    manager.shutdown().await;
}

// ============================================================================
// Liveness edges
// ============================================================================

#[tokio::test(start_paused = true)]
async fn all_lost_and_regained_edges_fire_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let (manager, _clock) = spawn_manager(&transport, 10, HashSet::new(), &dir).await;

    let observer = Arc::new(CountingObserver::default());
    manager.add_listener(observer.clone());

    let conns: Vec<_> = (1..=3)
        .map(|n| transport.new_connection(Some(addr(n)), Direction::Outbound, PeerKind::Peer, n as u64))
        .collect();
    for conn in &conns {
        transport.connect(conn.clone()).await;
    }

    transport.disconnect(&conns[0]).await;
    transport.disconnect(&conns[1]).await;
    // Two connections down, one still up: not lost yet.
    settle().await;
    assert_eq!(observer.lost.load(Ordering::SeqCst), 0);

    transport.disconnect(&conns[2]).await;
    wait_until("all-connections-lost fired", || {
        observer.lost.load(Ordering::SeqCst) == 1
    })
    .await;

    let fresh = transport.new_connection(Some(addr(9)), Direction::Outbound, PeerKind::Peer, 50);
    transport.connect(fresh).await;
    wait_until("regained fired", || observer.regained.load(Ordering::SeqCst) == 1).await;

    assert_eq!(observer.lost.load(Ordering::SeqCst), 1);
    assert_eq!(observer.regained.load(Ordering::SeqCst), 1);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn standby_wake_resumes_housekeeping() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let (manager, clock_tx) = spawn_manager(&transport, 10, HashSet::new(), &dir).await;

    let observer = Arc::new(CountingObserver::default());
    manager.add_listener(observer.clone());

    // Lose the only connection: the node latches stopped.
    let only = transport.new_connection(Some(addr(1)), Direction::Outbound, PeerKind::Peer, 1);
    transport.connect(only.clone()).await;
    transport.disconnect(&only).await;
    wait_until("lost fired", || observer.lost.load(Ordering::SeqCst) == 1).await;

    // A short gap is within tolerance and must not wake the node.
    clock_tx
        .send(ClockEvent::MissedTicks { gap: Duration::from_secs(3) })
        .await
        .unwrap();
    settle().await;
    assert_eq!(observer.awake.load(Ordering::SeqCst), 0);

    // A standby-sized gap wakes it.
    clock_tx
        .send(ClockEvent::MissedTicks { gap: Duration::from_secs(600) })
        .await
        .unwrap();
    wait_until("awake fired", || observer.awake.load(Ordering::SeqCst) == 1).await;

    // The next connect arms a fresh sweep; an anonymous connection proves
    // the sweep ran by being reaped after the grace period.
    let anon = transport.new_connection(None, Direction::Inbound, PeerKind::Peer, 10);
    transport.connect(anon.clone()).await;
    settle().await;
    tokio::time::advance(CHECK_MAX_CONN_DELAY + Duration::from_secs(1)).await;
    settle().await;
    tokio::time::advance(REMOVE_ANONYMOUS_PEER_DELAY + Duration::from_secs(1)).await;
    wait_until("anonymous connection reaped", || anon.is_closed()).await;
    assert_eq!(anon.close_reasons(), vec![CloseReason::UnknownPeerAddress]);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn anonymous_connection_that_learns_its_address_survives() {
    let dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let (manager, _clock) = spawn_manager(&transport, 10, HashSet::new(), &dir).await;

    let anon = transport.new_connection(None, Direction::Inbound, PeerKind::Peer, 10);
    transport.connect(anon.clone()).await;
    settle().await;

    // The sweep schedules the reaping check while the address is unknown.
    tokio::time::advance(CHECK_MAX_CONN_DELAY + Duration::from_secs(1)).await;
    settle().await;

    // The address becomes known before the grace period ends.
    *anon.address.lock().unwrap() = Some(addr(77));
    tokio::time::advance(REMOVE_ANONYMOUS_PEER_DELAY + Duration::from_secs(1)).await;
    settle().await;

    assert!(!anon.is_closed());
    manager.shutdown().await;
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn persisted_peers_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    let transport = MockTransport::new();
    let (manager, _clock) = spawn_manager(&transport, 10, HashSet::new(), &dir).await;
    let origin = transport.new_connection(Some(addr(1)), Direction::Inbound, PeerKind::Peer, 1);
    transport.connect(origin.clone()).await;
    manager
        .add_reported_peers(peer_batch(70..75), origin.clone() as ConnectionRef)
        .await;
    let before = manager.persisted_peers().await;
    assert_eq!(before.len(), 5);
    // Shutdown flushes the debounced write.
    manager.shutdown().await;

    let transport2 = MockTransport::new();
    let (manager2, _clock2) = spawn_manager(&transport2, 10, HashSet::new(), &dir).await;
    assert_eq!(manager2.persisted_peers().await, before);
    manager2.shutdown().await;
}
