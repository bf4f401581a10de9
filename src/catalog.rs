//! Bounded peer catalogs with aging, random purge, and fault accounting.
//!
//! The catalog owns the two in-memory peer sets:
//!
//! - **reported**: addresses recently advertised by gossip peers. Bounded
//!   by [`MAX_REPORTED`] less the caller's absolute connection limit.
//! - **persisted**: the durable subset remembered across restarts. Bounded
//!   by [`MAX_PERSISTED`].
//!
//! Both sets age out records older than [`MAX_AGE`] and shrink by removing
//! *uniformly random* elements when oversized. Random, not LRU: an adversary
//! who can influence activity timestamps must not be able to choose which
//! peers survive a purge. The PRNG is owned per catalog and seedable so
//! tests inject a deterministic sequence.
//!
//! All mutation goes through this type; the manager actor is its only
//! caller, so no internal locking is needed.

use std::collections::HashSet;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::peer::{NodeAddress, Peer};

/// Capacity of the reported set before headroom subtraction.
pub const MAX_REPORTED: usize = 1000;

/// Capacity of the persisted set.
pub const MAX_PERSISTED: usize = 500;

/// Records older than this are purged from both sets.
pub const MAX_AGE: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Default number of failed connection attempts after which a persisted
/// peer is evicted.
pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;

/// Extra allowance in the flood gate for a single gossip batch. Senders
/// legitimately report their own connections too; the gate is simply raised
/// by this margin, the batch itself is never adjusted.
const BATCH_HEADROOM: usize = 10;

pub struct PeerCatalog {
    reported: HashSet<Peer>,
    persisted: HashSet<Peer>,
    rng: StdRng,
    max_failed_attempts: u32,
}

impl PeerCatalog {
    /// Create a catalog, pre-populated with the persisted set loaded from
    /// storage. The purge PRNG is seeded from entropy.
    pub fn new(persisted: HashSet<Peer>, max_failed_attempts: u32) -> Self {
        Self::with_rng(persisted, max_failed_attempts, StdRng::from_entropy())
    }

    /// Create a catalog with a deterministic purge sequence.
    pub fn with_seed(
        persisted: HashSet<Peer>,
        max_failed_attempts: u32,
        seed: u64,
    ) -> Self {
        Self::with_rng(persisted, max_failed_attempts, StdRng::seed_from_u64(seed))
    }

    fn with_rng(persisted: HashSet<Peer>, max_failed_attempts: u32, rng: StdRng) -> Self {
        Self { reported: HashSet::new(), persisted, rng, max_failed_attempts }
    }

    pub fn reported(&self) -> &HashSet<Peer> {
        &self.reported
    }

    pub fn persisted(&self) -> &HashSet<Peer> {
        &self.persisted
    }

    /// Union a gossip batch into both sets, purging each back under its
    /// bound afterwards.
    ///
    /// The flood gate is checked against the raw batch size before any
    /// mutation: a batch larger than `MAX_REPORTED + absolute_limit +
    /// headroom` leaves the catalog untouched and returns `false`, and the
    /// caller reports the rule violation upstream. Records matching `local`
    /// never enter either set.
    pub fn add_reported(
        &mut self,
        batch: HashSet<Peer>,
        absolute_limit: usize,
        local: Option<&NodeAddress>,
    ) -> bool {
        if batch.len() > MAX_REPORTED + absolute_limit + BATCH_HEADROOM {
            return false;
        }

        let batch: Vec<Peer> = match local {
            Some(local) => batch.into_iter().filter(|p| p.address != *local).collect(),
            None => batch.into_iter().collect(),
        };

        self.reported.extend(batch.iter().cloned());
        self.purge_reported_if_exceeds(absolute_limit);

        self.persisted.extend(batch);
        self.purge_persisted_if_exceeds();
        true
    }

    /// Remove a reported peer by address. Idempotent.
    pub fn remove_reported(&mut self, address: &NodeAddress) -> bool {
        self.reported.take(&probe(address)).is_some()
    }

    /// Remove a persisted peer by address. Idempotent.
    pub fn remove_persisted(&mut self, address: &NodeAddress) -> bool {
        self.persisted.take(&probe(address)).is_some()
    }

    /// Drop reported records older than [`MAX_AGE`].
    pub fn purge_aged_reported(&mut self, now_ms: u64) {
        let max_age = MAX_AGE.as_millis() as u64;
        let before = self.reported.len();
        self.reported.retain(|p| p.age_ms(now_ms) <= max_age);
        let removed = before - self.reported.len();
        if removed > 0 {
            debug!(removed, "purged aged reported peers");
        }
    }

    /// Drop persisted records older than [`MAX_AGE`]. Returns whether the
    /// set changed, so the caller can queue a save.
    pub fn purge_aged_persisted(&mut self, now_ms: u64) -> bool {
        let max_age = MAX_AGE.as_millis() as u64;
        let before = self.persisted.len();
        self.persisted.retain(|p| p.age_ms(now_ms) <= max_age);
        let removed = before - self.persisted.len();
        if removed > 0 {
            debug!(removed, "purged aged persisted peers");
        }
        removed > 0
    }

    /// Account a failed connection attempt against `address`.
    ///
    /// The address always leaves the reported set. If it is persisted, its
    /// failure count is bumped; once the count reaches the configured
    /// threshold, or the connection carried a rule violation, the peer is
    /// evicted from the persisted set. The persisted set is age-purged as a
    /// side sweep only when the fault did not call for eviction; a rule
    /// violation suppresses the sweep even if the address was never
    /// persisted. Returns whether the persisted set changed.
    pub fn register_fault(
        &mut self,
        address: &NodeAddress,
        had_rule_violation: bool,
        now_ms: u64,
    ) -> bool {
        self.remove_reported(address);

        let mut evict = had_rule_violation;
        let mut changed = false;
        if let Some(mut peer) = self.persisted.take(&probe(address)) {
            peer.increase_failed_attempts();
            if peer.failed_attempts() >= self.max_failed_attempts {
                evict = true;
            }
            if evict {
                debug!(
                    peer = %address,
                    attempts = peer.failed_attempts(),
                    had_rule_violation,
                    "evicting persisted peer"
                );
                changed = true;
            } else {
                let attempts = peer.failed_attempts();
                self.persisted.insert(peer);
                trace!(peer = %address, attempts, "recorded failed attempt");
            }
        }

        if evict {
            changed
        } else {
            self.purge_aged_persisted(now_ms)
        }
    }

    fn purge_reported_if_exceeds(&mut self, absolute_limit: usize) {
        let limit = MAX_REPORTED.saturating_sub(absolute_limit);
        let size = self.reported.len();
        if size > limit {
            debug!(size, limit, "reported set oversized, removing random peers");
            Self::purge_random(&mut self.reported, limit, &mut self.rng);
        } else {
            trace!(size, limit, "no reported purge needed");
        }
    }

    fn purge_persisted_if_exceeds(&mut self) {
        let size = self.persisted.len();
        if size > MAX_PERSISTED {
            debug!(size, limit = MAX_PERSISTED, "persisted set oversized, removing random peers");
            Self::purge_random(&mut self.persisted, MAX_PERSISTED, &mut self.rng);
        } else {
            trace!(size, limit = MAX_PERSISTED, "no persisted purge needed");
        }
    }

    /// Remove uniformly random elements until `set.len() == limit`.
    /// Activity or age must play no part in the choice.
    fn purge_random(set: &mut HashSet<Peer>, limit: usize, rng: &mut StdRng) {
        let mut pool: Vec<Peer> = set.iter().cloned().collect();
        while set.len() > limit {
            let victim = pool.swap_remove(rng.gen_range(0..pool.len()));
            set.remove(&victim);
        }
    }
}

fn probe(address: &NodeAddress) -> Peer {
    Peer::with_first_seen(address.clone(), 0)
}
