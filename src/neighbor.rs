//! ARP (IPv4) / Neighbor Discovery (IPv6) resolution cache.
//!
//! State machine, timers, and eviction priority are adapted from the
//! teacher's `drivers/src/net/neighbor.rs`, with the global `IrqMutex`-
//! guarded singleton replaced by a plain struct owned by one [`crate::engine::Engine`]
//! (this stack is single-threaded per engine) and the teacher's kernel tick
//! source replaced by [`crate::util::now_ns`].

use std::collections::HashMap;

use crate::buffer::Buffer;
use crate::pool::BufferPool;
use crate::queue::BufferQueue;
use crate::types::{Addr, MacAddr};

pub const MAX_ENTRIES: usize = 256;
pub const MAX_PENDING_PKTS: usize = 4;
pub const MAX_RETRIES: u8 = 3;
pub const REACHABLE_TIME_NS: u64 = 30_000_000_000;
pub const STALE_PROBE_TIME_NS: u64 = 5_000_000_000;
pub const RETRANSMIT_TIME_NS: u64 = 1_000_000_000;

#[derive(Debug)]
enum State {
    Incomplete { retries: u8, pending: BufferQueue },
    Reachable { mac: MacAddr, confirmed_at: u64 },
    Stale { mac: MacAddr, last_used: u64 },
    Probe { mac: MacAddr, retries: u8 },
}

struct Entry {
    state: State,
    last_touched: u64,
}

/// What the caller must do after a cache mutation: the cache itself never
/// touches the wire.
pub enum NeighborAction {
    /// Emit an ARP request / Neighbor Solicitation for `target`.
    Solicit { target: Addr },
    /// Transmit `pending` now that `mac` has been confirmed.
    Flush { mac: MacAddr, pending: BufferQueue },
    None,
}

pub enum ResolveOutcome {
    /// Already reachable — `buf` is handed back so the caller can transmit
    /// it immediately; the cache never takes ownership of a buffer it does
    /// not need to queue.
    Resolved(MacAddr, Buffer),
    /// Reachable under a stale entry: `buf` can still be transmitted with
    /// `mac` right away (RFC 4861 NUD keeps using a stale neighbor while
    /// reprobing), but the caller must also emit a solicitation for
    /// `reprobe_target`.
    ResolvedStale {
        mac: MacAddr,
        buf: Buffer,
        reprobe_target: Addr,
    },
    /// Not yet resolved; `buf` was queued and `action` (a solicitation)
    /// should be emitted, unless the pending queue was already full, in
    /// which case `buf` is handed back for the caller to drop/report.
    Queued { action: NeighborAction },
    Full(Buffer),
}

pub struct NeighborCache {
    entries: HashMap<Addr, Entry>,
}

impl NeighborCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn lookup(&self, addr: Addr) -> Option<MacAddr> {
        match self.entries.get(&addr)?.state {
            State::Reachable { mac, .. } | State::Stale { mac, .. } | State::Probe { mac, .. } => {
                Some(mac)
            }
            State::Incomplete { .. } => None,
        }
    }

    /// Record a MAC learned opportunistically (e.g. from the source address
    /// of any received frame) or as the outcome of a solicited exchange.
    /// Returns the buffers to flush, if any were pending on this address.
    pub fn insert_or_update(&mut self, addr: Addr, mac: MacAddr, now: u64) -> NeighborAction {
        let entry = self.entries.entry(addr).or_insert_with(|| Entry {
            state: State::Incomplete {
                retries: 0,
                pending: BufferQueue::new(),
            },
            last_touched: now,
        });
        entry.last_touched = now;

        let pending = match &mut entry.state {
            State::Incomplete { pending, .. } => Some(std::mem::take(pending)),
            _ => None,
        };
        entry.state = State::Reachable {
            mac,
            confirmed_at: now,
        };

        match pending {
            Some(pending) if !pending.is_empty() => {
                log::debug!("neighbor: flushing {} pending buffers for {}", pending.len(), addr);
                NeighborAction::Flush { mac, pending }
            }
            _ => NeighborAction::None,
        }
    }

    /// Resolve `addr` to a MAC, queuing `buf` and requesting solicitation if
    /// necessary. Implements idempotence (invariant 7): a `Reachable` hit
    /// never triggers a solicitation.
    pub fn resolve(&mut self, addr: Addr, buf: Buffer, now: u64, pool: &mut BufferPool) -> ResolveOutcome {
        if self.entries.len() >= MAX_ENTRIES && !self.entries.contains_key(&addr) {
            self.evict_one(pool);
        }

        let entry = self.entries.entry(addr).or_insert_with(|| Entry {
            state: State::Incomplete {
                retries: 0,
                pending: BufferQueue::new(),
            },
            last_touched: now,
        });

        match &mut entry.state {
            State::Reachable { mac, .. } => {
                let mac = *mac;
                entry.last_touched = now;
                ResolveOutcome::Resolved(mac, buf)
            }
            State::Stale { mac, last_used } => {
                let mac = *mac;
                *last_used = now;
                entry.state = State::Probe { mac, retries: 0 };
                log::debug!("neighbor: {} stale, re-probing while still usable", addr);
                ResolveOutcome::ResolvedStale {
                    mac,
                    buf,
                    reprobe_target: addr,
                }
            }
            State::Probe { mac, .. } => {
                // Still usable while reprobing.
                let mac = *mac;
                ResolveOutcome::Resolved(mac, buf)
            }
            State::Incomplete { retries, pending } => {
                if pending.len() >= MAX_PENDING_PKTS {
                    log::debug!("neighbor: pending queue full for {}, dropping", addr);
                    return ResolveOutcome::Full(buf);
                }
                pending.push_back(buf);
                let emit_solicit = *retries == 0;
                *retries += 1;
                entry.last_touched = now;
                ResolveOutcome::Queued {
                    action: if emit_solicit {
                        NeighborAction::Solicit { target: addr }
                    } else {
                        NeighborAction::None
                    },
                }
            }
        }
    }

    /// Periodic maintenance: age `Reachable` entries into `Stale` once idle
    /// past `REACHABLE_TIME_NS`, and drop `Incomplete`/`Probe` entries that
    /// exhausted their retry budget.
    pub fn tick(&mut self, now: u64, pool: &mut BufferPool) {
        let mut drained: Vec<BufferQueue> = Vec::new();
        self.entries.retain(|_, entry| {
            match &mut entry.state {
                State::Reachable { mac, confirmed_at } => {
                    if now.saturating_sub(*confirmed_at) > REACHABLE_TIME_NS {
                        entry.state = State::Stale {
                            mac: *mac,
                            last_used: now,
                        };
                    }
                    true
                }
                State::Stale { last_used, .. } => {
                    now.saturating_sub(*last_used) <= STALE_PROBE_TIME_NS * 8
                }
                State::Probe { retries, .. } => *retries < MAX_RETRIES,
                State::Incomplete { retries, pending } => {
                    let alive = *retries < MAX_RETRIES;
                    if !alive {
                        drained.push(std::mem::take(pending));
                    }
                    alive
                }
            }
        });
        for mut pending in drained {
            while let Some(buf) = pending.pop_front() {
                buf.free(pool);
            }
        }
    }

    fn evict_one(&mut self, pool: &mut BufferPool) {
        fn priority(state: &State) -> u8 {
            match state {
                State::Incomplete { .. } => 1,
                State::Reachable { .. } => 2,
                State::Stale { .. } => 3,
                State::Probe { .. } => 4,
            }
        }
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (std::cmp::Reverse(priority(&e.state)), e.last_touched))
            .map(|(addr, _)| *addr);
        if let Some(addr) = victim {
            log::debug!("neighbor: evicting {} (cache at capacity)", addr);
            if let Some(entry) = self.entries.remove(&addr) {
                if let State::Incomplete { mut pending, .. } = entry.state {
                    while let Some(buf) = pending.pop_front() {
                        buf.free(pool);
                    }
                }
            }
        }
    }
}

impl Default for NeighborCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferPool;
    use crate::types::Ipv4Addr;

    fn addr(b: [u8; 4]) -> Addr {
        Addr::V4(Ipv4Addr::from_bytes(b))
    }

    #[test]
    fn first_resolve_queues_and_solicits() {
        let mut cache = NeighborCache::new();
        let mut pool = BufferPool::new(4, 256);
        let target = addr([10, 0, 0, 5]);
        let buf = Buffer::alloc(&mut pool).unwrap();
        match cache.resolve(target, buf, 0, &mut pool) {
            ResolveOutcome::Queued {
                action: NeighborAction::Solicit { target: t },
            } => assert_eq!(t, target),
            _ => panic!("expected a queued solicitation"),
        }
    }

    #[test]
    fn reply_flushes_pending_queue() {
        let mut cache = NeighborCache::new();
        let mut pool = BufferPool::new(4, 256);
        let target = addr([10, 0, 0, 5]);
        let buf = Buffer::alloc(&mut pool).unwrap();
        cache.resolve(target, buf, 0, &mut pool);
        let mac = MacAddr([2, 0, 0, 0, 0, 1]);
        match cache.insert_or_update(target, mac, 1) {
            NeighborAction::Flush { pending, .. } => assert_eq!(pending.len(), 1),
            _ => panic!("expected a flush with one pending buffer"),
        }
        assert_eq!(cache.lookup(target), Some(mac));
    }

    #[test]
    fn reachable_resolve_is_idempotent() {
        let mut cache = NeighborCache::new();
        let mut pool = BufferPool::new(4, 256);
        let target = addr([10, 0, 0, 5]);
        let mac = MacAddr([2, 0, 0, 0, 0, 1]);
        cache.insert_or_update(target, mac, 0);
        for i in 0..5 {
            let buf = Buffer::alloc(&mut pool).unwrap();
            match cache.resolve(target, buf, i, &mut pool) {
                ResolveOutcome::Resolved(m, buf) => {
                    assert_eq!(m, mac);
                    buf.free(&mut pool);
                }
                _ => panic!("expected resolved, no further solicitation"),
            }
        }
    }

    #[test]
    fn pending_queue_caps_and_returns_overflow() {
        let mut cache = NeighborCache::new();
        let mut pool = BufferPool::new(MAX_PENDING_PKTS + 2, 256);
        let target = addr([10, 0, 0, 5]);
        for _ in 0..MAX_PENDING_PKTS {
            let buf = Buffer::alloc(&mut pool).unwrap();
            cache.resolve(target, buf, 0, &mut pool);
        }
        let overflow = Buffer::alloc(&mut pool).unwrap();
        assert!(matches!(cache.resolve(target, overflow, 0, &mut pool), ResolveOutcome::Full(_)));
    }

    #[test]
    fn idle_reachable_entry_goes_stale_then_expires_on_reprobe_timeout() {
        let mut cache = NeighborCache::new();
        let mut pool = BufferPool::new(4, 256);
        let mac = MacAddr([2, 0, 0, 0, 0, 1]);
        let target = addr([10, 0, 0, 5]);
        cache.insert_or_update(target, mac, 0);
        cache.tick(REACHABLE_TIME_NS + 1, &mut pool);
        assert_eq!(cache.lookup(target), Some(mac));
    }

    #[test]
    fn stale_entry_transmits_immediately_while_reprobing() {
        let mut cache = NeighborCache::new();
        let mut pool = BufferPool::new(4, 256);
        let mac = MacAddr([2, 0, 0, 0, 0, 1]);
        let target = addr([10, 0, 0, 5]);
        cache.insert_or_update(target, mac, 0);
        cache.tick(REACHABLE_TIME_NS + 1, &mut pool);

        let buf = Buffer::alloc(&mut pool).unwrap();
        match cache.resolve(target, buf, REACHABLE_TIME_NS + 1, &mut pool) {
            ResolveOutcome::ResolvedStale { mac: m, buf, reprobe_target } => {
                assert_eq!(m, mac);
                assert_eq!(reprobe_target, target);
                buf.free(&mut pool);
            }
            _ => panic!("expected a stale resolve carrying the buffer through"),
        }
    }

    #[test]
    fn tick_frees_pending_buffers_on_a_timed_out_incomplete_entry() {
        let mut cache = NeighborCache::new();
        let mut pool = BufferPool::new(4, 256);
        let target = addr([10, 0, 0, 5]);

        // Each unresolved `resolve` call bumps `retries`; drive it past
        // `MAX_RETRIES` the way repeated retransmit timeouts would, leaving
        // one buffer queued on the entry.
        for _ in 0..MAX_RETRIES {
            let buf = Buffer::alloc(&mut pool).unwrap();
            cache.resolve(target, buf, 0, &mut pool);
        }
        assert_eq!(pool.available(), 1);

        cache.tick(RETRANSMIT_TIME_NS, &mut pool);

        assert_eq!(cache.lookup(target), None);
        assert_eq!(pool.available(), 4, "the pending buffers' slots must return to the pool on timeout");
    }

    #[test]
    fn evict_one_frees_pending_buffers_on_the_evicted_entry() {
        let mut cache = NeighborCache::new();
        let mut pool = BufferPool::new(MAX_ENTRIES + 2, 256);
        for i in 0..MAX_ENTRIES as u32 {
            let target = addr([10, 0, (i >> 8) as u8, (i & 0xff) as u8]);
            let buf = Buffer::alloc(&mut pool).unwrap();
            cache.resolve(target, buf, 0, &mut pool);
        }
        assert_eq!(cache.len(), MAX_ENTRIES);
        let available_before_evict = pool.available();

        // One more distinct address forces `evict_one` to make room, which
        // must free the evicted `Incomplete` entry's queued buffer too.
        let new_target = addr([172, 16, 0, 1]);
        let buf = Buffer::alloc(&mut pool).unwrap();
        cache.resolve(new_target, buf, 0, &mut pool);

        assert_eq!(cache.len(), MAX_ENTRIES);
        // The newly-allocated buffer consumed one slot, but the evicted
        // entry's pending buffer returned one: net available is unchanged.
        assert_eq!(pool.available(), available_before_evict);
    }
}
