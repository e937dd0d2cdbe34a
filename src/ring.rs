//! Ring I/O backend: the boundary between this stack and whatever actually
//! moves frames on and off the wire.
//!
//! The teacher has no analogue (its NIC path is the kernel's own driver
//! stack); this trait is grounded on `yihau-solana/xdp/src/umem.rs`'s
//! `Umem`/`Frame` split — a fixed-size frame arena with explicit
//! reserve/release, mapped once and reused for the life of the engine — and
//! on the public API surface in `original_source/warpcore.h`
//! (`w_kick_tx`/`w_kick_rx`/`w_poll`) for the operation names. `LoopbackBackend`
//! is the in-process backend the test harness drives; `backend-mmap` adds a
//! real anonymous-mmap-backed arena for anyone wiring this to an actual
//! packet-I/O framework.

use std::collections::VecDeque;

/// A source/sink for raw Ethernet frames. An engine polls this once per
/// tick; frames handed to `nic_rx` are owned copies the engine parses and
/// frees on its own schedule, and `nic_tx` takes ownership of a frame ready
/// to leave the host.
pub trait RingBackend {
    /// Check for newly arrived frames and newly free transmit slots. Mirrors
    /// `w_poll`'s role of driving the underlying I/O framework forward.
    fn poll(&mut self);

    /// Drain one received frame, if any is queued.
    fn nic_rx(&mut self) -> Option<Vec<u8>>;

    /// Hand a frame to the backend for transmission.
    fn nic_tx(&mut self, frame: Vec<u8>);

    /// Flush anything buffered by `nic_tx` out to the wire. Mirrors
    /// `w_kick_tx`.
    fn kick_tx(&mut self);
}

/// An in-process backend that loops transmitted frames directly back into
/// the receive queue, used by the test harness to exercise two engines
/// against each other without a real NIC.
#[derive(Default)]
pub struct LoopbackBackend {
    rx_queue: VecDeque<Vec<u8>>,
    tx_pending: VecDeque<Vec<u8>>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a frame as if it had just arrived from the wire, e.g. one
    /// produced by a peer `LoopbackBackend`'s `kick_tx`.
    pub fn inject(&mut self, frame: Vec<u8>) {
        self.rx_queue.push_back(frame);
    }

    /// Drain frames queued for transmission without delivering them
    /// anywhere, so a test can hand them to a peer's `inject`.
    pub fn drain_tx(&mut self) -> Vec<Vec<u8>> {
        self.tx_pending.drain(..).collect()
    }
}

impl RingBackend for LoopbackBackend {
    fn poll(&mut self) {}

    fn nic_rx(&mut self) -> Option<Vec<u8>> {
        self.rx_queue.pop_front()
    }

    fn nic_tx(&mut self, frame: Vec<u8>) {
        self.tx_pending.push_back(frame);
    }

    fn kick_tx(&mut self) {}
}

#[cfg(feature = "backend-mmap")]
pub mod mmap {
    //! A frame arena backed by a single anonymous `mmap` region, following
    //! `yihau-solana/xdp/src/umem.rs::PageAlignedMemory`'s allocate-once,
    //! reserve/release-by-index shape, but mapped through `memmap2` rather
    //! than raw `libc::mmap` calls. [`MmapRingBackend`] wires the arena into
    //! [`super::RingBackend`] for a caller with its own packet-I/O framework
    //! feeding frames in and out of this process.

    use std::collections::VecDeque;

    use memmap2::MmapMut;

    use super::RingBackend;

    pub struct MmapArena {
        map: MmapMut,
        frame_size: usize,
        free_slots: Vec<u32>,
    }

    impl MmapArena {
        pub fn alloc(frame_size: usize, frame_count: usize) -> std::io::Result<Self> {
            let map = MmapMut::map_anon(frame_size * frame_count)?;
            Ok(Self {
                map,
                frame_size,
                free_slots: (0..frame_count as u32).collect(),
            })
        }

        pub fn frame_size(&self) -> usize {
            self.frame_size
        }

        pub fn capacity(&self) -> usize {
            self.map.len() / self.frame_size
        }

        pub fn reserve(&mut self) -> Option<u32> {
            self.free_slots.pop()
        }

        pub fn release(&mut self, slot: u32) {
            self.free_slots.push(slot);
        }

        pub fn frame(&self, slot: u32) -> &[u8] {
            let off = slot as usize * self.frame_size;
            &self.map[off..off + self.frame_size]
        }

        pub fn frame_mut(&mut self, slot: u32) -> &mut [u8] {
            let off = slot as usize * self.frame_size;
            &mut self.map[off..off + self.frame_size]
        }
    }

    /// A [`RingBackend`] over an [`MmapArena`]: `nic_tx` copies the frame
    /// into a reserved slot and queues it for `kick_tx` to hand off,
    /// `nic_rx` drains frames a caller has staged via [`Self::inject_rx`].
    /// This backend still moves bytes through an owned `Vec<u8>` at the
    /// `RingBackend` boundary the same way `LoopbackBackend` does — the
    /// arena's value is giving a real packet-I/O framework a stable,
    /// page-aligned region to DMA into/out of beneath this layer, not
    /// avoiding the copy at this trait's edge.
    pub struct MmapRingBackend {
        arena: MmapArena,
        tx_ready: VecDeque<u32>,
        rx_queue: VecDeque<Vec<u8>>,
    }

    impl MmapRingBackend {
        pub fn new(frame_size: usize, frame_count: usize) -> std::io::Result<Self> {
            Ok(Self {
                arena: MmapArena::alloc(frame_size, frame_count)?,
                tx_ready: VecDeque::new(),
                rx_queue: VecDeque::new(),
            })
        }

        /// Reserve a slot and copy `frame` into it, for a caller driving the
        /// arena directly rather than through `nic_tx`. Returns the slot
        /// index, or `None` if the arena is exhausted or the frame is too
        /// large for one slot.
        pub fn take_tx_slot(&mut self, frame: &[u8]) -> Option<u32> {
            if frame.len() > self.arena.frame_size() {
                return None;
            }
            let slot = self.arena.reserve()?;
            self.arena.frame_mut(slot)[..frame.len()].copy_from_slice(frame);
            Some(slot)
        }

        pub fn frame(&self, slot: u32) -> &[u8] {
            self.arena.frame(slot)
        }

        pub fn release_tx_slot(&mut self, slot: u32) {
            self.arena.release(slot);
        }

        /// Stage a frame as if it had just arrived from the wire, for a
        /// caller bridging its packet-I/O framework's receive side into
        /// this backend.
        pub fn inject_rx(&mut self, frame: Vec<u8>) {
            self.rx_queue.push_back(frame);
        }
    }

    impl RingBackend for MmapRingBackend {
        fn poll(&mut self) {}

        fn nic_rx(&mut self) -> Option<Vec<u8>> {
            self.rx_queue.pop_front()
        }

        fn nic_tx(&mut self, frame: Vec<u8>) {
            if let Some(slot) = self.take_tx_slot(&frame) {
                self.tx_ready.push_back(slot);
            } else {
                log::warn!("ring: mmap arena exhausted or frame oversized, dropping tx frame");
            }
        }

        fn kick_tx(&mut self) {
            while let Some(slot) = self.tx_ready.pop_front() {
                self.arena.release(slot);
            }
        }
    }

    #[cfg(test)]
    mod mmap_tests {
        use super::*;

        #[test]
        fn take_frame_release_round_trips_through_the_arena() {
            let mut backend = MmapRingBackend::new(64, 4).unwrap();
            let slot = backend.take_tx_slot(&[1, 2, 3]).unwrap();
            assert_eq!(&backend.frame(slot)[..3], &[1, 2, 3]);
            backend.release_tx_slot(slot);
        }

        #[test]
        fn nic_tx_then_kick_tx_frees_the_slot_back_to_the_arena() {
            let mut backend = MmapRingBackend::new(64, 1).unwrap();
            backend.nic_tx(vec![0xab; 32]);
            assert!(backend.take_tx_slot(&[0]).is_none(), "arena should be exhausted");
            backend.kick_tx();
            assert!(backend.take_tx_slot(&[0]).is_some(), "kick_tx should have released the slot");
        }

        #[test]
        fn injected_frames_drain_through_nic_rx() {
            let mut backend = MmapRingBackend::new(64, 4).unwrap();
            backend.inject_rx(vec![9, 9, 9]);
            assert_eq!(backend.nic_rx(), Some(vec![9, 9, 9]));
            assert_eq!(backend.nic_rx(), None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_round_trips_a_frame_between_two_backends() {
        let mut a = LoopbackBackend::new();
        let mut b = LoopbackBackend::new();

        a.nic_tx(vec![1, 2, 3]);
        a.kick_tx();
        for frame in a.drain_tx() {
            b.inject(frame);
        }

        assert_eq!(b.nic_rx(), Some(vec![1, 2, 3]));
        assert_eq!(b.nic_rx(), None);
    }
}
