//! FNV-1a hashing, the xoroshiro128+ PRNG, and monotonic time/sleep
//! wrappers.
//!
//! FNV-1a's wraparound arithmetic is specified by the algorithm, mirroring
//! the `no_sanitize("unsigned-integer-overflow")` annotation the original
//! C implementation carries on its `fnv1a_32`/`fnv1a_64` externs.

use std::time::{Duration, Instant};

use rand_core::{RngCore, SeedableRng};

const FNV1A_32_OFFSET: u32 = 0x811c_9dc5;
const FNV1A_32_PRIME: u32 = 0x0100_0193;
const FNV1A_64_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV1A_64_PRIME: u64 = 0x0000_0100_0000_01b3;

pub fn fnv1a_32(data: &[u8]) -> u32 {
    let mut hash = FNV1A_32_OFFSET;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV1A_32_PRIME);
    }
    hash
}

pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash = FNV1A_64_OFFSET;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV1A_64_PRIME);
    }
    hash
}

/// A `fnv`-crate-compatible [`std::hash::Hasher`] for four-tuple keyed maps
/// (see [`crate::socket::Registry`]): the same FNV-1a algorithm specified
/// above, adapted to the `Hasher` trait so it plugs into `HashMap`'s
/// `BuildHasherDefault`.
pub type FnvBuildHasher = fnv::FnvBuildHasher;

/// xoroshiro128+, seeded at engine `init` from a wall-clock read hashed
/// through FNV-1a. Implements [`RngCore`] so it composes with the rest of
/// the `rand` ecosystem (uniform distributions, `fill_bytes`, etc.) even
/// though it is not shipped as a standalone crate in this build.
pub struct Xoroshiro128Plus {
    state: [u64; 2],
}

impl Xoroshiro128Plus {
    /// Seed from the current wall clock, hashed via FNV-1a so a
    /// coarse-grained clock still spreads bits across the full state.
    pub fn from_wall_clock() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let bytes = nanos.to_le_bytes();
        let seed_lo = fnv1a_64(&bytes);
        let seed_hi = fnv1a_64(&bytes[..8]);
        Self::seed_from_u64(seed_lo ^ seed_hi.rotate_left(32))
    }

    fn next_u64_raw(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(55) ^ s1 ^ (s1 << 14);
        self.state[1] = s1.rotate_left(36);

        result
    }

    /// A uniform value in `[0, bound)`, rejecting draws in the low band
    /// that would otherwise bias the result modulo `bound` (Lemire's
    /// rejection sampling, as specified).
    pub fn uniform_u32(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        let threshold = bound.wrapping_neg() % bound;
        loop {
            let v = self.next_u32();
            if v >= threshold {
                return v % bound;
            }
        }
    }

    pub fn uniform_u64(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        let threshold = bound.wrapping_neg() % bound;
        loop {
            let v = self.next_u64();
            if v >= threshold {
                return v % bound;
            }
        }
    }
}

impl SeedableRng for Xoroshiro128Plus {
    type Seed = [u8; 16];

    fn from_seed(seed: Self::Seed) -> Self {
        let lo = u64::from_le_bytes(seed[0..8].try_into().unwrap());
        let hi = u64::from_le_bytes(seed[8..16].try_into().unwrap());
        // The all-zero state is invalid for xoroshiro; perturb it the same
        // way the reference implementation's seeding guidance recommends.
        let state = if lo == 0 && hi == 0 {
            [0x9e37_79b9_7f4a_7c15, 0xbf58_476d_1ce4_e5b9]
        } else {
            [lo, hi]
        };
        Self { state }
    }
}

impl RngCore for Xoroshiro128Plus {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64_raw() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_raw()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut chunks = dest.chunks_exact_mut(8);
        for chunk in &mut chunks {
            chunk.copy_from_slice(&self.next_u64().to_le_bytes());
        }
        let rem = chunks.into_remainder();
        if !rem.is_empty() {
            let tail = self.next_u64().to_le_bytes();
            rem.copy_from_slice(&tail[..rem.len()]);
        }
    }
}

/// Nanoseconds since an unspecified monotonic epoch.
pub fn now_ns() -> u64 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = *START.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}

/// Block the calling thread for `ns` nanoseconds.
pub fn nanosleep_ns(ns: u64) {
    std::thread::sleep(Duration::from_nanos(ns));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_known_vectors() {
        // FNV-1a 32-bit of the empty string is the offset basis.
        assert_eq!(fnv1a_32(b""), FNV1A_32_OFFSET);
        assert_eq!(fnv1a_64(b""), FNV1A_64_OFFSET);
        // FNV-1a 32-bit of "a" per the reference test vectors.
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
    }

    #[test]
    fn uniform_draws_stay_in_bounds() {
        let mut rng = Xoroshiro128Plus::seed_from_u64(0x1234_5678_9abc_def0);
        for _ in 0..10_000 {
            let v = rng.uniform_u32(37);
            assert!(v < 37);
            let v = rng.uniform_u64(1_000_003);
            assert!(v < 1_000_003);
        }
    }

    #[test]
    fn rng_is_deterministic_given_a_seed() {
        let mut a = Xoroshiro128Plus::seed_from_u64(42);
        let mut b = Xoroshiro128Plus::seed_from_u64(42);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn monotonic_clock_does_not_go_backwards() {
        let a = now_ns();
        let b = now_ns();
        assert!(b >= a);
    }
}
