//! Four-tuple socket registry: bind/connect/close and per-socket receive
//! queues.
//!
//! `SocketOptions`' validated buffer-size ranges are adapted from
//! `drivers/src/net/socket.rs::SocketOptions`; the bounded receive queue
//! follows the same file's `BoundedQueue<T>`. Keying is by the full
//! four-tuple (this spec's registry, unlike the teacher's per-local-port
//! `UdpDemuxTable`) via an FNV-1a-hashed `HashMap`, matching §4.H.

use std::collections::HashMap;

use crate::error::{Result, WarpcoreError};
use crate::queue::BufferQueue;
use crate::types::{FourTuple, Port, SockAddr};
use crate::util::FnvBuildHasher;

#[derive(Clone, Copy)]
pub struct SocketOptions {
    pub recv_buf_size: usize,
    pub send_buf_size: usize,
}

impl SocketOptions {
    pub const RECV_BUF_DEFAULT: usize = 16_384;
    pub const SEND_BUF_DEFAULT: usize = 16_384;
    pub const RECV_BUF_MIN: usize = 256;
    pub const RECV_BUF_MAX: usize = 262_144;
    pub const SEND_BUF_MIN: usize = 256;
    pub const SEND_BUF_MAX: usize = 262_144;

    pub const fn new() -> Self {
        Self {
            recv_buf_size: Self::RECV_BUF_DEFAULT,
            send_buf_size: Self::SEND_BUF_DEFAULT,
        }
    }

    pub fn validate(self) -> Result<Self> {
        if !(Self::RECV_BUF_MIN..=Self::RECV_BUF_MAX).contains(&self.recv_buf_size) {
            return Err(WarpcoreError::InvalidArgument);
        }
        if !(Self::SEND_BUF_MIN..=Self::SEND_BUF_MAX).contains(&self.send_buf_size) {
            return Err(WarpcoreError::InvalidArgument);
        }
        Ok(self)
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// An identifier for a registered socket, stable across `connect` (which
/// mutates the socket's tuple but not its identity).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SocketId(u32);

/// One open flow. `tuple` starts with a wildcard remote and is narrowed by
/// `connect`. `header_template` is reserved for the precomputed
/// Ethernet+IP+UDP prefix optimization described in the design notes; the
/// engine patches length/checksum fields per packet rather than rebuilding
/// the whole prefix.
pub struct Socket {
    pub id: SocketId,
    pub tuple: FourTuple,
    pub options: SocketOptions,
    recv_queue: BufferQueue,
}

impl Socket {
    pub fn recv_queue_len(&self) -> usize {
        self.recv_queue.len()
    }
}

pub struct Registry {
    sockets: HashMap<FourTuple, SocketId, FnvBuildHasher>,
    by_id: HashMap<SocketId, Socket, FnvBuildHasher>,
    next_id: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            sockets: HashMap::default(),
            by_id: HashMap::default(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Register a new socket bound to `local`, with a wildcard remote.
    /// Fails if any socket already owns this exact local-tuple/wildcard-
    /// remote binding, unconditionally — a second `bind` can only claim
    /// this tuple once the first socket has `connect`ed away from it or
    /// been closed.
    pub fn bind(&mut self, local: SockAddr, options: SocketOptions) -> Result<SocketId> {
        let options = options.validate()?;
        let remote = match local.addr {
            crate::types::Addr::V4(_) => SockAddr::wildcard_v4(),
            crate::types::Addr::V6(_) => SockAddr::wildcard_v6(),
        };
        let tuple = FourTuple { local, remote };
        if self.sockets.contains_key(&tuple) {
            return Err(WarpcoreError::AddressInUse);
        }

        let id = SocketId(self.next_id);
        self.next_id += 1;
        self.sockets.insert(tuple, id);
        self.by_id.insert(
            id,
            Socket {
                id,
                tuple,
                options,
                recv_queue: BufferQueue::new(),
            },
        );
        Ok(id)
    }

    /// Narrow `id`'s remote endpoint. On failure the old tuple is restored
    /// (the socket is never left unregistered).
    pub fn connect(&mut self, id: SocketId, remote: SockAddr) -> Result<()> {
        let socket = self.by_id.get(&id).ok_or(WarpcoreError::NoSuchSocket)?;
        let same_family = matches!(
            (socket.tuple.local.addr, remote.addr),
            (crate::types::Addr::V4(_), crate::types::Addr::V4(_))
                | (crate::types::Addr::V6(_), crate::types::Addr::V6(_))
        );
        if !same_family {
            return Err(WarpcoreError::UnsupportedFamily);
        }

        let old_tuple = socket.tuple;
        let new_tuple = FourTuple {
            local: old_tuple.local,
            remote,
        };
        if new_tuple != old_tuple && self.sockets.contains_key(&new_tuple) {
            return Err(WarpcoreError::AddressInUse);
        }

        self.sockets.remove(&old_tuple);
        self.sockets.insert(new_tuple, id);
        self.by_id.get_mut(&id).unwrap().tuple = new_tuple;
        Ok(())
    }

    /// Remove `id` from the registry, returning its queued receive buffers
    /// to the caller so they can be freed back to the pool.
    pub fn close(&mut self, id: SocketId) -> Option<BufferQueue> {
        let socket = self.by_id.remove(&id)?;
        self.sockets.remove(&socket.tuple);
        Some(socket.recv_queue)
    }

    /// Close every registered socket, returning each one's pending receive
    /// queue so the caller can free the buffers back to the pool. Used by
    /// engine teardown.
    pub fn close_all(&mut self) -> Vec<BufferQueue> {
        self.sockets.clear();
        self.by_id.drain().map(|(_, socket)| socket.recv_queue).collect()
    }

    /// Locate the socket a packet from `from` to `to` should be delivered
    /// to: an exact four-tuple match first, then the same local address
    /// with a wildcard remote. A socket with a non-wildcard remote that
    /// does not match `from` is never selected, even via the wildcard
    /// fallback — this is the strict behavior the design notes require
    /// (the source project's demux does not uniformly enforce it).
    pub fn lookup(&self, to: SockAddr, from: SockAddr) -> Option<SocketId> {
        let exact = FourTuple {
            local: to,
            remote: from,
        };
        if let Some(&id) = self.sockets.get(&exact) {
            return Some(id);
        }
        let wildcard_remote = match to.addr {
            crate::types::Addr::V4(_) => SockAddr::wildcard_v4(),
            crate::types::Addr::V6(_) => SockAddr::wildcard_v6(),
        };
        let wildcard = FourTuple {
            local: to,
            remote: wildcard_remote,
        };
        self.sockets.get(&wildcard).copied()
    }

    pub fn get(&self, id: SocketId) -> Option<&Socket> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: SocketId) -> Option<&mut Socket> {
        self.by_id.get_mut(&id)
    }

    pub fn deliver(&mut self, id: SocketId, buf: crate::buffer::Buffer) -> Result<()> {
        let socket = self.by_id.get_mut(&id).ok_or(WarpcoreError::NoSuchSocket)?;
        socket.recv_queue.push_back(buf);
        Ok(())
    }

    pub fn rx(&mut self, id: SocketId) -> Option<BufferQueue> {
        let socket = self.by_id.get_mut(&id)?;
        Some(std::mem::take(&mut socket.recv_queue))
    }

    /// Pick a free ephemeral port for `addr`, used when `bind` is asked for
    /// port zero.
    pub fn next_ephemeral_port(&self, addr: crate::types::Addr, rng: &mut crate::util::Xoroshiro128Plus) -> Port {
        use rand_core::RngCore;
        loop {
            let candidate = Port::EPHEMERAL_START + (rng.next_u32() % (u16::MAX - Port::EPHEMERAL_START) as u32) as u16;
            let candidate = Port(candidate);
            let local = SockAddr::new(addr, candidate);
            let remote = match addr {
                crate::types::Addr::V4(_) => SockAddr::wildcard_v4(),
                crate::types::Addr::V6(_) => SockAddr::wildcard_v6(),
            };
            if !self.sockets.contains_key(&FourTuple { local, remote }) {
                return candidate;
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Addr, Ipv4Addr};

    fn local(port: u16) -> SockAddr {
        SockAddr::new(Addr::V4(Ipv4Addr::from_bytes([10, 0, 0, 1])), Port(port))
    }

    #[test]
    fn duplicate_bind_is_rejected_then_freed_by_distinct_connect() {
        let mut reg = Registry::new();
        let a = reg.bind(local(5000), SocketOptions::new()).unwrap();
        assert!(reg.bind(local(5000), SocketOptions::new()).is_err());

        let peer = SockAddr::new(Addr::V4(Ipv4Addr::from_bytes([10, 0, 0, 9])), Port(9000));
        reg.connect(a, peer).unwrap();

        // Now local(5000) with a wildcard remote is free again.
        assert!(reg.bind(local(5000), SocketOptions::new()).is_ok());
    }

    #[test]
    fn close_removes_from_registry() {
        let mut reg = Registry::new();
        let id = reg.bind(local(6000), SocketOptions::new()).unwrap();
        assert!(reg.lookup(local(6000), SockAddr::wildcard_v4()).is_some());
        reg.close(id);
        assert!(reg.lookup(local(6000), SockAddr::wildcard_v4()).is_none());
    }

    #[test]
    fn connected_socket_rejects_mismatched_remote() {
        let mut reg = Registry::new();
        let id = reg.bind(local(7000), SocketOptions::new()).unwrap();
        let peer_a = SockAddr::new(Addr::V4(Ipv4Addr::from_bytes([10, 0, 0, 2])), Port(1));
        let peer_b = SockAddr::new(Addr::V4(Ipv4Addr::from_bytes([10, 0, 0, 3])), Port(1));
        reg.connect(id, peer_a).unwrap();

        assert_eq!(reg.lookup(local(7000), peer_a), Some(id));
        assert_eq!(reg.lookup(local(7000), peer_b), None);
    }

    #[test]
    fn unconnected_socket_matches_any_remote() {
        let mut reg = Registry::new();
        let id = reg.bind(local(8000), SocketOptions::new()).unwrap();
        let from = SockAddr::new(Addr::V4(Ipv4Addr::from_bytes([10, 0, 0, 7])), Port(42));
        assert_eq!(reg.lookup(local(8000), from), Some(id));
    }
}
