//! Next-hop selection: on-link prefix check, else the single configured
//! default router. Routing beyond this is an explicit non-goal, so unlike
//! the teacher's `drivers/src/net/route.rs` (a full longest-prefix-match
//! table with metrics) this is one function, grounded on the same
//! prefix/mask arithmetic but scoped to one interface's addresses.

#[cfg(test)]
use crate::types::Ipv4Addr;
use crate::types::{Addr, Ipv6Addr};

/// One configured interface address: the address itself plus its prefix
/// length (IPv4 netmask width / IPv6 prefix length).
#[derive(Clone, Copy)]
pub struct IfAddr {
    pub addr: Addr,
    pub prefix_len: u8,
}

/// Resolve the on-link next-hop for `dst`: `dst` itself if it falls inside
/// one of `ifaddrs`' prefixes, otherwise `default_router`.
pub fn next_hop(dst: Addr, ifaddrs: &[IfAddr], default_router: Option<Addr>) -> Option<Addr> {
    for ifa in ifaddrs {
        match (ifa.addr, dst) {
            (Addr::V4(net), Addr::V4(d)) if d.in_subnet(net, ifa.prefix_len) => return Some(dst),
            (Addr::V6(net), Addr::V6(d)) if ipv6_in_prefix(d, net, ifa.prefix_len) => return Some(dst),
            _ => {}
        }
    }
    // Off-link: the single configured default router, or unreachable.
    default_router
}

fn ipv6_in_prefix(addr: Ipv6Addr, net: Ipv6Addr, prefix_len: u8) -> bool {
    let bits = prefix_len.min(128) as usize;
    let full_bytes = bits / 8;
    if addr.0[..full_bytes] != net.0[..full_bytes] {
        return false;
    }
    let rem_bits = bits % 8;
    if rem_bits == 0 {
        return true;
    }
    let mask = 0xffu8 << (8 - rem_bits);
    (addr.0[full_bytes] & mask) == (net.0[full_bytes] & mask)
}
