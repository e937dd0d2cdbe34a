//! ICMPv4 echo/destination-unreachable and the ICMPv6 Neighbor Discovery
//! subset (Neighbor Solicitation / Neighbor Advertisement) this stack needs
//! to resolve IPv6 neighbors.
//!
//! The teacher has no ICMP module of its own (its UDP demux silently drops
//! an unmatched packet — `drivers/src/net/udp.rs::handle_rx`); this layer
//! is new, built in the teacher's idiom, reusing the checksum helpers from
//! [`crate::buffer`] and grounded on the unreachable-emission call site in
//! `original_source/lib/ip.c::ip_rx` (`icmp_tx(w, ICMP_TYPE_UNREACH,
//! ICMP_UNREACH_PROTOCOL, buf, len)`).

use crate::buffer::{compute_icmpv6_checksum, fold_checksum, ones_complement_sum, Buffer};
use crate::error::{Result, WarpcoreError};
use crate::pool::BufferPool;
use crate::types::{Ipv6Addr, MacAddr};

pub const TYPE_ECHO_REPLY: u8 = 0;
pub const TYPE_DEST_UNREACHABLE: u8 = 3;
pub const TYPE_ECHO_REQUEST: u8 = 8;
pub const CODE_PROTOCOL_UNREACHABLE: u8 = 2;
pub const CODE_PORT_UNREACHABLE: u8 = 3;

pub const ICMPV6_NEIGHBOR_SOLICITATION: u8 = 135;
pub const ICMPV6_NEIGHBOR_ADVERTISEMENT: u8 = 136;

const HEADER_LEN: usize = 8;

pub struct ParsedEcho {
    pub ident: u16,
    pub seq: u16,
}

/// Parse an echo request/reply header at the front of `buf`'s payload,
/// without consuming it (the reply is built in place over the request).
pub fn parse_echo(buf: &Buffer, pool: &BufferPool) -> Result<ParsedEcho> {
    let raw = buf.payload(pool);
    if raw.len() < HEADER_LEN || raw[0] != TYPE_ECHO_REQUEST {
        return Err(WarpcoreError::MalformedPacket);
    }
    Ok(ParsedEcho {
        ident: u16::from_be_bytes([raw[4], raw[5]]),
        seq: u16::from_be_bytes([raw[6], raw[7]]),
    })
}

/// Turn an echo request already staged in `buf` into an echo reply in
/// place: same identifier/sequence/payload, type flipped, checksum
/// recomputed. The caller is responsible for swapping the IP source and
/// destination.
pub fn build_echo_reply_in_place(buf: &mut Buffer, pool: &mut BufferPool) {
    let raw = buf.payload_mut(pool);
    raw[0] = TYPE_ECHO_REPLY;
    raw[1] = 0;
    raw[2..4].copy_from_slice(&0u16.to_be_bytes());
    let checksum = fold_checksum(ones_complement_sum(raw));
    raw[2..4].copy_from_slice(&checksum.to_be_bytes());
}

/// Build a destination-unreachable message whose data field carries the
/// offending IPv4 header plus the first 8 bytes of its payload, per RFC
/// 792 and the original project's unreachable-emission call site.
pub fn build_destination_unreachable(buf: &mut Buffer, pool: &mut BufferPool, code: u8, offending: &[u8]) -> Result<()> {
    let data_len = offending.len().min(20 + 8);
    buf.append(pool, &offending[..data_len])?;
    buf.push_header(HEADER_LEN);
    let raw = buf.payload_mut(pool);
    raw[0] = TYPE_DEST_UNREACHABLE;
    raw[1] = code;
    raw[2..4].copy_from_slice(&0u16.to_be_bytes());
    raw[4..8].copy_from_slice(&0u32.to_be_bytes()); // unused field
    let checksum = fold_checksum(ones_complement_sum(raw));
    raw[2..4].copy_from_slice(&checksum.to_be_bytes());
    Ok(())
}

// ---------------------------------------------------------------------
// ICMPv6 Neighbor Discovery (RFC 4861, NS/NA subset only)
// ---------------------------------------------------------------------

const ND_HEADER_LEN: usize = 24; // type/code/cksum/reserved + target address
const OPT_SOURCE_LINK_ADDR: u8 = 1;
const OPT_TARGET_LINK_ADDR: u8 = 2;

pub struct ParsedNeighborMessage {
    pub is_advertisement: bool,
    pub target: Ipv6Addr,
    pub link_addr: Option<MacAddr>,
}

pub fn parse_neighbor_message(buf: &Buffer, pool: &BufferPool) -> Result<ParsedNeighborMessage> {
    let raw = buf.payload(pool);
    if raw.len() < ND_HEADER_LEN {
        return Err(WarpcoreError::MalformedPacket);
    }
    let ty = raw[0];
    let is_advertisement = match ty {
        ICMPV6_NEIGHBOR_SOLICITATION => false,
        ICMPV6_NEIGHBOR_ADVERTISEMENT => true,
        _ => return Err(WarpcoreError::MalformedPacket),
    };
    let target = Ipv6Addr(raw[8..24].try_into().unwrap());
    let mut link_addr = None;
    let mut off = ND_HEADER_LEN;
    while off + 2 <= raw.len() {
        let opt_type = raw[off];
        let opt_len_words = raw[off + 1] as usize;
        if opt_len_words == 0 {
            break;
        }
        let opt_len = opt_len_words * 8;
        if off + opt_len > raw.len() {
            break;
        }
        if (opt_type == OPT_SOURCE_LINK_ADDR || opt_type == OPT_TARGET_LINK_ADDR) && opt_len >= 8 {
            link_addr = Some(MacAddr(raw[off + 2..off + 8].try_into().unwrap()));
        }
        off += opt_len;
    }
    Ok(ParsedNeighborMessage {
        is_advertisement,
        target,
        link_addr,
    })
}

pub fn build_neighbor_solicitation(
    buf: &mut Buffer,
    pool: &mut BufferPool,
    our_mac: MacAddr,
    target: Ipv6Addr,
    src: Ipv6Addr,
    dst: Ipv6Addr,
) {
    build_neighbor_message(
        buf,
        pool,
        ICMPV6_NEIGHBOR_SOLICITATION,
        0,
        our_mac,
        OPT_SOURCE_LINK_ADDR,
        target,
        src,
        dst,
    );
}

pub fn build_neighbor_advertisement(
    buf: &mut Buffer,
    pool: &mut BufferPool,
    our_mac: MacAddr,
    target: Ipv6Addr,
    src: Ipv6Addr,
    dst: Ipv6Addr,
) {
    const FLAG_SOLICITED: u8 = 0x40;
    const FLAG_OVERRIDE: u8 = 0x20;
    build_neighbor_message(
        buf,
        pool,
        ICMPV6_NEIGHBOR_ADVERTISEMENT,
        FLAG_SOLICITED | FLAG_OVERRIDE,
        our_mac,
        OPT_TARGET_LINK_ADDR,
        target,
        src,
        dst,
    );
}

#[allow(clippy::too_many_arguments)]
fn build_neighbor_message(
    buf: &mut Buffer,
    pool: &mut BufferPool,
    icmp_type: u8,
    flags: u8,
    our_mac: MacAddr,
    link_opt_type: u8,
    target: Ipv6Addr,
    src: Ipv6Addr,
    dst: Ipv6Addr,
) {
    buf.push_header(ND_HEADER_LEN + 8);
    let raw = buf.payload_mut(pool);
    raw[0] = icmp_type;
    raw[1] = 0;
    raw[2..4].copy_from_slice(&0u16.to_be_bytes());
    raw[4] = flags;
    raw[5..8].fill(0);
    raw[8..24].copy_from_slice(&target.as_bytes());
    raw[24] = link_opt_type;
    raw[25] = 1; // option length in units of 8 bytes
    raw[26..32].copy_from_slice(&our_mac.as_bytes());
    let checksum = compute_icmpv6_checksum(raw, src, dst);
    raw[2..4].copy_from_slice(&checksum.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_reply_flips_type_and_recomputes_checksum() {
        let mut pool = BufferPool::new(2, 256);
        let mut buf = Buffer::alloc(&mut pool).unwrap();
        buf.append(&mut pool, &[TYPE_ECHO_REQUEST, 0, 0, 0, 0, 7, 0, 1, 0xde, 0xad]).unwrap();
        {
            let raw = buf.payload_mut(&mut pool);
            let cksum = fold_checksum(ones_complement_sum(raw));
            raw[2..4].copy_from_slice(&cksum.to_be_bytes());
        }
        let echo = parse_echo(&buf, &pool).unwrap();
        assert_eq!(echo.ident, 7);
        assert_eq!(echo.seq, 1);

        build_echo_reply_in_place(&mut buf, &mut pool);
        let raw = buf.payload(&pool);
        assert_eq!(raw[0], TYPE_ECHO_REPLY);
        assert_eq!(ones_complement_sum(raw) & 0xffff, 0xffff);
    }

    #[test]
    fn destination_unreachable_carries_offending_header() {
        let mut pool = BufferPool::new(2, 256);
        let mut buf = Buffer::alloc(&mut pool).unwrap();
        let offending = [0xaa; 28];
        build_destination_unreachable(&mut buf, &mut pool, CODE_PORT_UNREACHABLE, &offending).unwrap();
        let raw = buf.payload(&pool);
        assert_eq!(raw[0], TYPE_DEST_UNREACHABLE);
        assert_eq!(raw[1], CODE_PORT_UNREACHABLE);
        assert_eq!(&raw[HEADER_LEN..], &offending[..]);
    }

    #[test]
    fn neighbor_solicitation_round_trips_link_addr_option() {
        let mut pool = BufferPool::new(2, 256);
        let mut buf = Buffer::alloc(&mut pool).unwrap();
        let mac = MacAddr([1, 2, 3, 4, 5, 6]);
        let target = Ipv6Addr::from_bytes([0x20, 1, 0xd, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5]);
        let src = Ipv6Addr::LOOPBACK;
        let dst = target;
        build_neighbor_solicitation(&mut buf, &mut pool, mac, target, src, dst);

        let parsed = parse_neighbor_message(&buf, &pool).unwrap();
        assert!(!parsed.is_advertisement);
        assert_eq!(parsed.target, target);
        assert_eq!(parsed.link_addr, Some(mac));
    }
}
