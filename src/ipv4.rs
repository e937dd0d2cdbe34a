//! IPv4 (RFC 791, no options, no fragmentation) header parse/build.
//!
//! Validation order follows `original_source/lib/ip.c::ip_rx` (destination
//! filter, then checksum, then option/fragment rejection, then protocol
//! dispatch); the header-patch-then-checksum sequence on transmit follows
//! `original_source/lib/ip.c::ip_tx` and `drivers/src/net/udp.rs::udp_sendto`.

use crate::buffer::{compute_ipv4_header_checksum, Buffer};
use crate::error::{Result, WarpcoreError};
use crate::pool::BufferPool;
use crate::types::{IpProtocol, Ipv4Addr};

pub const HEADER_LEN: usize = 20;

pub struct ParsedIpv4 {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: IpProtocol,
    pub tos: u8,
}

/// What a received packet's destination address means for us.
#[derive(Debug, PartialEq, Eq)]
pub enum DestinationClass {
    Unicast,
    DirectedBroadcast,
    LimitedBroadcast,
    NotForUs,
}

pub fn classify_destination(dst: Ipv4Addr, our_addrs: &[(Ipv4Addr, Ipv4Addr)]) -> DestinationClass {
    if dst == Ipv4Addr::BROADCAST {
        return DestinationClass::LimitedBroadcast;
    }
    for &(addr, netmask) in our_addrs {
        if dst == addr {
            return DestinationClass::Unicast;
        }
        if dst.is_broadcast(netmask) {
            return DestinationClass::DirectedBroadcast;
        }
    }
    DestinationClass::NotForUs
}

/// Parse, validate, and consume the IPv4 header at the front of `buf`'s
/// current payload, per the receive policy in the component design: reject
/// non-20-byte headers (options unsupported), reject fragments, validate
/// the checksum, and require the destination to match `our_addrs` (unicast,
/// a directed broadcast, or the all-ones broadcast) or it is not for us.
pub fn parse(buf: &mut Buffer, pool: &BufferPool, our_addrs: &[(Ipv4Addr, Ipv4Addr)]) -> Result<ParsedIpv4> {
    let raw = buf.payload(pool);
    if raw.len() < HEADER_LEN {
        return Err(WarpcoreError::MalformedPacket);
    }
    let version = raw[0] >> 4;
    let ihl_words = raw[0] & 0x0f;
    if version != 4 || ihl_words != 5 {
        return Err(WarpcoreError::MalformedPacket);
    }
    let total_len = u16::from_be_bytes([raw[2], raw[3]]) as usize;
    if total_len > raw.len() || total_len < HEADER_LEN {
        return Err(WarpcoreError::MalformedPacket);
    }
    let flags_frag = u16::from_be_bytes([raw[6], raw[7]]);
    let more_fragments = (flags_frag & 0x2000) != 0;
    let frag_offset = flags_frag & 0x1fff;
    if more_fragments || frag_offset != 0 {
        return Err(WarpcoreError::MalformedPacket);
    }
    let ttl = raw[8];
    if ttl == 0 {
        return Err(WarpcoreError::MalformedPacket);
    }
    let protocol = IpProtocol::from_u8(raw[9]);
    let dst = Ipv4Addr(raw[16..20].try_into().unwrap());

    if classify_destination(dst, our_addrs) == DestinationClass::NotForUs {
        return Err(WarpcoreError::MalformedPacket);
    }

    if compute_ipv4_header_checksum(&raw[0..HEADER_LEN]) != 0 {
        return Err(WarpcoreError::ChecksumInvalid);
    }

    let src = Ipv4Addr(raw[12..16].try_into().unwrap());
    let tos = raw[1];

    let l3 = buf.head();
    buf.pull_header(HEADER_LEN)?;
    buf.set_l3(l3);
    buf.set_l4(buf.head());

    Ok(ParsedIpv4 { src, dst, protocol, tos })
}

/// Prepend an IPv4 header covering `payload_len` bytes already staged at
/// `buf`'s tail, filling the checksum over the header only.
pub fn build(
    buf: &mut Buffer,
    pool: &mut BufferPool,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: IpProtocol,
    payload_len: u16,
    ident: u16,
    tos: u8,
) {
    let total_len = HEADER_LEN as u16 + payload_len;
    let (start, _end) = buf.push_header(HEADER_LEN);
    {
        let hdr = buf.payload_mut(pool);
        let hdr = &mut hdr[0..HEADER_LEN];
        hdr[0] = 0x45;
        hdr[1] = tos;
        hdr[2..4].copy_from_slice(&total_len.to_be_bytes());
        hdr[4..6].copy_from_slice(&ident.to_be_bytes());
        hdr[6..8].copy_from_slice(&0u16.to_be_bytes());
        hdr[8] = 64;
        hdr[9] = protocol.as_u8();
        hdr[10..12].copy_from_slice(&0u16.to_be_bytes());
        hdr[12..16].copy_from_slice(&src.as_bytes());
        hdr[16..20].copy_from_slice(&dst.as_bytes());
        let cksum = compute_ipv4_header_checksum(hdr);
        hdr[10..12].copy_from_slice(&cksum.to_be_bytes());
    }
    buf.set_l3(start);
    buf.set_l4(start + HEADER_LEN as u16);
}
