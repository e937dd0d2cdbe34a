//! Ethernet II frame parse/build and EtherType dispatch.
//!
//! Constants and the checksum helper this layer's callers rely on are
//! grounded on `drivers/src/net/mod.rs`; frame layout mirrors
//! `original_source/lib/src/eth.h`'s `eth_hdr`/`eth_data` contract.

use crate::buffer::Buffer;
use crate::error::{Result, WarpcoreError};
use crate::pool::BufferPool;
use crate::types::{EtherType, MacAddr};

pub const HEADER_LEN: usize = 14;

pub struct ParsedHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: EtherType,
}

/// Parse the Ethernet header at the front of `buf`'s current payload and
/// advance past it (so `buf`'s payload becomes the L3 datagram). Rejects
/// frames not addressed to `our_mac`, broadcast, or `joined_multicast`.
pub fn parse(
    buf: &mut Buffer,
    pool: &BufferPool,
    our_mac: MacAddr,
    joined_multicast: &[MacAddr],
) -> Result<ParsedHeader> {
    let raw = buf.payload(pool);
    if raw.len() < HEADER_LEN {
        return Err(WarpcoreError::MalformedPacket);
    }
    let dst = MacAddr(raw[0..6].try_into().unwrap());
    let src = MacAddr(raw[6..12].try_into().unwrap());
    let ethertype = EtherType::from_u16(u16::from_be_bytes([raw[12], raw[13]]))
        .ok_or(WarpcoreError::MalformedPacket)?;

    let accepted = dst == our_mac || dst.is_broadcast() || joined_multicast.contains(&dst);
    if !accepted {
        return Err(WarpcoreError::MalformedPacket);
    }

    let l2 = buf.head();
    buf.pull_header(HEADER_LEN)?;
    buf.set_l2(l2);
    buf.set_l3(buf.head());

    Ok(ParsedHeader { dst, src, ethertype })
}

/// Prepend an Ethernet header in front of `buf`'s current payload.
pub fn build(
    buf: &mut Buffer,
    pool: &mut BufferPool,
    src: MacAddr,
    dst: MacAddr,
    ethertype: EtherType,
) {
    let (start, _end) = buf.push_header(HEADER_LEN);
    let frame = buf.payload_mut(pool);
    frame[0..6].copy_from_slice(&dst.as_bytes());
    frame[6..12].copy_from_slice(&src.as_bytes());
    frame[12..14].copy_from_slice(&ethertype.as_u16().to_be_bytes());
    buf.set_l2(start);
    buf.set_l3(start + HEADER_LEN as u16);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_parse_round_trips() {
        let mut pool = BufferPool::new(4, 256);
        let mut buf = Buffer::alloc(&mut pool).unwrap();
        buf.append(&mut pool, &[0xaa; 20]).unwrap();
        let src = MacAddr([1, 2, 3, 4, 5, 6]);
        let dst = MacAddr([6, 5, 4, 3, 2, 1]);
        build(&mut buf, &mut pool, src, dst, EtherType::Ipv4);

        let parsed = parse(&mut buf, &pool, dst, &[]).unwrap();
        assert_eq!(parsed.src, src);
        assert_eq!(parsed.dst, dst);
        assert_eq!(parsed.ethertype, EtherType::Ipv4);
        assert_eq!(buf.len(), 20);
    }

    #[test]
    fn frame_for_other_host_is_rejected() {
        let mut pool = BufferPool::new(4, 256);
        let mut buf = Buffer::alloc(&mut pool).unwrap();
        buf.append(&mut pool, &[0xaa; 20]).unwrap();
        let src = MacAddr([1, 2, 3, 4, 5, 6]);
        let other = MacAddr([9, 9, 9, 9, 9, 9]);
        build(&mut buf, &mut pool, src, other, EtherType::Ipv4);

        let ours = MacAddr([6, 5, 4, 3, 2, 1]);
        assert!(parse(&mut buf, &pool, ours, &[]).is_err());
    }

    #[test]
    fn broadcast_frame_is_accepted() {
        let mut pool = BufferPool::new(4, 256);
        let mut buf = Buffer::alloc(&mut pool).unwrap();
        buf.append(&mut pool, &[0xaa; 20]).unwrap();
        let src = MacAddr([1, 2, 3, 4, 5, 6]);
        build(&mut buf, &mut pool, src, MacAddr::BROADCAST, EtherType::Arp);

        let ours = MacAddr([6, 5, 4, 3, 2, 1]);
        assert!(parse(&mut buf, &pool, ours, &[]).is_ok());
    }
}
