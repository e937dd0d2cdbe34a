//! ARP (RFC 826) request/reply parse and build, Ethernet+IPv4 only.
//!
//! Field layout and validation follow `drivers/src/net/arp.rs`.

use crate::buffer::Buffer;
use crate::error::{Result, WarpcoreError};
use crate::pool::BufferPool;
use crate::types::{EtherType, Ipv4Addr, MacAddr};

pub const HEADER_LEN: usize = 28;
const HTYPE_ETHERNET: u16 = 1;
const PTYPE_IPV4: u16 = EtherType::Ipv4.as_u16();
const HLEN_ETHERNET: u8 = 6;
const PLEN_IPV4: u8 = 4;
const OPER_REQUEST: u16 = 1;
const OPER_REPLY: u16 = 2;

#[derive(Debug, Clone, Copy)]
pub enum ArpOp {
    Request,
    Reply,
}

pub struct ParsedArp {
    pub op: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

pub fn parse(buf: &Buffer, pool: &BufferPool) -> Result<ParsedArp> {
    let raw = buf.payload(pool);
    if raw.len() < HEADER_LEN {
        return Err(WarpcoreError::MalformedPacket);
    }
    let htype = u16::from_be_bytes([raw[0], raw[1]]);
    let ptype = u16::from_be_bytes([raw[2], raw[3]]);
    let hlen = raw[4];
    let plen = raw[5];
    if htype != HTYPE_ETHERNET || ptype != PTYPE_IPV4 || hlen != HLEN_ETHERNET || plen != PLEN_IPV4 {
        return Err(WarpcoreError::MalformedPacket);
    }
    let oper = u16::from_be_bytes([raw[6], raw[7]]);
    let op = match oper {
        OPER_REQUEST => ArpOp::Request,
        OPER_REPLY => ArpOp::Reply,
        _ => return Err(WarpcoreError::MalformedPacket),
    };
    Ok(ParsedArp {
        op,
        sender_mac: MacAddr(raw[8..14].try_into().unwrap()),
        sender_ip: Ipv4Addr(raw[14..18].try_into().unwrap()),
        target_mac: MacAddr(raw[18..24].try_into().unwrap()),
        target_ip: Ipv4Addr(raw[24..28].try_into().unwrap()),
    })
}

fn build(
    buf: &mut Buffer,
    pool: &mut BufferPool,
    op: ArpOp,
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) {
    buf.push_header(HEADER_LEN);
    let raw = buf.payload_mut(pool);
    raw[0..2].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
    raw[2..4].copy_from_slice(&PTYPE_IPV4.to_be_bytes());
    raw[4] = HLEN_ETHERNET;
    raw[5] = PLEN_IPV4;
    raw[6..8].copy_from_slice(
        &(match op {
            ArpOp::Request => OPER_REQUEST,
            ArpOp::Reply => OPER_REPLY,
        })
        .to_be_bytes(),
    );
    raw[8..14].copy_from_slice(&sender_mac.as_bytes());
    raw[14..18].copy_from_slice(&sender_ip.as_bytes());
    raw[18..24].copy_from_slice(&target_mac.as_bytes());
    raw[24..28].copy_from_slice(&target_ip.as_bytes());
}

pub fn build_request(
    buf: &mut Buffer,
    pool: &mut BufferPool,
    our_mac: MacAddr,
    our_ip: Ipv4Addr,
    target_ip: Ipv4Addr,
) {
    build(
        buf,
        pool,
        ArpOp::Request,
        our_mac,
        our_ip,
        MacAddr::ZERO,
        target_ip,
    );
}

pub fn build_reply(
    buf: &mut Buffer,
    pool: &mut BufferPool,
    our_mac: MacAddr,
    our_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) {
    build(buf, pool, ArpOp::Reply, our_mac, our_ip, target_mac, target_ip);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_parse() {
        let mut pool = BufferPool::new(2, 128);
        let mut buf = Buffer::alloc(&mut pool).unwrap();
        let mac = MacAddr([1, 2, 3, 4, 5, 6]);
        let our_ip = Ipv4Addr::from_bytes([10, 0, 0, 1]);
        let target_ip = Ipv4Addr::from_bytes([10, 0, 0, 2]);
        build_request(&mut buf, &mut pool, mac, our_ip, target_ip);

        let parsed = parse(&buf, &pool).unwrap();
        assert!(matches!(parsed.op, ArpOp::Request));
        assert_eq!(parsed.sender_ip, our_ip);
        assert_eq!(parsed.target_ip, target_ip);
        assert!(parsed.target_mac.is_zero());
    }

    #[test]
    fn rejects_non_ethernet_ipv4_fields() {
        let mut pool = BufferPool::new(2, 128);
        let mut buf = Buffer::alloc(&mut pool).unwrap();
        buf.append(&mut pool, &[0u8; HEADER_LEN]).unwrap();
        assert!(parse(&buf, &pool).is_err());
    }
}
