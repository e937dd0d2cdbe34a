//! UDP (RFC 768) header parse/build and checksum validation.
//!
//! Wire layout matches `drivers/src/net/udp.rs::udp_sendto`'s hand-built
//! header; checksum validation adds the receive-side check the teacher's
//! fast path does not perform (its demux trusts the NIC's checksum-offload
//! flag). This module performs the full pseudo-header verification
//! unconditionally since the loopback and real-NIC backends here do not
//! distinguish a verified-by-hardware flag.

use crate::buffer::{compute_udp_checksum_v4, compute_udp_checksum_v6, Buffer};
use crate::error::{Result, WarpcoreError};
use crate::pool::BufferPool;
use crate::types::{Addr, Port};

pub const HEADER_LEN: usize = 8;

pub struct ParsedUdp {
    pub src_port: Port,
    pub dst_port: Port,
}

/// Parse and validate the UDP header at the front of `buf`'s L4 payload,
/// then consume it so `buf`'s payload is just the datagram body.
/// `src`/`dst` are the already-parsed IP addresses, needed for the
/// pseudo-header checksum.
pub fn parse(buf: &mut Buffer, pool: &BufferPool, src: Addr, dst: Addr) -> Result<ParsedUdp> {
    let raw = buf.payload(pool);
    if raw.len() < HEADER_LEN {
        return Err(WarpcoreError::MalformedPacket);
    }
    let src_port = Port::from_network_bytes([raw[0], raw[1]]);
    let dst_port = Port::from_network_bytes([raw[2], raw[3]]);
    let udp_len = u16::from_be_bytes([raw[4], raw[5]]) as usize;
    if udp_len < HEADER_LEN || udp_len > raw.len() {
        return Err(WarpcoreError::MalformedPacket);
    }
    let checksum = u16::from_be_bytes([raw[6], raw[7]]);

    if checksum != 0 {
        let computed = match (src, dst) {
            (Addr::V4(s), Addr::V4(d)) => compute_udp_checksum_v4(&raw[..udp_len], s, d),
            (Addr::V6(s), Addr::V6(d)) => compute_udp_checksum_v6(&raw[..udp_len], s, d),
            _ => return Err(WarpcoreError::MalformedPacket),
        };
        if computed != 0 {
            return Err(WarpcoreError::ChecksumInvalid);
        }
    } else if dst.is_v6() {
        // IPv6 UDP checksums are mandatory (RFC 8200 §8.1).
        return Err(WarpcoreError::ChecksumInvalid);
    }

    buf.pull_header(HEADER_LEN)?;
    Ok(ParsedUdp { src_port, dst_port })
}

/// Prepend a UDP header over the payload already staged at `buf`'s tail
/// and fill in the pseudo-header checksum.
pub fn build(buf: &mut Buffer, pool: &mut BufferPool, src: Addr, dst: Addr, src_port: Port, dst_port: Port) -> Result<()> {
    let payload_len = buf.len();
    let udp_len = (HEADER_LEN + payload_len) as u16;
    buf.push_header(HEADER_LEN);
    {
        let raw = buf.payload_mut(pool);
        raw[0..2].copy_from_slice(&src_port.to_network_bytes());
        raw[2..4].copy_from_slice(&dst_port.to_network_bytes());
        raw[4..6].copy_from_slice(&udp_len.to_be_bytes());
        raw[6..8].copy_from_slice(&0u16.to_be_bytes());
    }
    let checksum = {
        let raw = buf.payload(pool);
        match (src, dst) {
            (Addr::V4(s), Addr::V4(d)) => compute_udp_checksum_v4(raw, s, d),
            (Addr::V6(s), Addr::V6(d)) => compute_udp_checksum_v6(raw, s, d),
            _ => return Err(WarpcoreError::UnsupportedFamily),
        }
    };
    buf.payload_mut(pool)[6..8].copy_from_slice(&checksum.to_be_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ipv4Addr;

    #[test]
    fn build_then_parse_round_trips() {
        let mut pool = BufferPool::new(2, 512);
        let mut buf = Buffer::alloc(&mut pool).unwrap();
        buf.append(&mut pool, b"hello").unwrap();
        let src = Addr::V4(Ipv4Addr::from_bytes([10, 0, 0, 1]));
        let dst = Addr::V4(Ipv4Addr::from_bytes([10, 0, 0, 2]));
        build(&mut buf, &mut pool, src, dst, Port(4000), Port(7)).unwrap();

        let parsed = parse(&mut buf, &pool, src, dst).unwrap();
        assert_eq!(parsed.src_port, Port(4000));
        assert_eq!(parsed.dst_port, Port(7));
        assert_eq!(buf.payload(&pool), b"hello");
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut pool = BufferPool::new(2, 512);
        let mut buf = Buffer::alloc(&mut pool).unwrap();
        buf.append(&mut pool, b"hello").unwrap();
        let src = Addr::V4(Ipv4Addr::from_bytes([10, 0, 0, 1]));
        let dst = Addr::V4(Ipv4Addr::from_bytes([10, 0, 0, 2]));
        build(&mut buf, &mut pool, src, dst, Port(4000), Port(7)).unwrap();
        {
            let raw = buf.payload_mut(&mut pool);
            let last = raw.len() - 1;
            raw[last] ^= 0xff;
        }
        assert!(matches!(
            parse(&mut buf, &pool, src, dst),
            Err(WarpcoreError::ChecksumInvalid)
        ));
    }
}
