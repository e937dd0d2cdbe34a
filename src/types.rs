//! Address, port, and protocol value types shared across layers.

use std::fmt;

/// An IPv4 address in network byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Ipv4Addr(pub [u8; 4]);

impl Ipv4Addr {
    pub const UNSPECIFIED: Self = Self([0, 0, 0, 0]);
    pub const BROADCAST: Self = Self([255, 255, 255, 255]);
    pub const LOCALHOST: Self = Self([127, 0, 0, 1]);

    pub const fn from_u32_be(v: u32) -> Self {
        Self(v.to_be_bytes())
    }

    pub const fn to_u32_be(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub const fn from_bytes(b: [u8; 4]) -> Self {
        Self(b)
    }

    pub const fn as_bytes(self) -> [u8; 4] {
        self.0
    }

    pub const fn is_unspecified(self) -> bool {
        self.to_u32_be() == 0
    }

    pub const fn is_loopback(self) -> bool {
        self.0[0] == 127
    }

    pub fn is_broadcast(self, netmask: Self) -> bool {
        self == Self::BROADCAST || self == directed_broadcast(self, netmask)
    }

    pub const fn is_multicast(self) -> bool {
        (self.0[0] & 0xf0) == 0xe0
    }

    /// Whether `self` falls within the `/prefix_len` network rooted at `net`.
    pub fn in_subnet(self, net: Self, prefix_len: u8) -> bool {
        let mask = prefix_mask(prefix_len);
        (self.to_u32_be() & mask) == (net.to_u32_be() & mask)
    }

    /// The netmask corresponding to a `/prefix_len` IPv4 network.
    pub fn netmask(prefix_len: u8) -> Self {
        Self::from_u32_be(prefix_mask(prefix_len))
    }
}

fn prefix_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len.min(32))
    }
}

fn directed_broadcast(net: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from_u32_be(net.to_u32_be() | !netmask.to_u32_be())
}

impl fmt::Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl fmt::Debug for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An IPv6 address, stored as a 128-bit big-endian value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv6Addr(pub [u8; 16]);

impl Ipv6Addr {
    pub const UNSPECIFIED: Self = Self([0; 16]);
    pub const LOOPBACK: Self = Self([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);

    pub const fn from_bytes(b: [u8; 16]) -> Self {
        Self(b)
    }

    pub const fn as_bytes(self) -> [u8; 16] {
        self.0
    }

    pub const fn is_unspecified(self) -> bool {
        u128::from_be_bytes(self.0) == 0
    }

    pub const fn is_loopback(self) -> bool {
        u128::from_be_bytes(self.0) == 1
    }

    /// `fe80::/10` link-local unicast.
    pub const fn is_link_local(self) -> bool {
        self.0[0] == 0xfe && (self.0[1] & 0xc0) == 0x80
    }

    /// `fec0::/10` site-local unicast (deprecated by RFC 3879 but still seen
    /// on the wire, hence excluded from address enumeration like the
    /// original project excludes it).
    pub const fn is_site_local(self) -> bool {
        self.0[0] == 0xfe && (self.0[1] & 0xc0) == 0xc0
    }

    /// An IPv4-mapped address, `::ffff:a.b.c.d`.
    pub const fn is_v4_mapped(self) -> bool {
        matches!(
            self.0,
            [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, _, _, _, _]
        )
    }

    /// A deprecated IPv4-compatible address, `::a.b.c.d`.
    pub fn is_v4_compatible(self) -> bool {
        let words = &self.0[0..12];
        words.iter().all(|b| *b == 0) && !self.is_unspecified() && !self.is_loopback()
    }

    /// Solicited-node multicast address derived from a unicast/anycast
    /// target address, `ff02::1:ffXX:XXXX`.
    pub fn solicited_node(self) -> Self {
        let mut out = [0u8; 16];
        out[0] = 0xff;
        out[1] = 0x02;
        out[11] = 0x01;
        out[12] = 0xff;
        out[13..16].copy_from_slice(&self.0[13..16]);
        Self(out)
    }

    pub const fn is_multicast(self) -> bool {
        self.0[0] == 0xff
    }
}

impl fmt::Display for Ipv6Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chunk) in self.0.chunks(2).enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:x}", u16::from_be_bytes([chunk[0], chunk[1]]))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Ipv6Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A tagged union over IP version, per the redesign note in the component
/// design for the IP layer: callers and the neighbor cache dispatch on the
/// variant instead of branching on a version byte everywhere.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Addr {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl Addr {
    pub const fn is_unspecified(self) -> bool {
        match self {
            Addr::V4(a) => a.is_unspecified(),
            Addr::V6(a) => a.is_unspecified(),
        }
    }

    pub const fn is_loopback(self) -> bool {
        match self {
            Addr::V4(a) => a.is_loopback(),
            Addr::V6(a) => a.is_loopback(),
        }
    }

    pub const fn is_v4(self) -> bool {
        matches!(self, Addr::V4(_))
    }

    pub const fn is_v6(self) -> bool {
        matches!(self, Addr::V6(_))
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addr::V4(a) => fmt::Display::fmt(a, f),
            Addr::V6(a) => fmt::Display::fmt(a, f),
        }
    }
}

/// A UDP/TCP port number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[repr(transparent)]
pub struct Port(pub u16);

impl Port {
    pub const UNSPECIFIED: Self = Self(0);
    pub const EPHEMERAL_START: u16 = 49_152;

    pub const fn new(v: u16) -> Self {
        Self(v)
    }

    pub const fn to_network_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    pub const fn from_network_bytes(b: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(b))
    }

    pub const fn is_ephemeral(self) -> bool {
        self.0 >= Self::EPHEMERAL_START
    }

    pub const fn is_privileged(self) -> bool {
        self.0 < 1024
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 48-bit Ethernet MAC address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: Self = Self([0xff; 6]);
    pub const ZERO: Self = Self([0; 6]);

    pub const fn is_broadcast(self) -> bool {
        let [a, b, c, d, e, f] = self.0;
        a == 0xff && b == 0xff && c == 0xff && d == 0xff && e == 0xff && f == 0xff
    }

    pub const fn is_multicast(self) -> bool {
        (self.0[0] & 0x01) != 0
    }

    pub const fn is_zero(self) -> bool {
        let [a, b, c, d, e, f] = self.0;
        a == 0 && b == 0 && c == 0 && d == 0 && e == 0 && f == 0
    }

    pub const fn as_bytes(self) -> [u8; 6] {
        self.0
    }

    /// The solicited-node multicast MAC corresponding to an IPv6 solicited-
    /// node multicast address (`33:33:ff:XX:XX:XX`).
    pub const fn from_solicited_node(addr: Ipv6Addr) -> Self {
        let b = addr.0;
        Self([0x33, 0x33, 0xff, b[13], b[14], b[15]])
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An IP protocol number (the IPv4 header's protocol byte / IPv6's next
/// header byte). `Unsupported` carries the raw byte through so a receiver
/// can still build an ICMP protocol-unreachable reply naming it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IpProtocol {
    Icmp,
    Udp,
    Icmpv6,
    Unsupported(u8),
}

impl IpProtocol {
    pub const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Icmp,
            17 => Self::Udp,
            58 => Self::Icmpv6,
            other => Self::Unsupported(other),
        }
    }

    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Icmp => 1,
            Self::Udp => 17,
            Self::Icmpv6 => 58,
            Self::Unsupported(v) => v,
        }
    }
}

/// An EtherType value for the Ethernet frames this stack builds and parses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
    Ipv6 = 0x86DD,
}

impl EtherType {
    pub const fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0800 => Some(Self::Ipv4),
            0x0806 => Some(Self::Arp),
            0x86DD => Some(Self::Ipv6),
            _ => None,
        }
    }

    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// An address/port pair identifying one endpoint of a flow.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SockAddr {
    pub addr: Addr,
    pub port: Port,
}

impl SockAddr {
    pub const fn new(addr: Addr, port: Port) -> Self {
        Self { addr, port }
    }

    /// A wildcard endpoint for the given IP version: unspecified address,
    /// port zero. Used as the "remote" half of an unconnected socket.
    pub const fn wildcard_v4() -> Self {
        Self {
            addr: Addr::V4(Ipv4Addr::UNSPECIFIED),
            port: Port::UNSPECIFIED,
        }
    }

    pub const fn wildcard_v6() -> Self {
        Self {
            addr: Addr::V6(Ipv6Addr::UNSPECIFIED),
            port: Port::UNSPECIFIED,
        }
    }

    pub const fn is_wildcard(self) -> bool {
        self.addr.is_unspecified() && self.port.0 == 0
    }
}

impl fmt::Display for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// The four-tuple identifying one UDP flow: `(local, remote)` where `remote`
/// is the wildcard endpoint until `connect`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FourTuple {
    pub local: SockAddr,
    pub remote: SockAddr,
}

impl fmt::Display for FourTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.local, self.remote)
    }
}
