//! Connection tuple extraction
//!
//! Derives the flow identity and the transport payload offset from raw frame
//! bytes. Pure: reads the packet, never touches flow state. A `None` result
//! means "not ours or malformed" and the packet passes through unclassified.

use crate::parser::{Cursor, Packet};
use netsift_common::{
    conn, protocol,
    wire::{ETH_P_IP, ETH_P_IPV6, IPV4_MIN_HLEN, IPV6_HLEN, TCP_MIN_HLEN},
    ConnTuple,
};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::trace;

/// Per-packet view produced by [`extract`]. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo {
    /// Offset of the first transport payload byte
    pub data_off: usize,
    /// End of the datagram as declared by the IP header. Link-layer padding
    /// past this point is not payload.
    pub data_end: usize,
    /// TCP flag byte, zero for UDP
    pub tcp_flags: u8,
    pub tup: ConnTuple,
}

impl PacketInfo {
    pub fn payload<'a>(&self, packet: &Packet<'a>) -> &'a [u8] {
        packet
            .bytes()
            .get(self.data_off..self.data_end)
            .unwrap_or(&[])
    }

    pub fn payload_len(&self) -> usize {
        self.data_end.saturating_sub(self.data_off)
    }

    /// Cursor over the payload, positioned at `data_off`
    pub fn payload_cursor<'a>(&self, packet: &Packet<'a>) -> Option<Cursor<'a>> {
        let datagram = packet.bytes().get(..self.data_end)?;
        Cursor::at(datagram, self.data_off)
    }
}

/// Extract the tuple of a frame that starts with an Ethernet header
pub fn extract(packet: &Packet<'_>) -> Option<PacketInfo> {
    extract_at(packet, 0)
}

/// Extract the tuple of a frame whose Ethernet header starts at `offset`
pub fn extract_at(packet: &Packet<'_>, offset: usize) -> Option<PacketInfo> {
    let mut cursor = Cursor::at(packet.bytes(), offset)?;
    let eth = cursor.parse_ethhdr()?;

    let l3_start = cursor.position();
    let mut tup = ConnTuple::default();
    let (l4_proto, l3_len) = match eth.ether_type() {
        ETH_P_IP => {
            let ip = cursor.parse_iphdr()?;
            let hdr_len = ip.header_len();
            if hdr_len < IPV4_MIN_HLEN {
                trace!("ipv4 header length {} below minimum", hdr_len);
                return None;
            }
            let tot_len = usize::from(ip.tot_len());
            if tot_len < hdr_len {
                trace!("ipv4 total length {} below header length {}", tot_len, hdr_len);
                return None;
            }
            cursor.advance(hdr_len - IPV4_MIN_HLEN)?;
            tup.set_saddr_v4(ip.src_addr);
            tup.set_daddr_v4(ip.dst_addr);
            tup.metadata |= conn::V4;
            (ip.proto, tot_len)
        }
        ETH_P_IPV6 => {
            let ip6 = cursor.parse_ipv6hdr()?;
            if is_ipv4_mapped_ipv6(&ip6.src_addr) && is_ipv4_mapped_ipv6(&ip6.dst_addr) {
                tup.set_saddr_v4(low_v4(&ip6.src_addr));
                tup.set_daddr_v4(low_v4(&ip6.dst_addr));
                tup.metadata |= conn::V4;
            } else {
                tup.saddr = ip6.src_addr;
                tup.daddr = ip6.dst_addr;
                tup.metadata |= conn::V6;
            }
            (ip6.next_hdr, IPV6_HLEN + usize::from(ip6.payload_len()))
        }
        _ => return None,
    };

    // transport headers and payload must lie within the declared datagram
    let data_end = l3_start + l3_len;
    if data_end > packet.len() {
        trace!("ip datagram of {} bytes exceeds the frame", l3_len);
        return None;
    }
    let mut cursor = Cursor::at(&packet.bytes()[..data_end], cursor.position())?;

    let tcp_flags = match l4_proto {
        protocol::UDP => {
            let udp = cursor.parse_udphdr()?;
            tup.sport = udp.source();
            tup.dport = udp.dest();
            tup.metadata |= conn::TYPE_UDP;
            0
        }
        protocol::TCP => {
            let tcp = cursor.parse_tcphdr()?;
            let hdr_len = tcp.header_len();
            if hdr_len < TCP_MIN_HLEN {
                trace!("tcp data offset {} below minimum", hdr_len);
                return None;
            }
            // skip options so data_off lands on the payload
            cursor.advance(hdr_len - TCP_MIN_HLEN)?;
            tup.sport = tcp.source();
            tup.dport = tcp.dest();
            tup.metadata |= conn::TYPE_TCP;
            tcp.flags
        }
        _ => return None,
    };

    Some(PacketInfo {
        data_off: cursor.position(),
        data_end,
        tcp_flags,
        tup,
    })
}

/// `::ffff:a.b.c.d` (RFC 4291 section 2.5.5.2)
pub fn is_ipv4_mapped_ipv6(addr: &[u8; 16]) -> bool {
    addr[..10].iter().all(|b| *b == 0) && addr[10] == 0xff && addr[11] == 0xff
}

fn low_v4(addr: &[u8; 16]) -> [u8; 4] {
    [addr[12], addr[13], addr[14], addr[15]]
}

/// 128-bit address slot for `addr`, IPv4 in the low 32 bits
pub fn addr_slot(addr: IpAddr) -> [u8; 16] {
    match addr {
        IpAddr::V4(v4) => {
            let mut slot = [0; 16];
            slot[12..].copy_from_slice(&v4.octets());
            slot
        }
        IpAddr::V6(v6) => v6.octets(),
    }
}

pub fn src_addr(tup: &ConnTuple) -> IpAddr {
    slot_addr(tup, &tup.saddr)
}

pub fn dst_addr(tup: &ConnTuple) -> IpAddr {
    slot_addr(tup, &tup.daddr)
}

fn slot_addr(tup: &ConnTuple, slot: &[u8; 16]) -> IpAddr {
    if tup.is_v6() {
        IpAddr::V6(Ipv6Addr::from(*slot))
    } else {
        IpAddr::V4(Ipv4Addr::from(low_v4(slot)))
    }
}

/// `Display` adapter: `tcp 10.0.0.5:53124 -> 10.0.0.1:443`
pub struct TupleDisplay<'a>(pub &'a ConnTuple);

impl fmt::Display for TupleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tup = self.0;
        let proto = if tup.is_tcp() { "tcp" } else { "udp" };
        match (src_addr(tup), dst_addr(tup)) {
            (IpAddr::V6(s), IpAddr::V6(d)) => write!(
                f,
                "{} [{}]:{} -> [{}]:{}",
                proto, s, tup.sport, d, tup.dport
            ),
            (s, d) => write!(f, "{} {}:{} -> {}:{}", proto, s, tup.sport, d, tup.dport),
        }?;
        if tup.netns != 0 {
            write!(f, " netns={}", tup.netns)?;
        }
        Ok(())
    }
}

pub fn display(tup: &ConnTuple) -> TupleDisplay<'_> {
    TupleDisplay(tup)
}
