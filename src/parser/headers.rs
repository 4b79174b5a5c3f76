//! Wire headers as alignment-1 byte structs
//!
//! All multi-byte fields are kept in network byte order and decoded by the
//! accessor methods.

use std::mem;

/// A fixed-size wire header that can be viewed in place.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` structs built only from `u8` and
/// `[u8; N]` fields: alignment 1, no padding, and every byte pattern valid.
pub unsafe trait Header: Sized {
    const LEN: usize = mem::size_of::<Self>();
}

/// Ethernet II header (14 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EthHdr {
    pub dst_addr: [u8; 6],
    pub src_addr: [u8; 6],
    pub ether_type: [u8; 2],
}

impl EthHdr {
    #[inline]
    pub fn ether_type(&self) -> u16 {
        u16::from_be_bytes(self.ether_type)
    }
}

/// IPv4 header without options (20 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Hdr {
    pub vihl: u8,
    pub tos: u8,
    pub tot_len: [u8; 2],
    pub id: [u8; 2],
    pub frag_off: [u8; 2],
    pub ttl: u8,
    pub proto: u8,
    pub check: [u8; 2],
    pub src_addr: [u8; 4],
    pub dst_addr: [u8; 4],
}

impl Ipv4Hdr {
    #[inline]
    pub fn version(&self) -> u8 {
        self.vihl >> 4
    }

    /// Header length in 32-bit words
    #[inline]
    pub fn ihl(&self) -> u8 {
        self.vihl & 0x0f
    }

    /// Header length in bytes, options included
    #[inline]
    pub fn header_len(&self) -> usize {
        (self.ihl() as usize) << 2
    }

    #[inline]
    pub fn tot_len(&self) -> u16 {
        u16::from_be_bytes(self.tot_len)
    }
}

/// IPv6 fixed header (40 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Ipv6Hdr {
    pub vcf: [u8; 4],
    pub payload_len: [u8; 2],
    pub next_hdr: u8,
    pub hop_limit: u8,
    pub src_addr: [u8; 16],
    pub dst_addr: [u8; 16],
}

impl Ipv6Hdr {
    #[inline]
    pub fn version(&self) -> u8 {
        self.vcf[0] >> 4
    }

    #[inline]
    pub fn payload_len(&self) -> u16 {
        u16::from_be_bytes(self.payload_len)
    }
}

/// TCP header without options (20 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TcpHdr {
    pub source: [u8; 2],
    pub dest: [u8; 2],
    pub seq: [u8; 4],
    pub ack_seq: [u8; 4],
    pub off_res: u8,
    pub flags: u8,
    pub window: [u8; 2],
    pub check: [u8; 2],
    pub urg_ptr: [u8; 2],
}

impl TcpHdr {
    #[inline]
    pub fn source(&self) -> u16 {
        u16::from_be_bytes(self.source)
    }

    #[inline]
    pub fn dest(&self) -> u16 {
        u16::from_be_bytes(self.dest)
    }

    /// Data offset in 32-bit words
    #[inline]
    pub fn doff(&self) -> u8 {
        self.off_res >> 4
    }

    /// Header length in bytes, options included
    #[inline]
    pub fn header_len(&self) -> usize {
        (self.doff() as usize) << 2
    }

    #[inline]
    pub fn seq(&self) -> u32 {
        u32::from_be_bytes(self.seq)
    }

    #[inline]
    pub fn ack_seq(&self) -> u32 {
        u32::from_be_bytes(self.ack_seq)
    }
}

/// UDP header (8 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UdpHdr {
    pub source: [u8; 2],
    pub dest: [u8; 2],
    pub len: [u8; 2],
    pub check: [u8; 2],
}

impl UdpHdr {
    #[inline]
    pub fn source(&self) -> u16 {
        u16::from_be_bytes(self.source)
    }

    #[inline]
    pub fn dest(&self) -> u16 {
        u16::from_be_bytes(self.dest)
    }

    #[inline]
    pub fn len(&self) -> u16 {
        u16::from_be_bytes(self.len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == [0, 0]
    }
}

/// DNS message header (12 bytes)
///
/// Flags word, most significant bit first:
///
/// ```text
///  QR | Opcode(4) | AA | TC | RD | RA | Z | AD | CD | RCODE(4)
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DnsHdr {
    pub id: [u8; 2],
    pub flags: [u8; 2],
    pub qdcount: [u8; 2],
    pub ancount: [u8; 2],
    pub nscount: [u8; 2],
    pub arcount: [u8; 2],
}

impl DnsHdr {
    #[inline]
    pub fn id(&self) -> u16 {
        u16::from_be_bytes(self.id)
    }

    #[inline]
    pub fn flags(&self) -> u16 {
        u16::from_be_bytes(self.flags)
    }

    /// `true` for responses
    #[inline]
    pub fn qr(&self) -> bool {
        self.flags() & 0x8000 != 0
    }

    #[inline]
    pub fn opcode(&self) -> u8 {
        ((self.flags() >> 11) & 0x0f) as u8
    }

    #[inline]
    pub fn aa(&self) -> bool {
        self.flags() & 0x0400 != 0
    }

    #[inline]
    pub fn tc(&self) -> bool {
        self.flags() & 0x0200 != 0
    }

    #[inline]
    pub fn rd(&self) -> bool {
        self.flags() & 0x0100 != 0
    }

    #[inline]
    pub fn ra(&self) -> bool {
        self.flags() & 0x0080 != 0
    }

    #[inline]
    pub fn z(&self) -> bool {
        self.flags() & 0x0040 != 0
    }

    #[inline]
    pub fn ad(&self) -> bool {
        self.flags() & 0x0020 != 0
    }

    #[inline]
    pub fn cd(&self) -> bool {
        self.flags() & 0x0010 != 0
    }

    #[inline]
    pub fn rcode(&self) -> u8 {
        (self.flags() & 0x000f) as u8
    }

    #[inline]
    pub fn qdcount(&self) -> u16 {
        u16::from_be_bytes(self.qdcount)
    }

    #[inline]
    pub fn ancount(&self) -> u16 {
        u16::from_be_bytes(self.ancount)
    }

    #[inline]
    pub fn nscount(&self) -> u16 {
        u16::from_be_bytes(self.nscount)
    }

    #[inline]
    pub fn arcount(&self) -> u16 {
        u16::from_be_bytes(self.arcount)
    }
}

// SAFETY: each header is repr(C) and made only of u8 / [u8; N] fields.
unsafe impl Header for EthHdr {}
unsafe impl Header for Ipv4Hdr {}
unsafe impl Header for Ipv6Hdr {}
unsafe impl Header for TcpHdr {}
unsafe impl Header for UdpHdr {}
unsafe impl Header for DnsHdr {}

const _: () = {
    assert!(mem::size_of::<EthHdr>() == 14 && mem::align_of::<EthHdr>() == 1);
    assert!(mem::size_of::<Ipv4Hdr>() == 20 && mem::align_of::<Ipv4Hdr>() == 1);
    assert!(mem::size_of::<Ipv6Hdr>() == 40 && mem::align_of::<Ipv6Hdr>() == 1);
    assert!(mem::size_of::<TcpHdr>() == 20 && mem::align_of::<TcpHdr>() == 1);
    assert!(mem::size_of::<UdpHdr>() == 8 && mem::align_of::<UdpHdr>() == 1);
    assert!(mem::size_of::<DnsHdr>() == 12 && mem::align_of::<DnsHdr>() == 1);
};
