//! Fixed-layout records shared between the data plane and userspace
//!
//! Every type here must be:
//! - `#[repr(C)]` so a kernel-side program and userspace agree on layout
//! - `no_std` compatible
//! - free of pointers, so a record can be copied out of a map verbatim

#![cfg_attr(not(feature = "userspace"), no_std)]

/// Ethernet and IP wire constants
pub mod wire {
    pub const ETH_HLEN: usize = 14;
    pub const ETH_P_IP: u16 = 0x0800;
    pub const ETH_P_IPV6: u16 = 0x86DD;

    pub const IPV4_MIN_HLEN: usize = 20;
    pub const IPV6_HLEN: usize = 40;
    pub const TCP_MIN_HLEN: usize = 20;
    pub const UDP_HLEN: usize = 8;
}

/// IP protocol constants
pub mod protocol {
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

/// TCP flag bits as found in byte 13 of the TCP header
pub mod tcp_flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
}

/// `ConnTuple::metadata` bits.
///
/// Bit 0 set means TCP, clear means UDP. Bit 1 set means IPv6, clear means IPv4.
pub mod conn {
    pub const TYPE_UDP: u32 = 0;
    pub const TYPE_TCP: u32 = 1;
    pub const V4: u32 = 0;
    pub const V6: u32 = 1 << 1;
}

/// TLS record layer constants
pub mod tls {
    pub const HEADER_SIZE: usize = 5;

    pub const SSL_VERSION20: u16 = 0x0200;
    pub const SSL_VERSION30: u16 = 0x0300;
    pub const TLS_VERSION10: u16 = 0x0301;
    pub const TLS_VERSION11: u16 = 0x0302;
    pub const TLS_VERSION12: u16 = 0x0303;
    pub const TLS_VERSION13: u16 = 0x0304;

    pub const CONTENT_ALERT: u8 = 0x15;
    pub const CONTENT_HANDSHAKE: u8 = 0x16;
    pub const CONTENT_APPLICATION_DATA: u8 = 0x17;

    /// Packets a flow may spend in classification before it is abandoned
    pub const MAX_PACKET_CLASSIFIER: u8 = 10;

    pub const BUFFER_SIZE: usize = 3000;
    pub const BUFFER_RING_SIZE: u32 = 128;
    pub const BUFFER_RING_SIZE_MASK: u32 = BUFFER_RING_SIZE - 1;
}

/// DNS constants
pub mod dns {
    pub const PORT: u16 = 53;
    pub const MAX_LENGTH: usize = 256;
    pub const HEADER_LEN: usize = 12;
    pub const A_RECORD: u16 = 1;
    /// Top two bits of a label length byte marking a compression pointer
    pub const COMPRESSION_FLAG: u8 = 3;
    pub const NAME_TABLE_ENTRIES: u32 = 512;
    pub const REQUEST_CACHE_ENTRIES: u32 = 1024;
    pub const PROGRAM_TABLE_ENTRIES: u32 = 100;
}

/// Connection tuple identifying a flow
///
/// Layout (48 bytes, 4-byte aligned):
/// - saddr/daddr: 128-bit address slots in network byte order. IPv4 addresses
///   occupy the last 4 bytes, the remaining 12 bytes are zero.
/// - sport/dport: ports in host byte order
/// - netns: network namespace id of the observing hook
/// - metadata: see [`conn`]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq, Hash))]
pub struct ConnTuple {
    pub saddr: [u8; 16],
    pub daddr: [u8; 16],
    pub sport: u16,
    pub dport: u16,
    pub netns: u32,
    pub metadata: u32,
    pub _pad: u32,
}

impl ConnTuple {
    /// Build an IPv4 tuple
    pub fn v4(saddr: [u8; 4], daddr: [u8; 4], sport: u16, dport: u16, metadata: u32) -> Self {
        let mut tup = Self {
            sport,
            dport,
            metadata: (metadata & conn::TYPE_TCP) | conn::V4,
            ..Self::default()
        };
        tup.set_saddr_v4(saddr);
        tup.set_daddr_v4(daddr);
        tup
    }

    /// Build an IPv6 tuple
    pub fn v6(saddr: [u8; 16], daddr: [u8; 16], sport: u16, dport: u16, metadata: u32) -> Self {
        Self {
            saddr,
            daddr,
            sport,
            dport,
            metadata: (metadata & conn::TYPE_TCP) | conn::V6,
            ..Self::default()
        }
    }

    pub fn is_tcp(&self) -> bool {
        self.metadata & conn::TYPE_TCP != 0
    }

    pub fn is_udp(&self) -> bool {
        !self.is_tcp()
    }

    pub fn is_v6(&self) -> bool {
        self.metadata & conn::V6 != 0
    }

    pub fn is_v4(&self) -> bool {
        !self.is_v6()
    }

    pub fn set_saddr_v4(&mut self, addr: [u8; 4]) {
        self.saddr = [0; 16];
        self.saddr[12..].copy_from_slice(&addr);
    }

    pub fn set_daddr_v4(&mut self, addr: [u8; 4]) {
        self.daddr = [0; 16];
        self.daddr[12..].copy_from_slice(&addr);
    }

    /// Source address from the low 32-bit slot
    pub fn saddr_v4(&self) -> [u8; 4] {
        [self.saddr[12], self.saddr[13], self.saddr[14], self.saddr[15]]
    }

    /// Destination address from the low 32-bit slot
    pub fn daddr_v4(&self) -> [u8; 4] {
        [self.daddr[12], self.daddr[13], self.daddr[14], self.daddr[15]]
    }

    /// Swap source and destination address and port in place
    pub fn flip(&mut self) {
        core::mem::swap(&mut self.sport, &mut self.dport);
        core::mem::swap(&mut self.saddr, &mut self.daddr);
    }

    /// Copy of this tuple as seen from the other direction
    pub fn flipped(&self) -> Self {
        let mut tup = *self;
        tup.flip();
        tup
    }
}

/// In-flight TLS classification state for one connection
///
/// `packets` guards against misclassification: once it passes
/// [`tls::MAX_PACKET_CLASSIFIER`] the flow is abandoned.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct TlsTransaction {
    pub tup: ConnTuple,
    pub is_tls: u8,
    pub packets: u8,
    pub handshake_done: u8,
    pub _pad: u8,
}

/// Snapshot of one pre-classification TLS packet payload
///
/// `len` is the observed payload length, which may exceed the bytes held in
/// `buffer` when the payload was truncated.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct TlsBuffer {
    pub tup: ConnTuple,
    pub len: u32,
    pub buffer: [u8; tls::BUFFER_SIZE],
}

impl TlsBuffer {
    /// Number of payload bytes actually held
    pub fn captured_len(&self) -> usize {
        (self.len as usize).min(tls::BUFFER_SIZE)
    }

    pub fn is_truncated(&self) -> bool {
        self.len as usize > tls::BUFFER_SIZE
    }

    pub fn captured(&self) -> &[u8] {
        &self.buffer[..self.captured_len()]
    }
}

impl Default for TlsBuffer {
    fn default() -> Self {
        Self {
            tup: ConnTuple::default(),
            len: 0,
            buffer: [0; tls::BUFFER_SIZE],
        }
    }
}

/// Head/tail indices of the TLS buffer ring
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct TlsBufferRingState {
    pub head: u32,
    pub tail: u32,
    pub full: u32,
}

/// A DNS name in wire format (length-prefixed labels), zero padded
#[repr(C)]
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq, Hash))]
pub struct DnsName {
    pub name: [u8; dns::MAX_LENGTH],
}

impl Default for DnsName {
    fn default() -> Self {
        Self {
            name: [0; dns::MAX_LENGTH],
        }
    }
}

/// Correlation key for a DNS request: IPv4 4-tuple plus transaction id
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq, Hash))]
pub struct DnsRequestKey {
    pub saddr: [u8; 4],
    pub daddr: [u8; 4],
    pub sport: u16,
    pub dport: u16,
    pub id: u16,
    pub _pad: u16,
}

/// Cached outcome of a DNS request
///
/// `name_len` is the presentation length of the queried name
/// (`example.com` is 11).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct DnsResolution {
    pub name_len: u32,
    pub addr: [u8; 4],
}

/// Key of the flow to pid table, populated by the control plane
///
/// An all-zero `addr` is the wildcard entry for sockets bound to any address.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq, Hash))]
pub struct FlowPidKey {
    pub addr: [u8; 16],
    pub port: u16,
    pub _pad: u16,
}

/// Process-wide counters read by the control plane
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(
    feature = "userspace",
    derive(PartialEq, Eq, serde::Serialize, serde::Deserialize)
)]
pub struct Telemetry {
    pub missed_tcp_close: u64,
    pub missed_udp_close: u64,
    pub udp_sends_processed: u64,
    pub udp_sends_missed: u64,
    pub conn_stats_max_entries_hit: u64,
    pub conntrack_registers: u64,
    pub conntrack_registers_dropped: u64,
    pub tls_buffer_ring_full: u64,
    pub dns_requests_cached: u64,
    pub dns_responses_correlated: u64,
}

/// Notification that a connection was seen carrying a TLS handshake
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct TlsHandshakeEvent {
    pub tup: ConnTuple,
    pub version: u16,
    pub content_type: u8,
    pub handshake_done: u8,
}

/// Notification that a DNS response matched a cached request
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "userspace", derive(PartialEq, Eq))]
pub struct DnsResolvedEvent {
    pub key: DnsRequestKey,
    pub resolution: DnsResolution,
}

#[cfg(feature = "userspace")]
const _: () = {
    assert!(
        core::mem::size_of::<ConnTuple>() == 48,
        "ConnTuple must be exactly 48 bytes"
    );
    assert!(
        core::mem::size_of::<TlsTransaction>() == 52,
        "TlsTransaction must be exactly 52 bytes"
    );
    assert!(
        core::mem::size_of::<TlsBufferRingState>() == 12,
        "TlsBufferRingState must be exactly 12 bytes"
    );
    assert!(
        core::mem::size_of::<DnsRequestKey>() == 16,
        "DnsRequestKey must be exactly 16 bytes"
    );
    assert!(
        core::mem::size_of::<DnsResolution>() == 8,
        "DnsResolution must be exactly 8 bytes"
    );
    assert!(
        core::mem::size_of::<Telemetry>() == 80,
        "Telemetry must be exactly 80 bytes"
    );
    assert!(
        core::mem::align_of::<Telemetry>() == 8,
        "Telemetry must be 8-byte aligned"
    );
    assert!(tls::BUFFER_RING_SIZE.is_power_of_two());
};
