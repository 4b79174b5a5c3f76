//! Synthetic frame construction for tests, benches and replay fixtures
//!
//! Fixture tooling only; the hooks never build frames.
//! Checksums are left zero; nothing in the classification path verifies them.

use bytes::{BufMut, Bytes, BytesMut};
use netsift_common::{
    protocol,
    wire::{ETH_P_IP, ETH_P_IPV6},
};

#[derive(Debug, Clone, Copy)]
enum Addrs {
    V4([u8; 4], [u8; 4]),
    V6([u8; 16], [u8; 16]),
}

/// Builds Ethernet frames carrying one TCP segment or UDP datagram
#[derive(Debug, Clone, Copy)]
pub struct FrameBuilder {
    addrs: Addrs,
    ip_options: usize,
    tcp_options: usize,
}

impl FrameBuilder {
    pub fn v4(src: [u8; 4], dst: [u8; 4]) -> Self {
        Self {
            addrs: Addrs::V4(src, dst),
            ip_options: 0,
            tcp_options: 0,
        }
    }

    pub fn v6(src: [u8; 16], dst: [u8; 16]) -> Self {
        Self {
            addrs: Addrs::V6(src, dst),
            ip_options: 0,
            tcp_options: 0,
        }
    }

    /// IPv4 option bytes, rounded up to a multiple of 4. Ignored for IPv6.
    pub fn ip_options(mut self, len: usize) -> Self {
        self.ip_options = len.div_ceil(4) * 4;
        self
    }

    /// TCP option bytes, rounded up to a multiple of 4
    pub fn tcp_options(mut self, len: usize) -> Self {
        self.tcp_options = len.div_ceil(4) * 4;
        self
    }

    pub fn tcp(&self, sport: u16, dport: u16, flags: u8, payload: &[u8]) -> Bytes {
        let hdr_len = 20 + self.tcp_options;
        let mut l4 = BytesMut::with_capacity(hdr_len + payload.len());
        l4.put_u16(sport);
        l4.put_u16(dport);
        l4.put_u32(1); // seq
        l4.put_u32(0); // ack_seq
        l4.put_u8(((hdr_len / 4) as u8) << 4);
        l4.put_u8(flags);
        l4.put_u16(u16::MAX); // window
        l4.put_u16(0); // check
        l4.put_u16(0); // urg_ptr
        l4.put_bytes(0x01, self.tcp_options); // NOP padding
        l4.put_slice(payload);
        self.wrap(protocol::TCP, &l4)
    }

    pub fn udp(&self, sport: u16, dport: u16, payload: &[u8]) -> Bytes {
        let mut l4 = BytesMut::with_capacity(8 + payload.len());
        l4.put_u16(sport);
        l4.put_u16(dport);
        l4.put_u16((8 + payload.len()) as u16);
        l4.put_u16(0);
        l4.put_slice(payload);
        self.wrap(protocol::UDP, &l4)
    }

    fn wrap(&self, proto: u8, l4: &[u8]) -> Bytes {
        let mut frame = BytesMut::with_capacity(14 + 40 + self.ip_options + l4.len());
        frame.put_slice(&[0x02, 0, 0, 0, 0, 0x02]); // dst mac
        frame.put_slice(&[0x02, 0, 0, 0, 0, 0x01]); // src mac
        match self.addrs {
            Addrs::V4(src, dst) => {
                let ihl = 20 + self.ip_options;
                frame.put_u16(ETH_P_IP);
                frame.put_u8(0x40 | (ihl / 4) as u8);
                frame.put_u8(0);
                frame.put_u16((ihl + l4.len()) as u16);
                frame.put_u16(0); // id
                frame.put_u16(0x4000); // DF
                frame.put_u8(64);
                frame.put_u8(proto);
                frame.put_u16(0);
                frame.put_slice(&src);
                frame.put_slice(&dst);
                frame.put_bytes(0x01, self.ip_options); // NOP
            }
            Addrs::V6(src, dst) => {
                frame.put_u16(ETH_P_IPV6);
                frame.put_u32(0x6000_0000);
                frame.put_u16(l4.len() as u16);
                frame.put_u8(proto);
                frame.put_u8(64);
                frame.put_slice(&src);
                frame.put_slice(&dst);
            }
        }
        frame.put_slice(l4);
        frame.freeze()
    }
}

fn put_name(buf: &mut BytesMut, name: &str) {
    for label in name.split('.').filter(|l| !l.is_empty()) {
        buf.put_u8(label.len() as u8);
        buf.put_slice(label.as_bytes());
    }
    buf.put_u8(0);
}

/// DNS query message with one question (recursion desired)
pub fn dns_query(id: u16, name: &str, qtype: u16) -> Bytes {
    let mut msg = BytesMut::with_capacity(12 + name.len() + 6);
    msg.put_u16(id);
    msg.put_u16(0x0100);
    msg.put_u16(1); // qdcount
    msg.put_u16(0);
    msg.put_u16(0);
    msg.put_u16(0);
    put_name(&mut msg, name);
    msg.put_u16(qtype);
    msg.put_u16(1); // IN
    msg.freeze()
}

/// DNS response echoing the question with a single A answer
pub fn dns_response(id: u16, name: &str, addr: [u8; 4]) -> Bytes {
    let mut msg = BytesMut::with_capacity(12 + name.len() + 22);
    msg.put_u16(id);
    msg.put_u16(0x8180);
    msg.put_u16(1);
    msg.put_u16(1); // ancount
    msg.put_u16(0);
    msg.put_u16(0);
    put_name(&mut msg, name);
    msg.put_u16(1);
    msg.put_u16(1);
    msg.put_u16(0xc00c); // pointer to the question name
    msg.put_u16(1);
    msg.put_u16(1);
    msg.put_u32(300);
    msg.put_u16(4);
    msg.put_slice(&addr);
    msg.freeze()
}
