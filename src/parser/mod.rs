//! Bounds-checked sequential reader over packet bytes
//!
//! `Cursor` is the only place that turns packet bytes into typed headers.
//! Every `parse_*` call checks that the whole header fits in `[pos, end)`;
//! when it does not, the call returns `None` and the cursor does not move.

pub mod headers;

pub use headers::{DnsHdr, EthHdr, Header, Ipv4Hdr, Ipv6Hdr, TcpHdr, UdpHdr};

/// Immutable view over one captured packet
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    data: &'a [u8],
    len: usize,
}

impl<'a> Packet<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            len: data.len(),
        }
    }

    /// View with a declared length shorter than the backing bytes
    /// (e.g. a linear header area). Never extends past `data`.
    pub fn with_len(data: &'a [u8], len: usize) -> Self {
        Self {
            data,
            len: len.min(data.len()),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &'a [u8] {
        &self.data[..self.len]
    }

    /// Bytes from `offset` to the declared end, empty if out of range
    pub fn slice_from(&self, offset: usize) -> &'a [u8] {
        self.bytes().get(offset..).unwrap_or(&[])
    }

    pub fn cursor(&self) -> Cursor<'a> {
        Cursor::new(self.bytes())
    }
}

macro_rules! parse_func {
    ($name:ident, $hdr:ty) => {
        #[inline]
        pub fn $name(&mut self) -> Option<&'a $hdr> {
            self.parse::<$hdr>()
        }
    };
}

#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Cursor starting at `pos`; `None` if `pos` is past the end
    pub fn at(buf: &'a [u8], pos: usize) -> Option<Self> {
        if pos > buf.len() {
            return None;
        }
        Some(Self { buf, pos })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Unread bytes
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Typed view of the next header, advancing past it
    pub fn parse<H: Header>(&mut self) -> Option<&'a H> {
        if H::LEN > self.remaining() {
            return None;
        }
        let bytes = &self.buf[self.pos..self.pos + H::LEN];
        // SAFETY: the Header contract guarantees alignment 1 and that every
        // byte pattern is a valid H; `bytes` holds exactly H::LEN bytes.
        let hdr = unsafe { &*(bytes.as_ptr() as *const H) };
        self.pos += H::LEN;
        Some(hdr)
    }

    parse_func!(parse_ethhdr, EthHdr);
    parse_func!(parse_iphdr, Ipv4Hdr);
    parse_func!(parse_ipv6hdr, Ipv6Hdr);
    parse_func!(parse_tcphdr, TcpHdr);
    parse_func!(parse_udphdr, UdpHdr);
    parse_func!(parse_dnshdr, DnsHdr);

    /// Skip `n` bytes. Fails without moving if fewer remain.
    pub fn advance(&mut self, n: usize) -> Option<()> {
        if n > self.remaining() {
            return None;
        }
        self.pos += n;
        Some(())
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    pub fn read_u16_be(&mut self) -> Option<u16> {
        let bytes = self.buf.get(self.pos..self.pos + 2)?;
        self.pos += 2;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }
}
