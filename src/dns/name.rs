//! DNS names and question parsing
//!
//! Names are kept in wire form (length-prefixed labels ending in a zero
//! byte) inside a zero-padded [`DnsName`], which makes two names equal
//! exactly when their wire bytes are equal. Case is not folded.

use crate::parser::{Cursor, DnsHdr};
use netsift_common::{
    dns::{COMPRESSION_FLAG, MAX_LENGTH},
    DnsName,
};

const MAX_LABEL: usize = 63;

/// Encode a dotted name. A trailing dot is accepted; the empty string and
/// `"."` are the root. Returns `None` for empty inner labels, labels longer
/// than 63 bytes, or names that do not fit in [`MAX_LENGTH`] bytes.
pub fn from_dotted(name: &str) -> Option<DnsName> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    let mut out = DnsName::default();
    let mut pos = 0;

    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            let bytes = label.as_bytes();
            if bytes.is_empty() || bytes.len() > MAX_LABEL {
                return None;
            }
            // label, its length byte, and room for the terminator
            if pos + 1 + bytes.len() + 1 > MAX_LENGTH {
                return None;
            }
            out.name[pos] = bytes.len() as u8;
            out.name[pos + 1..pos + 1 + bytes.len()].copy_from_slice(bytes);
            pos += 1 + bytes.len();
        }
    }
    // terminator is already zero
    Some(out)
}

/// Bytes up to and including the terminating zero label
pub fn wire_len(name: &DnsName) -> usize {
    let mut pos = 0;
    while pos < MAX_LENGTH {
        let len = name.name[pos] as usize;
        if len == 0 {
            return pos + 1;
        }
        pos += 1 + len;
    }
    MAX_LENGTH
}

/// Length of the dotted form without a trailing dot
pub fn presentation_len(name: &DnsName) -> usize {
    wire_len(name).saturating_sub(2)
}

pub fn to_dotted(name: &DnsName) -> String {
    let mut labels = Vec::new();
    let mut pos = 0;
    while pos < MAX_LENGTH {
        let len = name.name[pos] as usize;
        if len == 0 {
            break;
        }
        let end = (pos + 1 + len).min(MAX_LENGTH);
        labels.push(String::from_utf8_lossy(&name.name[pos + 1..end]).into_owned());
        pos += 1 + len;
    }
    labels.join(".")
}

/// The first question of a DNS message
#[derive(Debug, Clone, Copy)]
pub struct DnsQuestion {
    pub header: DnsHdr,
    pub name: DnsName,
    /// Wire bytes of `name`, terminator included
    pub wire_len: usize,
    pub qtype: u16,
    pub qclass: u16,
}

impl DnsQuestion {
    pub fn id(&self) -> u16 {
        self.header.id()
    }

    pub fn name_len(&self) -> usize {
        self.wire_len.saturating_sub(2)
    }
}

/// Parse the header and first question at the cursor.
///
/// The name scan is bounded to [`MAX_LENGTH`] bytes. Compression pointers
/// and the reserved label types are rejected, as is a name whose
/// terminator is not found within the bound.
pub fn parse_question(cursor: &mut Cursor<'_>) -> Option<DnsQuestion> {
    let header = *cursor.parse_dnshdr()?;

    let mut name = DnsName::default();
    let mut wire_len = 0;
    let mut label_left = 0u8;
    let mut terminated = false;

    for i in 0..MAX_LENGTH {
        let b = cursor.read_u8()?;
        name.name[i] = b;
        wire_len += 1;

        if label_left > 0 {
            label_left -= 1;
            continue;
        }
        if b == 0 {
            terminated = true;
            break;
        }
        match b >> 6 {
            0 => label_left = b,
            COMPRESSION_FLAG => return None,
            // 0b01 and 0b10 are reserved
            _ => return None,
        }
    }
    if !terminated {
        return None;
    }

    let qtype = cursor.read_u16_be()?;
    let qclass = cursor.read_u16_be()?;
    Some(DnsQuestion {
        header,
        name,
        wire_len,
        qtype,
        qclass,
    })
}
