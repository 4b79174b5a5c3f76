//! TLS detection on TCP flows
//!
//! Only the 5-byte record header is inspected; payloads are never decrypted.

pub mod classifier;
pub mod ring;

pub use classifier::{TlsClassifier, TlsState, TlsStep};
pub use ring::TlsBufferRing;

use netsift_common::tls::{
    CONTENT_APPLICATION_DATA, CONTENT_HANDSHAKE, HEADER_SIZE, TLS_VERSION10, TLS_VERSION11,
    TLS_VERSION12,
};

/// Decoded TLS record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsRecordHeader {
    pub content_type: u8,
    pub version: u16,
    pub length: u16,
}

impl TlsRecordHeader {
    pub fn is_handshake(&self) -> bool {
        self.content_type == CONTENT_HANDSHAKE
    }

    pub fn is_application_data(&self) -> bool {
        self.content_type == CONTENT_APPLICATION_DATA
    }
}

/// Recognise a TLS record at the start of `payload`.
///
/// Accepts handshake and application-data records with a TLS 1.0, 1.1 or
/// 1.2 record version whose declared length fits in the rest of the
/// payload. Alerts, SSLv3 and 0x0304 record versions are not recognised,
/// and records split across segments are rejected rather than reassembled.
pub fn recognize(payload: &[u8]) -> Option<TlsRecordHeader> {
    if payload.len() < HEADER_SIZE {
        return None;
    }

    let content_type = payload[0];
    if content_type != CONTENT_HANDSHAKE && content_type != CONTENT_APPLICATION_DATA {
        return None;
    }

    let version = u16::from_be_bytes([payload[1], payload[2]]);
    if !matches!(version, TLS_VERSION10 | TLS_VERSION11 | TLS_VERSION12) {
        return None;
    }

    let length = u16::from_be_bytes([payload[3], payload[4]]);
    if (length as usize) > payload.len() - HEADER_SIZE {
        return None;
    }

    Some(TlsRecordHeader {
        content_type,
        version,
        length,
    })
}
