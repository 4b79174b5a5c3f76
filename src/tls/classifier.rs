//! Per-connection TLS state machine
//!
//! ```text
//! Unseen --first payload--> InProgress --app data--> ClassifiedTls
//!                               |
//!                               +--more than MAX_PACKET_CLASSIFIER packets-->
//!                                     ClassifiedNonTls | Abandoned
//! ```
//!
//! A FIN in either direction removes the connection so a reused tuple starts
//! over from `Unseen`.

use super::{recognize, TlsRecordHeader};
use crate::events::{EventBus, FlowEvent};
use crate::maps::InsertOutcome;
use crate::parser::Packet;
use crate::state::FlowState;
use crate::telemetry::TelemetryCounter;
use crate::tuple::{self, PacketInfo};
use netsift_common::{
    tcp_flags,
    tls::MAX_PACKET_CLASSIFIER,
    ConnTuple, TlsHandshakeEvent, TlsTransaction,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// What one packet did to its connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsStep {
    /// FIN seen, connection state removed
    Closed,
    /// No payload, nothing changed
    Empty,
    /// Classification already finished, nothing changed
    Settled,
    /// Connection table full, packet ignored
    Untracked,
    /// Payload is not a TLS record
    Unrecognized { buffered: Option<u32> },
    /// Payload is a TLS record but the buffer ring was full, so the
    /// connection was not marked
    Deferred { record: TlsRecordHeader },
    /// Payload is a TLS record and the connection is marked TLS
    Recognized {
        record: TlsRecordHeader,
        handshake_done: bool,
        buffered: Option<u32>,
    },
}

/// Classification state of one tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsState {
    Unseen,
    InProgress {
        is_tls: bool,
        packets: u8,
    },
    ClassifiedTls,
    /// Packet ceiling reached without ever seeing a TLS record
    ClassifiedNonTls,
    /// Packet ceiling reached after a TLS record but before application data
    Abandoned,
}

impl From<&TlsTransaction> for TlsState {
    fn from(tls: &TlsTransaction) -> Self {
        if tls.is_tls != 0 && tls.handshake_done != 0 {
            TlsState::ClassifiedTls
        } else if tls.packets > MAX_PACKET_CLASSIFIER {
            if tls.is_tls != 0 {
                TlsState::Abandoned
            } else {
                TlsState::ClassifiedNonTls
            }
        } else {
            TlsState::InProgress {
                is_tls: tls.is_tls != 0,
                packets: tls.packets,
            }
        }
    }
}

pub struct TlsClassifier {
    state: Arc<FlowState>,
    events: EventBus,
}

impl TlsClassifier {
    pub fn new(state: Arc<FlowState>, events: EventBus) -> Self {
        Self { state, events }
    }

    pub fn state_of(&self, tup: &ConnTuple) -> TlsState {
        self.state
            .tls_in_flight
            .get(tup)
            .map(|tls| TlsState::from(&tls))
            .unwrap_or(TlsState::Unseen)
    }

    /// Advance the connection of one TCP packet
    pub fn process(&self, packet: &Packet<'_>, info: &PacketInfo) -> TlsStep {
        let in_flight = &self.state.tls_in_flight;
        let tup = info.tup;

        if info.tcp_flags & tcp_flags::FIN != 0 {
            in_flight.remove(&tup);
            in_flight.remove(&tup.flipped());
            trace!("{} closed", tuple::display(&tup));
            return TlsStep::Closed;
        }

        let payload = info.payload(packet);
        if payload.is_empty() {
            return TlsStep::Empty;
        }

        match in_flight.insert_if_absent(tup, TlsTransaction::default()) {
            InsertOutcome::Inserted => {
                self.state
                    .telemetry
                    .increment(TelemetryCounter::ConntrackRegisters);
            }
            InsertOutcome::Exists => {}
            InsertOutcome::Full => {
                self.state
                    .telemetry
                    .increment(TelemetryCounter::ConntrackRegistersDropped);
                debug!("{} not tracked: {} is full", tuple::display(&tup), in_flight.name());
                return TlsStep::Untracked;
            }
        }

        let Some((step, event)) = in_flight.update(&tup, |tls| self.advance(tls, &tup, payload))
        else {
            // closed by a racing FIN between insert and update
            return TlsStep::Untracked;
        };

        if let Some(event) = event {
            debug!(
                "{} tls version {:#06x} handshake_done={}",
                tuple::display(&tup),
                event.version,
                event.handshake_done
            );
            self.events.publish(FlowEvent::TlsHandshake(event));
        }
        step
    }

    fn advance(
        &self,
        tls: &mut TlsTransaction,
        tup: &ConnTuple,
        payload: &[u8],
    ) -> (TlsStep, Option<TlsHandshakeEvent>) {
        if (tls.is_tls != 0 && tls.handshake_done != 0) || tls.packets > MAX_PACKET_CLASSIFIER {
            return (TlsStep::Settled, None);
        }
        tls.packets = tls.packets.saturating_add(1);

        let Some(record) = recognize(payload) else {
            let buffered = if tls.is_tls != 0 && tls.handshake_done == 0 {
                self.buffer(tup, payload)
            } else {
                None
            };
            return (TlsStep::Unrecognized { buffered }, None);
        };

        let was_tls = tls.is_tls != 0;
        let was_done = tls.handshake_done != 0;
        if record.is_application_data() {
            tls.handshake_done = 1;
        }

        let mut buffered = None;
        if tls.handshake_done == 0 {
            buffered = self.buffer(tup, payload);
            if buffered.is_none() {
                return (TlsStep::Deferred { record }, None);
            }
        }

        tls.tup = *tup;
        tls.is_tls = 1;

        let handshake_done = tls.handshake_done != 0;
        let event = (!was_tls || (handshake_done && !was_done)).then(|| TlsHandshakeEvent {
            tup: *tup,
            version: record.version,
            content_type: record.content_type,
            handshake_done: tls.handshake_done,
        });

        (
            TlsStep::Recognized {
                record,
                handshake_done,
                buffered,
            },
            event,
        )
    }

    fn buffer(&self, tup: &ConnTuple, payload: &[u8]) -> Option<u32> {
        let slot = self.state.tls_ring.push(tup, payload);
        if slot.is_none() {
            self.state
                .telemetry
                .increment(TelemetryCounter::TlsBufferRingFull);
            trace!("{} tls buffer ring full", tuple::display(tup));
        }
        slot
    }
}
