//! Hook entry points
//!
//! Each hook extracts the tuple once and hands the packet to the TLS
//! classifier (TCP) or the DNS correlator (UDP on the DNS port). Packets
//! that are not ours, or are malformed, always pass.

use crate::config::{dns_name, Config};
use crate::dns::{allow_list, DnsCorrelator, DnsProgramTable};
use crate::events::{EventBus, FlowEvent};
use crate::parser::Packet;
use crate::state::FlowState;
use crate::telemetry::{TelemetryCounter, TelemetryExporter};
use crate::tls::{TlsClassifier, TlsState, TlsStep};
use crate::tuple::{self, PacketInfo};
use crate::Result;
use netsift_common::{ConnTuple, DnsResolution, Telemetry};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Accept,
    Drop,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accept => write!(f, "ACCEPT"),
            Verdict::Drop => write!(f, "DROP"),
        }
    }
}

/// Per-invocation context supplied by the attach point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookContext {
    /// Network namespace of the interface or socket
    pub netns: u32,
}

impl HookContext {
    pub fn new(netns: u32) -> Self {
        Self { netns }
    }
}

pub struct Engine {
    state: Arc<FlowState>,
    tls: TlsClassifier,
    dns: DnsCorrelator,
    events: EventBus,
    dns_port: u16,
}

impl Engine {
    /// Engine with the allow-list programs and seed tables from `config`
    pub fn new(config: &Config) -> Result<Self> {
        let mut programs = DnsProgramTable::new();
        for program in &config.dns.programs {
            let names = program
                .allow
                .iter()
                .map(|name| dns_name(name))
                .collect::<Result<Vec<_>>>()?;
            programs.register(program.id, allow_list(names))?;
        }

        let engine = Self::with_programs(config, programs)?;
        engine.state.seed_from_config(config)?;
        Ok(engine)
    }

    /// Engine with caller-supplied programs and empty tables
    pub fn with_programs(config: &Config, programs: DnsProgramTable) -> Result<Self> {
        let state = Arc::new(FlowState::new(config)?);
        let events = EventBus::new(config.events.channel_capacity);
        let programs = Arc::new(programs);

        info!(
            "Engine ready: dns port {}, {} dns programs, process rules {}",
            config.dns.port,
            programs.len(),
            if config.dns.enforce_process_rules {
                "enforced"
            } else {
                "off"
            }
        );

        Ok(Self {
            tls: TlsClassifier::new(state.clone(), events.clone()),
            dns: DnsCorrelator::new(
                state.clone(),
                programs,
                events.clone(),
                config.dns.enforce_process_rules,
            ),
            state,
            events,
            dns_port: config.dns.port,
        })
    }

    pub fn state(&self) -> &Arc<FlowState> {
        &self.state
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.events.subscribe()
    }

    pub fn telemetry(&self) -> Telemetry {
        self.state.telemetry.snapshot()
    }

    pub fn exporter(&self) -> TelemetryExporter {
        TelemetryExporter::new(self.state.telemetry.clone())
    }

    pub fn tls_state(&self, tup: &ConnTuple) -> TlsState {
        self.tls.state_of(tup)
    }

    fn classify(packet: &Packet<'_>, ctx: HookContext) -> Option<PacketInfo> {
        let mut info = tuple::extract(packet)?;
        info.tup.netns = ctx.netns;
        Some(info)
    }

    fn tcp(&self, packet: &Packet<'_>, info: &PacketInfo) -> TlsStep {
        let step = self.tls.process(packet, info);
        trace!("{} {:?}", tuple::display(&info.tup), step);
        step
    }

    /// Traffic-control ingress: TLS classification and DNS responses
    pub fn ingress(&self, packet: &Packet<'_>, ctx: HookContext) -> Verdict {
        let Some(info) = Self::classify(packet, ctx) else {
            return Verdict::Accept;
        };

        if info.tup.is_tcp() {
            self.tcp(packet, &info);
        } else if info.tup.sport == self.dns_port {
            self.dns.handle_response(packet, &info);
        }
        Verdict::Accept
    }

    /// Traffic-control egress: TLS classification and DNS queries. Only a
    /// DNS query rejected by its process's program is dropped.
    pub fn egress(&self, packet: &Packet<'_>, ctx: HookContext) -> Verdict {
        let Some(info) = Self::classify(packet, ctx) else {
            return Verdict::Accept;
        };

        if info.tup.is_tcp() {
            self.tcp(packet, &info);
            return Verdict::Accept;
        }

        self.state
            .telemetry
            .increment(TelemetryCounter::UdpSendProcessed);
        if info.tup.dport != self.dns_port {
            return Verdict::Accept;
        }

        let verdict = self.dns.handle_query(packet, &info);
        if verdict == Verdict::Drop {
            debug!("{} dns query dropped", tuple::display(&info.tup));
        }
        verdict
    }

    /// Socket filter: cached resolution lookup for DNS traffic. TCP is
    /// classified at the tc hooks only. Never drops and never mutates flow
    /// state.
    pub fn socket(&self, packet: &Packet<'_>, ctx: HookContext) -> Verdict {
        let Some(info) = Self::classify(packet, ctx) else {
            return Verdict::Accept;
        };

        if !info.tup.is_udp() {
            return Verdict::Accept;
        }
        if let Some(resolution) = self.resolution_of(packet, &info) {
            trace!(
                "{} resolves to {:?} (name length {})",
                tuple::display(&info.tup),
                resolution.addr,
                resolution.name_len
            );
        }
        Verdict::Accept
    }

    fn resolution_of(&self, packet: &Packet<'_>, info: &PacketInfo) -> Option<DnsResolution> {
        if info.tup.dport != self.dns_port && info.tup.sport != self.dns_port {
            return None;
        }
        self.dns.lookup(packet, info, self.dns_port)
    }

    /// Cached resolution for the DNS query or response in `packet`
    pub fn dns_lookup(&self, packet: &Packet<'_>) -> Option<DnsResolution> {
        let info = tuple::extract(packet)?;
        if !info.tup.is_udp() {
            return None;
        }
        self.resolution_of(packet, &info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{dns_query, FrameBuilder};
    use netsift_common::{dns::A_RECORD, tcp_flags};

    #[test]
    fn test_non_ip_frame_passes() {
        let engine = Engine::new(&Config::default()).unwrap();
        let mut frame = vec![0u8; 60];
        frame[12] = 0x08;
        frame[13] = 0x06; // ARP
        let packet = Packet::new(&frame);

        assert_eq!(engine.ingress(&packet, HookContext::default()), Verdict::Accept);
        assert_eq!(engine.egress(&packet, HookContext::default()), Verdict::Accept);
        assert_eq!(engine.socket(&packet, HookContext::default()), Verdict::Accept);
        assert_eq!(engine.telemetry(), Telemetry::default());
    }

    #[test]
    fn test_netns_is_part_of_the_key() {
        let engine = Engine::new(&Config::default()).unwrap();
        let frame = FrameBuilder::v4([10, 0, 0, 5], [10, 0, 0, 1]).tcp(
            40000,
            443,
            tcp_flags::ACK,
            &[0x16, 0x03, 0x01, 0x00, 0x00],
        );
        let packet = Packet::new(&frame);
        engine.egress(&packet, HookContext::new(1));
        engine.egress(&packet, HookContext::new(2));

        assert_eq!(engine.state().tls_in_flight.len(), 2);
        let mut tup = tuple::extract(&packet).unwrap().tup;
        tup.netns = 2;
        assert!(matches!(engine.tls_state(&tup), TlsState::InProgress { .. }));
    }

    #[test]
    fn test_egress_udp_is_counted() {
        let engine = Engine::new(&Config::default()).unwrap();
        let builder = FrameBuilder::v4([10, 0, 0, 5], [10, 0, 0, 1]);
        let other = builder.udp(5000, 6000, b"x");
        let truncated_dns = builder.udp(53124, 53, &[0x12, 0x34]);

        engine.egress(&Packet::new(&other), HookContext::default());
        engine.egress(&Packet::new(&truncated_dns), HookContext::default());

        let t = engine.telemetry();
        assert_eq!(t.udp_sends_processed, 2);
        assert_eq!(t.udp_sends_missed, 1);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Accept.to_string(), "ACCEPT");
        assert_eq!(Verdict::Drop.to_string(), "DROP");
    }

    #[test]
    fn test_dns_lookup_ignores_tcp() {
        let engine = Engine::new(&Config::default()).unwrap();
        let frame = FrameBuilder::v4([10, 0, 0, 5], [10, 0, 0, 1]).tcp(
            53124,
            53,
            tcp_flags::ACK,
            &dns_query(1, "example.com", A_RECORD),
        );
        assert!(engine.dns_lookup(&Packet::new(&frame)).is_none());
    }
}
