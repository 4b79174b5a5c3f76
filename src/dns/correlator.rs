use super::name::{parse_question, DnsQuestion};
use super::programs::{DnsEvalContext, DnsProgramTable};
use crate::events::{EventBus, FlowEvent};
use crate::parser::Packet;
use crate::pipeline::Verdict;
use crate::state::FlowState;
use crate::telemetry::TelemetryCounter;
use crate::tuple::{self, PacketInfo};
use netsift_common::{ConnTuple, DnsRequestKey, DnsResolution, DnsResolvedEvent, FlowPidKey};
use std::sync::Arc;
use tracing::{debug, trace};

/// Correlation key of a query as seen on egress
pub fn request_key(tup: &ConnTuple, id: u16) -> DnsRequestKey {
    DnsRequestKey {
        saddr: tup.saddr_v4(),
        daddr: tup.daddr_v4(),
        sport: tup.sport,
        dport: tup.dport,
        id,
        _pad: 0,
    }
}

/// Caches outbound queries for names of interest and matches responses to
/// them. With process rules enforced, the owning process's program decides
/// whether the query leaves the host.
pub struct DnsCorrelator {
    state: Arc<FlowState>,
    programs: Arc<DnsProgramTable>,
    events: EventBus,
    enforce: bool,
}

impl DnsCorrelator {
    pub fn new(
        state: Arc<FlowState>,
        programs: Arc<DnsProgramTable>,
        events: EventBus,
        enforce: bool,
    ) -> Self {
        Self {
            state,
            programs,
            events,
            enforce,
        }
    }

    fn question(packet: &Packet<'_>, info: &PacketInfo) -> Option<DnsQuestion> {
        let mut cursor = info.payload_cursor(packet)?;
        parse_question(&mut cursor)
    }

    /// Owning pid of the flow's source socket, falling back to the
    /// any-address entry for the same port
    pub fn resolve_pid(&self, tup: &ConnTuple) -> Option<u32> {
        let mut key = FlowPidKey {
            addr: tup.saddr,
            port: tup.sport,
            _pad: 0,
        };
        if let Some(pid) = self.state.flow_pids.get(&key) {
            return Some(pid);
        }
        key.addr = [0; 16];
        self.state.flow_pids.get(&key)
    }

    /// Egress query. Only IPv4 queries are inspected.
    pub fn handle_query(&self, packet: &Packet<'_>, info: &PacketInfo) -> Verdict {
        let tup = &info.tup;
        if !tup.is_v4() {
            return Verdict::Accept;
        }

        let Some(question) = Self::question(packet, info) else {
            self.state
                .telemetry
                .increment(TelemetryCounter::UdpSendMissed);
            trace!("{} malformed dns query", tuple::display(tup));
            return Verdict::Accept;
        };

        let pid = if self.enforce {
            match self.resolve_pid(tup) {
                Some(pid) => Some(pid),
                None => {
                    trace!("{} no owning process", tuple::display(tup));
                    return Verdict::Accept;
                }
            }
        } else {
            None
        };

        self.cache(tup, &question);

        match pid {
            Some(pid) => self.evaluate(pid, tup, &question),
            None => Verdict::Accept,
        }
    }

    fn cache(&self, tup: &ConnTuple, question: &DnsQuestion) {
        let Some(addr) = self.state.dns_names.get(&question.name) else {
            return;
        };

        let key = request_key(tup, question.id());
        let resolution = DnsResolution {
            name_len: u32::try_from(question.name_len()).unwrap_or(u32::MAX),
            addr,
        };
        let telemetry = &self.state.telemetry;
        if self.state.dns_requests.insert(key, resolution).is_some() {
            telemetry.increment(TelemetryCounter::ConnStatsMaxEntriesHit);
        }
        telemetry.increment(TelemetryCounter::DnsRequestsCached);
        debug!(
            "{} cached dns request id={:#06x}",
            tuple::display(tup),
            question.id()
        );
    }

    fn evaluate(&self, pid: u32, tup: &ConnTuple, question: &DnsQuestion) -> Verdict {
        let Some(program) = self.state.pid_programs.get(&pid) else {
            debug!("{} pid {} has no dns program, dropping", tuple::display(tup), pid);
            return Verdict::Drop;
        };

        let ctx = DnsEvalContext {
            pid,
            tup,
            question,
        };
        self.programs.dispatch(program, &ctx).unwrap_or_else(|| {
            trace!("dns program {} not installed", program);
            Verdict::Accept
        })
    }

    /// Cached resolution for the query this packet belongs to. Queries are
    /// matched as-is, responses (source port `dns_port`) by their flipped
    /// tuple. Does not refresh recency.
    pub fn lookup(&self, packet: &Packet<'_>, info: &PacketInfo, dns_port: u16) -> Option<DnsResolution> {
        if !info.tup.is_v4() {
            return None;
        }
        let mut cursor = info.payload_cursor(packet)?;
        let header = cursor.parse_dnshdr()?;
        let tup = if info.tup.sport == dns_port {
            info.tup.flipped()
        } else {
            info.tup
        };
        self.state.dns_requests.peek(&request_key(&tup, header.id()))
    }

    /// Ingress response. Returns the cached resolution of the matching query.
    pub fn handle_response(&self, packet: &Packet<'_>, info: &PacketInfo) -> Option<DnsResolution> {
        if !info.tup.is_v4() {
            return None;
        }
        let mut cursor = info.payload_cursor(packet)?;
        let header = cursor.parse_dnshdr()?;
        if !header.qr() {
            return None;
        }

        let key = request_key(&info.tup.flipped(), header.id());
        let resolution = self.state.dns_requests.get(&key)?;
        self.state
            .telemetry
            .increment(TelemetryCounter::DnsResponsesCorrelated);
        self.events
            .publish(FlowEvent::DnsResolved(DnsResolvedEvent { key, resolution }));
        debug!(
            "{} matched dns request id={:#06x}",
            tuple::display(&info.tup),
            key.id
        );
        Some(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dns::{allow_list, from_dotted};
    use crate::frame::{dns_query, dns_response, FrameBuilder};
    use crate::tuple::extract;
    use netsift_common::dns::A_RECORD;

    const CLIENT: [u8; 4] = [10, 0, 0, 5];
    const RESOLVER: [u8; 4] = [10, 0, 0, 1];

    fn correlator(enforce: bool) -> (DnsCorrelator, Arc<FlowState>) {
        let state = Arc::new(FlowState::new(&Config::default()).unwrap());
        state
            .dns_names
            .insert(from_dotted("example.com").unwrap(), [93, 184, 216, 34]);

        let mut programs = DnsProgramTable::new();
        programs
            .register(1, allow_list([from_dotted("example.com").unwrap()]))
            .unwrap();

        let c = DnsCorrelator::new(state.clone(), Arc::new(programs), EventBus::new(8), enforce);
        (c, state)
    }

    fn query(name: &str, id: u16) -> bytes::Bytes {
        FrameBuilder::v4(CLIENT, RESOLVER).udp(53124, 53, &dns_query(id, name, A_RECORD))
    }

    fn run_query(c: &DnsCorrelator, frame: &[u8]) -> Verdict {
        let packet = Packet::new(frame);
        let info = extract(&packet).unwrap();
        c.handle_query(&packet, &info)
    }

    fn own_port(state: &FlowState, addr: [u8; 16], pid: u32) {
        let key = FlowPidKey {
            addr,
            port: 53124,
            _pad: 0,
        };
        state.flow_pids.insert(key, pid);
    }

    #[test]
    fn test_query_for_known_name_is_cached() {
        let (c, state) = correlator(false);
        assert_eq!(run_query(&c, &query("example.com", 0x1234)), Verdict::Accept);

        let key = DnsRequestKey {
            saddr: CLIENT,
            daddr: RESOLVER,
            sport: 53124,
            dport: 53,
            id: 0x1234,
            _pad: 0,
        };
        assert_eq!(
            state.dns_requests.peek(&key),
            Some(DnsResolution {
                name_len: 11,
                addr: [93, 184, 216, 34]
            })
        );
        assert_eq!(state.telemetry.get(TelemetryCounter::DnsRequestsCached), 1);
    }

    #[test]
    fn test_query_for_unknown_name_is_not_cached() {
        let (c, state) = correlator(false);
        assert_eq!(run_query(&c, &query("example.org", 1)), Verdict::Accept);
        assert!(state.dns_requests.is_empty());
    }

    #[test]
    fn test_decisions_log_the_tuple() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let (c, state) = correlator(true);
            let malformed = FrameBuilder::v4(CLIENT, RESOLVER).udp(53124, 53, &[0x12]);
            assert_eq!(run_query(&c, &malformed), Verdict::Accept);
            assert_eq!(run_query(&c, &query("example.com", 1)), Verdict::Accept);

            own_port(&state, [0; 16], 7);
            assert_eq!(run_query(&c, &query("example.com", 2)), Verdict::Drop);
            assert_eq!(state.telemetry.get(TelemetryCounter::UdpSendMissed), 1);
        });
    }

    #[test]
    fn test_pid_wildcard_fallback() {
        let (c, state) = correlator(true);
        own_port(&state, [0; 16], 99);

        let tup = ConnTuple::v4(CLIENT, RESOLVER, 53124, 53, 0);
        assert_eq!(c.resolve_pid(&tup), Some(99));

        let mut exact = [0; 16];
        exact[12..].copy_from_slice(&CLIENT);
        own_port(&state, exact, 100);
        assert_eq!(c.resolve_pid(&tup), Some(100));
    }

    #[test]
    fn test_enforcement_paths() {
        let (c, state) = correlator(true);

        // no owning process: pass, and nothing is cached
        assert_eq!(run_query(&c, &query("example.com", 1)), Verdict::Accept);
        assert!(state.dns_requests.is_empty());

        // owning process without a rule: drop, but the request is cached
        own_port(&state, [0; 16], 7);
        assert_eq!(run_query(&c, &query("example.com", 2)), Verdict::Drop);
        assert_eq!(state.dns_requests.len(), 1);

        // rule pointing at the allow-list program
        state.pid_programs.insert(7, 1);
        assert_eq!(run_query(&c, &query("example.com", 3)), Verdict::Accept);
        assert_eq!(run_query(&c, &query("example.org", 4)), Verdict::Drop);

        // rule pointing at a program that is not installed
        state.pid_programs.insert(7, 42);
        assert_eq!(run_query(&c, &query("example.org", 5)), Verdict::Accept);
    }

    #[test]
    fn test_response_is_correlated() {
        let (c, state) = correlator(false);
        let mut rx = c.events.subscribe();
        run_query(&c, &query("example.com", 0x1234));

        let frame = FrameBuilder::v4(RESOLVER, CLIENT).udp(
            53,
            53124,
            &dns_response(0x1234, "example.com", [93, 184, 216, 34]),
        );
        let packet = Packet::new(&frame);
        let info = extract(&packet).unwrap();

        let resolution = c.handle_response(&packet, &info).unwrap();
        assert_eq!(resolution.addr, [93, 184, 216, 34]);
        assert_eq!(
            state.telemetry.get(TelemetryCounter::DnsResponsesCorrelated),
            1
        );
        assert!(matches!(rx.try_recv(), Ok(FlowEvent::DnsResolved(e)) if e.key.id == 0x1234));
        assert_eq!(c.lookup(&packet, &info, 53), Some(resolution));
    }

    #[test]
    fn test_response_with_other_id_is_ignored() {
        let (c, _) = correlator(false);
        run_query(&c, &query("example.com", 0x1234));

        let frame = FrameBuilder::v4(RESOLVER, CLIENT).udp(
            53,
            53124,
            &dns_response(0x4321, "example.com", [93, 184, 216, 34]),
        );
        let packet = Packet::new(&frame);
        let info = extract(&packet).unwrap();
        assert!(c.handle_response(&packet, &info).is_none());
    }

    #[test]
    fn test_ipv6_query_passes_untouched() {
        let (c, state) = correlator(true);
        let mut src = [0u8; 16];
        src[0] = 0xfd;
        src[15] = 5;
        let mut dst = src;
        dst[15] = 1;
        let frame = FrameBuilder::v6(src, dst).udp(53124, 53, &dns_query(1, "example.com", A_RECORD));

        assert_eq!(run_query(&c, &frame), Verdict::Accept);
        assert!(state.dns_requests.is_empty());
        assert_eq!(state.telemetry.get(TelemetryCounter::UdpSendMissed), 0);
    }
}
