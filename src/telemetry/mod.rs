//! Process-wide monotonic counters
//!
//! Increments land on the calling worker's shard with a relaxed
//! fetch-and-add; readers merge all shards into a
//! [`netsift_common::Telemetry`] record. There is no decrement or reset here:
//! resetting belongs to whoever owns the counters' lifecycle.

pub mod exporter;

pub use exporter::TelemetryExporter;

use crate::maps::PerWorker;
use netsift_common::Telemetry;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryCounter {
    MissedTcpClose,
    MissedUdpClose,
    UdpSendProcessed,
    UdpSendMissed,
    ConnStatsMaxEntriesHit,
    ConntrackRegisters,
    ConntrackRegistersDropped,
    TlsBufferRingFull,
    DnsRequestsCached,
    DnsResponsesCorrelated,
}

const COUNTERS: usize = 10;

impl TelemetryCounter {
    pub const ALL: [TelemetryCounter; COUNTERS] = [
        TelemetryCounter::MissedTcpClose,
        TelemetryCounter::MissedUdpClose,
        TelemetryCounter::UdpSendProcessed,
        TelemetryCounter::UdpSendMissed,
        TelemetryCounter::ConnStatsMaxEntriesHit,
        TelemetryCounter::ConntrackRegisters,
        TelemetryCounter::ConntrackRegistersDropped,
        TelemetryCounter::TlsBufferRingFull,
        TelemetryCounter::DnsRequestsCached,
        TelemetryCounter::DnsResponsesCorrelated,
    ];

    /// Field name in the telemetry record
    pub const fn name(&self) -> &'static str {
        match self {
            TelemetryCounter::MissedTcpClose => "missed_tcp_close",
            TelemetryCounter::MissedUdpClose => "missed_udp_close",
            TelemetryCounter::UdpSendProcessed => "udp_sends_processed",
            TelemetryCounter::UdpSendMissed => "udp_sends_missed",
            TelemetryCounter::ConnStatsMaxEntriesHit => "conn_stats_max_entries_hit",
            TelemetryCounter::ConntrackRegisters => "conntrack_registers",
            TelemetryCounter::ConntrackRegistersDropped => "conntrack_registers_dropped",
            TelemetryCounter::TlsBufferRingFull => "tls_buffer_ring_full",
            TelemetryCounter::DnsRequestsCached => "dns_requests_cached",
            TelemetryCounter::DnsResponsesCorrelated => "dns_responses_correlated",
        }
    }

    pub const fn help(&self) -> &'static str {
        match self {
            TelemetryCounter::MissedTcpClose => "TCP closes not observed by the tracer",
            TelemetryCounter::MissedUdpClose => "UDP closes not observed by the tracer",
            TelemetryCounter::UdpSendProcessed => "Egress UDP datagrams classified",
            TelemetryCounter::UdpSendMissed => "Egress DNS datagrams whose query could not be parsed",
            TelemetryCounter::ConnStatsMaxEntriesHit => {
                "Inserts into a full LRU table that evicted an entry"
            }
            TelemetryCounter::ConntrackRegisters => "Connections registered for TLS classification",
            TelemetryCounter::ConntrackRegistersDropped => {
                "Connections not registered because the in-flight table was full"
            }
            TelemetryCounter::TlsBufferRingFull => "TLS packets not buffered because the ring was full",
            TelemetryCounter::DnsRequestsCached => "DNS requests stored in the correlation cache",
            TelemetryCounter::DnsResponsesCorrelated => "DNS responses matched to a cached request",
        }
    }

    /// Value of this counter in a merged record
    pub fn read(&self, record: &Telemetry) -> u64 {
        match self {
            TelemetryCounter::MissedTcpClose => record.missed_tcp_close,
            TelemetryCounter::MissedUdpClose => record.missed_udp_close,
            TelemetryCounter::UdpSendProcessed => record.udp_sends_processed,
            TelemetryCounter::UdpSendMissed => record.udp_sends_missed,
            TelemetryCounter::ConnStatsMaxEntriesHit => record.conn_stats_max_entries_hit,
            TelemetryCounter::ConntrackRegisters => record.conntrack_registers,
            TelemetryCounter::ConntrackRegistersDropped => record.conntrack_registers_dropped,
            TelemetryCounter::TlsBufferRingFull => record.tls_buffer_ring_full,
            TelemetryCounter::DnsRequestsCached => record.dns_requests_cached,
            TelemetryCounter::DnsResponsesCorrelated => record.dns_responses_correlated,
        }
    }

    fn slot<'a>(&self, record: &'a mut Telemetry) -> &'a mut u64 {
        match self {
            TelemetryCounter::MissedTcpClose => &mut record.missed_tcp_close,
            TelemetryCounter::MissedUdpClose => &mut record.missed_udp_close,
            TelemetryCounter::UdpSendProcessed => &mut record.udp_sends_processed,
            TelemetryCounter::UdpSendMissed => &mut record.udp_sends_missed,
            TelemetryCounter::ConnStatsMaxEntriesHit => &mut record.conn_stats_max_entries_hit,
            TelemetryCounter::ConntrackRegisters => &mut record.conntrack_registers,
            TelemetryCounter::ConntrackRegistersDropped => &mut record.conntrack_registers_dropped,
            TelemetryCounter::TlsBufferRingFull => &mut record.tls_buffer_ring_full,
            TelemetryCounter::DnsRequestsCached => &mut record.dns_requests_cached,
            TelemetryCounter::DnsResponsesCorrelated => &mut record.dns_responses_correlated,
        }
    }
}

#[derive(Default)]
struct Shard {
    counters: [AtomicU64; COUNTERS],
}

/// Sharded counter set; see the module docs
pub struct TelemetryCounters {
    shards: PerWorker<Shard>,
}

impl TelemetryCounters {
    pub fn new(workers: usize) -> Self {
        Self {
            shards: PerWorker::new(workers),
        }
    }

    pub fn per_cpu() -> Self {
        Self {
            shards: PerWorker::per_cpu(),
        }
    }

    pub fn shards(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn increment(&self, counter: TelemetryCounter) {
        self.shards.local().counters[counter as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: TelemetryCounter) -> u64 {
        self.shards
            .iter()
            .map(|shard| shard.counters[counter as usize].load(Ordering::Relaxed))
            .sum()
    }

    /// Merge every shard into one record
    pub fn snapshot(&self) -> Telemetry {
        let mut record = Telemetry::default();
        for counter in TelemetryCounter::ALL {
            *counter.slot(&mut record) = self.get(counter);
        }
        record
    }
}

impl Default for TelemetryCounters {
    fn default() -> Self {
        Self::per_cpu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_names_are_unique() {
        let mut names: Vec<_> = TelemetryCounter::ALL.iter().map(|c| c.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), COUNTERS);
    }

    #[test]
    fn test_snapshot_reflects_increments() {
        let telemetry = TelemetryCounters::new(2);
        telemetry.increment(TelemetryCounter::UdpSendProcessed);
        telemetry.increment(TelemetryCounter::UdpSendProcessed);
        telemetry.increment(TelemetryCounter::TlsBufferRingFull);

        let record = telemetry.snapshot();
        assert_eq!(record.udp_sends_processed, 2);
        assert_eq!(record.tls_buffer_ring_full, 1);
        assert_eq!(record.missed_tcp_close, 0);
        assert_eq!(TelemetryCounter::UdpSendProcessed.read(&record), 2);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let telemetry = TelemetryCounters::new(2);

        std::thread::scope(|s| {
            for _ in 0..6 {
                let telemetry = &telemetry;
                s.spawn(move || {
                    for _ in 0..500 {
                        telemetry.increment(TelemetryCounter::DnsRequestsCached);
                    }
                });
            }
        });

        assert_eq!(telemetry.get(TelemetryCounter::DnsRequestsCached), 3000);
    }
}
