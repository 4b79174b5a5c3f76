//! Shared flow state
//!
//! Every table the hooks read or write, sized from [`Config`]. Entries
//! live for the lifetime of the process; only FIN handling and LRU
//! eviction remove them.

use crate::config::{capacity, dns_name, Config};
use crate::maps::{BoundedMap, InsertOutcome, LruMap};
use crate::telemetry::TelemetryCounters;
use crate::tls::TlsBufferRing;
use crate::tuple::addr_slot;
use crate::{NetsiftError, Result};
use netsift_common::{
    ConnTuple, DnsName, DnsRequestKey, DnsResolution, FlowPidKey, TlsTransaction,
};
use std::sync::Arc;
use tracing::info;

const PID_PROGRAM_ENTRIES: usize = 1024;

pub struct FlowState {
    pub tls_in_flight: BoundedMap<ConnTuple, TlsTransaction>,
    pub tls_ring: TlsBufferRing,
    /// Names of interest and their expected IPv4 address
    pub dns_names: LruMap<DnsName, [u8; 4]>,
    pub dns_requests: LruMap<DnsRequestKey, DnsResolution>,
    /// Socket address and port to owning pid, written out of band
    pub flow_pids: BoundedMap<FlowPidKey, u32>,
    /// pid to DNS program id, written out of band
    pub pid_programs: BoundedMap<u32, u32>,
    pub telemetry: Arc<TelemetryCounters>,
}

impl FlowState {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let telemetry = match config.telemetry.workers {
            0 => TelemetryCounters::per_cpu(),
            n => TelemetryCounters::new(n),
        };

        Ok(Self {
            tls_in_flight: BoundedMap::with_max_entries(
                "tls_in_flight",
                capacity("tls_in_flight", config.tls.max_tracked_connections)?.get(),
            ),
            tls_ring: TlsBufferRing::new(),
            dns_names: LruMap::with_max_entries(
                "dns_names",
                capacity("dns_names", config.dns.name_table_capacity)?,
            ),
            dns_requests: LruMap::with_max_entries(
                "dns_requests",
                capacity("dns_requests", config.dns.request_cache_capacity)?,
            ),
            flow_pids: BoundedMap::with_max_entries(
                "flow_pids",
                capacity("flow_pids", config.dns.process_flow_capacity)?.get(),
            ),
            pid_programs: BoundedMap::with_max_entries("pid_programs", PID_PROGRAM_ENTRIES),
            telemetry: Arc::new(telemetry),
        })
    }

    /// Load the out-of-band tables from the configuration
    pub fn seed_from_config(&self, config: &Config) -> Result<()> {
        for entry in &config.dns.names {
            self.dns_names
                .insert(dns_name(&entry.name)?, entry.address.octets());
        }

        for flow in &config.dns.process_flows {
            let key = FlowPidKey {
                addr: addr_slot(flow.address),
                port: flow.port,
                _pad: 0,
            };
            seeded(&self.flow_pids, key, flow.pid)?;
        }

        for rule in &config.dns.process_rules {
            seeded(&self.pid_programs, rule.pid, rule.program)?;
        }

        info!(
            "Seeded {} DNS names, {} process flows, {} process rules",
            self.dns_names.len(),
            self.flow_pids.len(),
            self.pid_programs.len()
        );
        Ok(())
    }
}

fn seeded<K, V>(map: &BoundedMap<K, V>, key: K, value: V) -> Result<()>
where
    K: Eq + std::hash::Hash,
{
    match map.insert(key, value) {
        InsertOutcome::Full => Err(NetsiftError::Config(format!(
            "{} is full ({} entries)",
            map.name(),
            map.capacity()
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NameEntry, ProcessFlowEntry, ProcessRule};
    use crate::dns::from_dotted;
    use std::net::Ipv4Addr;

    #[test]
    fn test_tables_sized_from_config() {
        let mut config = Config::default();
        config.dns.request_cache_capacity = 16;
        config.tls.max_tracked_connections = 8;
        config.telemetry.workers = 2;

        let state = FlowState::new(&config).unwrap();
        assert_eq!(state.dns_requests.capacity(), 16);
        assert_eq!(state.tls_in_flight.capacity(), 8);
        assert_eq!(state.telemetry.shards(), 2);
        assert!(state.tls_in_flight.is_empty());
    }

    #[test]
    fn test_seed_from_config() {
        let mut config = Config::default();
        config.dns.names.push(NameEntry {
            name: "example.com".into(),
            address: Ipv4Addr::new(93, 184, 216, 34),
        });
        config.dns.process_flows.push(ProcessFlowEntry {
            address: "0.0.0.0".parse().unwrap(),
            port: 5353,
            pid: 77,
        });
        config.dns.process_rules.push(ProcessRule { pid: 77, program: 3 });

        let state = FlowState::new(&config).unwrap();
        state.seed_from_config(&config).unwrap();

        let name = from_dotted("example.com").unwrap();
        assert_eq!(state.dns_names.peek(&name), Some([93, 184, 216, 34]));
        let key = FlowPidKey {
            addr: [0; 16],
            port: 5353,
            _pad: 0,
        };
        assert_eq!(state.flow_pids.get(&key), Some(77));
        assert_eq!(state.pid_programs.get(&77), Some(3));
    }

    #[test]
    fn test_seed_overflow_is_an_error() {
        let mut config = Config::default();
        config.dns.process_flow_capacity = 1;
        for port in [1, 2] {
            config.dns.process_flows.push(ProcessFlowEntry {
                address: "10.0.0.1".parse().unwrap(),
                port,
                pid: 1,
            });
        }
        let state = FlowState::new(&config).unwrap();
        assert!(state.seed_from_config(&config).is_err());
    }
}
