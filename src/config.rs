use crate::dns::from_dotted;
use crate::{NetsiftError, Result};
use netsift_common::dns::{NAME_TABLE_ENTRIES, PORT, PROGRAM_TABLE_ENTRIES, REQUEST_CACHE_ENTRIES};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::debug;

mod defaults {
    pub fn log_level() -> String {
        "info".to_string()
    }

    pub fn max_tracked_connections() -> usize {
        4096
    }

    pub fn dns_port() -> u16 {
        super::PORT
    }

    pub fn name_table_capacity() -> usize {
        super::NAME_TABLE_ENTRIES as usize
    }

    pub fn request_cache_capacity() -> usize {
        super::REQUEST_CACHE_ENTRIES as usize
    }

    pub fn process_flow_capacity() -> usize {
        4096
    }

    pub fn channel_capacity() -> usize {
        1024
    }
}

/// Engine configuration, usually read from a YAML file
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    #[serde(default)]
    pub tls: TlsConf,

    #[serde(default)]
    pub dns: DnsConf,

    #[serde(default)]
    pub events: EventsConf,

    #[serde(default)]
    pub telemetry: TelemetryConf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level(),
            tls: TlsConf::default(),
            dns: DnsConf::default(),
            events: EventsConf::default(),
            telemetry: TelemetryConf::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsConf {
    /// Connections tracked while classification is in progress
    #[serde(default = "defaults::max_tracked_connections")]
    pub max_tracked_connections: usize,
}

impl Default for TlsConf {
    fn default() -> Self {
        Self {
            max_tracked_connections: defaults::max_tracked_connections(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsConf {
    #[serde(default = "defaults::dns_port")]
    pub port: u16,

    #[serde(default = "defaults::name_table_capacity")]
    pub name_table_capacity: usize,

    #[serde(default = "defaults::request_cache_capacity")]
    pub request_cache_capacity: usize,

    #[serde(default = "defaults::process_flow_capacity")]
    pub process_flow_capacity: usize,

    /// Let per-process programs decide whether a query may leave
    #[serde(default)]
    pub enforce_process_rules: bool,

    /// Names of interest and the address each is expected to resolve to
    #[serde(default)]
    pub names: Vec<NameEntry>,

    /// Socket ownership. `0.0.0.0` matches sockets bound to any address.
    #[serde(default)]
    pub process_flows: Vec<ProcessFlowEntry>,

    #[serde(default)]
    pub process_rules: Vec<ProcessRule>,

    #[serde(default)]
    pub programs: Vec<ProgramEntry>,
}

impl Default for DnsConf {
    fn default() -> Self {
        Self {
            port: defaults::dns_port(),
            name_table_capacity: defaults::name_table_capacity(),
            request_cache_capacity: defaults::request_cache_capacity(),
            process_flow_capacity: defaults::process_flow_capacity(),
            enforce_process_rules: false,
            names: Vec::new(),
            process_flows: Vec::new(),
            process_rules: Vec::new(),
            programs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameEntry {
    pub name: String,
    pub address: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFlowEntry {
    pub address: IpAddr,
    pub port: u16,
    pub pid: u32,
}

/// Binds a process to a DNS program id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRule {
    pub pid: u32,
    pub program: u32,
}

/// An allow-list program: listed names pass, all others are dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    pub id: u32,
    #[serde(default)]
    pub allow: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConf {
    #[serde(default = "defaults::channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConf {
    fn default() -> Self {
        Self {
            channel_capacity: defaults::channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConf {
    /// Counter shards; 0 means one per available CPU
    #[serde(default)]
    pub workers: usize,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&text)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = if text.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        capacity("tls_in_flight", self.tls.max_tracked_connections)?;
        capacity("dns_names", self.dns.name_table_capacity)?;
        capacity("dns_requests", self.dns.request_cache_capacity)?;
        capacity("flow_pids", self.dns.process_flow_capacity)?;
        capacity("events", self.events.channel_capacity)?;

        for entry in &self.dns.names {
            dns_name(&entry.name)?;
        }
        for program in &self.dns.programs {
            for name in &program.allow {
                dns_name(name)?;
            }
        }
        if self.dns.programs.len() > PROGRAM_TABLE_ENTRIES as usize {
            return Err(NetsiftError::Config(format!(
                "{} DNS programs configured, at most {} allowed",
                self.dns.programs.len(),
                PROGRAM_TABLE_ENTRIES
            )));
        }
        Ok(())
    }
}

/// Non-zero table size or [`NetsiftError::InvalidCapacity`]
pub fn capacity(table: &'static str, value: usize) -> Result<NonZeroUsize> {
    NonZeroUsize::new(value).ok_or(NetsiftError::InvalidCapacity { table, value })
}

pub(crate) fn dns_name(name: &str) -> Result<netsift_common::DnsName> {
    from_dotted(name).ok_or_else(|| NetsiftError::Config(format!("invalid DNS name {:?}", name)))
}
