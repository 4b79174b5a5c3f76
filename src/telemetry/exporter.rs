use crate::telemetry::{TelemetryCounter, TelemetryCounters};
use crate::{NetsiftError, Result};
use netsift_common::Telemetry;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use std::sync::Arc;
use tracing::debug;

/// Renders telemetry for the control plane
pub struct TelemetryExporter {
    counters: Arc<TelemetryCounters>,
}

impl TelemetryExporter {
    pub fn new(counters: Arc<TelemetryCounters>) -> Self {
        Self { counters }
    }

    pub fn snapshot(&self) -> Telemetry {
        self.counters.snapshot()
    }

    pub fn format_current_metrics(&self) -> Result<String> {
        Self::format_prometheus(&self.snapshot())
    }

    /// Prometheus text exposition, one `netsift_<counter>_total` per field
    pub fn format_prometheus(record: &Telemetry) -> Result<String> {
        let registry = Registry::new_custom(Some("netsift".to_string()), None)?;
        for counter in TelemetryCounter::ALL {
            let metric = IntCounter::new(format!("{}_total", counter.name()), counter.help())?;
            metric.inc_by(counter.read(record));
            registry.register(Box::new(metric))?;
        }

        let mut buf = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buf)?;
        debug!("Encoded {} telemetry counters", TelemetryCounter::ALL.len());
        String::from_utf8(buf).map_err(|e| NetsiftError::Metrics(e.to_string()))
    }

    pub fn format_json(record: &Telemetry) -> Result<String> {
        Ok(serde_json::to_string_pretty(record)?)
    }

    pub fn format_yaml(record: &Telemetry) -> Result<String> {
        Ok(serde_yaml::to_string(record)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_output_has_every_counter() {
        let counters = Arc::new(TelemetryCounters::new(1));
        counters.increment(TelemetryCounter::ConntrackRegisters);
        let exporter = TelemetryExporter::new(counters);

        let text = exporter.format_current_metrics().unwrap();
        for counter in TelemetryCounter::ALL {
            assert!(text.contains(&format!("netsift_{}_total", counter.name())));
        }
        assert!(text.contains("netsift_conntrack_registers_total 1"));
        assert!(text.contains("# TYPE netsift_tls_buffer_ring_full_total counter"));
    }

    #[test]
    fn test_json_uses_field_names() {
        let record = Telemetry {
            udp_sends_missed: 3,
            ..Telemetry::default()
        };
        let json = TelemetryExporter::format_json(&record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["udp_sends_missed"], 3);
        assert_eq!(value["missed_tcp_close"], 0);
    }
}
