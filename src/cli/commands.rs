use crate::cli::replay::{parse_frames, Frame, Hook};
use crate::cli::{Commands, OutputFormat};
use crate::dns::to_dotted;
use crate::events::FlowEvent;
use crate::parser::Packet;
use crate::pipeline::{Engine, HookContext, Verdict};
use crate::telemetry::{TelemetryCounter, TelemetryExporter};
use crate::tls::TlsState;
use crate::tuple;
use crate::{Config, Result};
use netsift_common::Telemetry;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::Path;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};

pub async fn handle_command(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Replay { input, format } => handle_replay(&input, format, &config).await,
        Commands::Config => handle_config(&config),
    }
}

fn handle_config(config: &Config) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct FrameVerdict {
    pub line: usize,
    pub hook: Hook,
    pub verdict: String,
}

#[derive(Debug, Serialize)]
pub struct TlsRow {
    pub connection: String,
    pub state: String,
    pub packets: u8,
}

#[derive(Debug, Serialize)]
pub struct DnsRow {
    pub request: String,
    pub id: u16,
    pub name_len: u32,
    pub address: Ipv4Addr,
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub frames: Vec<FrameVerdict>,
    pub accepted: usize,
    pub dropped: usize,
    pub events: Vec<String>,
    pub tls_connections: Vec<TlsRow>,
    pub buffered_tls_packets: usize,
    pub dns_requests: Vec<DnsRow>,
    pub dns_names: Vec<String>,
    pub telemetry: Telemetry,
}

fn run_frame(engine: &Engine, frame: &Frame) -> Verdict {
    let packet = Packet::new(&frame.bytes);
    let ctx = HookContext::new(frame.netns);
    match frame.hook {
        Hook::Ingress => engine.ingress(&packet, ctx),
        Hook::Egress => engine.egress(&packet, ctx),
        Hook::Socket => engine.socket(&packet, ctx),
    }
}

fn describe(event: &FlowEvent) -> String {
    match event {
        FlowEvent::TlsHandshake(e) => format!(
            "{} {} version={:#06x} handshake_done={}",
            event.kind(),
            tuple::display(&e.tup),
            e.version,
            e.handshake_done
        ),
        FlowEvent::DnsResolved(e) => format!(
            "{} {}:{} -> {}:{} id={:#06x} addr={}",
            event.kind(),
            Ipv4Addr::from(e.key.saddr),
            e.key.sport,
            Ipv4Addr::from(e.key.daddr),
            e.key.dport,
            e.key.id,
            Ipv4Addr::from(e.resolution.addr)
        ),
    }
}

/// Replay `frames` through a fresh engine and collect the resulting state
pub fn replay(engine: &Engine, frames: &[Frame]) -> ReplayReport {
    let mut rx = engine.subscribe();
    let mut events = Vec::new();
    let mut verdicts = Vec::with_capacity(frames.len());

    for frame in frames {
        let verdict = run_frame(engine, frame);
        verdicts.push(FrameVerdict {
            line: frame.line,
            hook: frame.hook,
            verdict: verdict.to_string(),
        });

        loop {
            match rx.try_recv() {
                Ok(event) => events.push(describe(&event)),
                Err(TryRecvError::Lagged(n)) => warn!("{} events lost", n),
                Err(_) => break,
            }
        }
    }

    let state = engine.state();
    let mut tls_connections: Vec<TlsRow> = state
        .tls_in_flight
        .entries()
        .into_iter()
        .map(|(tup, tls)| TlsRow {
            connection: tuple::display(&tup).to_string(),
            state: tls_state_name(engine.tls_state(&tup)).to_string(),
            packets: tls.packets,
        })
        .collect();
    tls_connections.sort_by(|a, b| a.connection.cmp(&b.connection));

    let dns_requests = state
        .dns_requests
        .entries()
        .into_iter()
        .map(|(key, resolution)| DnsRow {
            request: format!(
                "{}:{} -> {}:{}",
                Ipv4Addr::from(key.saddr),
                key.sport,
                Ipv4Addr::from(key.daddr),
                key.dport
            ),
            id: key.id,
            name_len: resolution.name_len,
            address: Ipv4Addr::from(resolution.addr),
        })
        .collect();

    let dns_names = state
        .dns_names
        .entries()
        .iter()
        .map(|(name, addr)| format!("{} {}", to_dotted(name), Ipv4Addr::from(*addr)))
        .collect();

    let dropped = verdicts.iter().filter(|v| v.verdict == "DROP").count();
    ReplayReport {
        accepted: verdicts.len() - dropped,
        dropped,
        frames: verdicts,
        events,
        tls_connections,
        buffered_tls_packets: state.tls_ring.drain().len(),
        dns_requests,
        dns_names,
        telemetry: engine.telemetry(),
    }
}

fn tls_state_name(state: TlsState) -> &'static str {
    match state {
        TlsState::Unseen => "unseen",
        TlsState::InProgress { is_tls: true, .. } => "in-progress (tls)",
        TlsState::InProgress { .. } => "in-progress",
        TlsState::ClassifiedTls => "tls",
        TlsState::ClassifiedNonTls => "not-tls",
        TlsState::Abandoned => "abandoned",
    }
}

async fn handle_replay(input: &Path, format: OutputFormat, config: &Config) -> Result<()> {
    let text = tokio::fs::read_to_string(input).await?;
    let frames = parse_frames(&text)?;
    info!("Replaying {} frames from {}", frames.len(), input.display());

    let engine = Engine::new(config)?;
    let report = replay(&engine, &frames);

    match format {
        OutputFormat::Text => print_text(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&report)?),
        OutputFormat::Prometheus => {
            print!("{}", TelemetryExporter::format_prometheus(&report.telemetry)?)
        }
    }
    Ok(())
}

fn print_text(report: &ReplayReport) {
    println!("{:<6} {:<8} VERDICT", "LINE", "HOOK");
    for frame in &report.frames {
        println!("{:<6} {:<8} {}", frame.line, frame.hook, frame.verdict);
    }
    println!(
        "\n{} frames: {} accepted, {} dropped",
        report.frames.len(),
        report.accepted,
        report.dropped
    );

    if !report.events.is_empty() {
        println!("\nEvents:");
        for event in &report.events {
            println!("  {}", event);
        }
    }

    println!("\nTLS connections:");
    for row in &report.tls_connections {
        println!("  {:<50} {:<18} packets={}", row.connection, row.state, row.packets);
    }
    println!("  buffered packets: {}", report.buffered_tls_packets);

    println!("\nDNS requests:");
    for row in &report.dns_requests {
        println!(
            "  {:<40} id={:#06x} name_len={} addr={}",
            row.request, row.id, row.name_len, row.address
        );
    }

    println!("\nTelemetry:");
    for line in telemetry_lines(&report.telemetry) {
        println!("  {}", line);
    }
}

fn telemetry_lines(telemetry: &Telemetry) -> Vec<String> {
    TelemetryCounter::ALL
        .iter()
        .map(|counter| format!("{:<28} {}", counter.name(), counter.read(telemetry)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NameEntry;
    use crate::frame::{dns_query, FrameBuilder};
    use bytes::Bytes;
    use netsift_common::dns::A_RECORD;

    #[test]
    fn test_replay_report() {
        let mut config = Config::default();
        config.dns.names.push(NameEntry {
            name: "example.com".into(),
            address: Ipv4Addr::new(93, 184, 216, 34),
        });
        let engine = Engine::new(&config).unwrap();

        let builder = FrameBuilder::v4([10, 0, 0, 5], [10, 0, 0, 1]);
        let frames = vec![
            Frame {
                line: 1,
                hook: Hook::Egress,
                netns: 0,
                bytes: builder.udp(53124, 53, &dns_query(0x1234, "example.com", A_RECORD)),
            },
            Frame {
                line: 2,
                hook: Hook::Egress,
                netns: 0,
                bytes: builder.tcp(40000, 443, 0x10, &[0x16, 0x03, 0x03, 0x00, 0x01, 0x01]),
            },
            Frame {
                line: 3,
                hook: Hook::Ingress,
                netns: 0,
                bytes: Bytes::from_static(&[0u8; 10]),
            },
        ];

        let report = replay(&engine, &frames);
        assert_eq!(report.accepted, 3);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.dns_requests.len(), 1);
        assert_eq!(report.dns_requests[0].id, 0x1234);
        assert_eq!(report.dns_requests[0].name_len, 11);
        assert_eq!(report.tls_connections.len(), 1);
        assert_eq!(report.tls_connections[0].state, "in-progress (tls)");
        assert_eq!(report.buffered_tls_packets, 1);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.telemetry.dns_requests_cached, 1);
        assert_eq!(report.dns_names, vec!["example.com 93.184.216.34"]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["frames"][0]["hook"], "egress");
    }

    #[test]
    fn test_telemetry_lines_cover_every_counter() {
        let telemetry = Telemetry {
            tls_buffer_ring_full: 3,
            ..Telemetry::default()
        };
        let lines = telemetry_lines(&telemetry);

        assert_eq!(lines.len(), TelemetryCounter::ALL.len());
        for (line, counter) in lines.iter().zip(TelemetryCounter::ALL) {
            assert!(line.starts_with(counter.name()));
        }
        assert!(lines.iter().any(|l| l.starts_with("tls_buffer_ring_full") && l.ends_with(" 3")));
    }
}
