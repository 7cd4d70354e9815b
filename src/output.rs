//! The boundary between the reporter and the out-of-scope output collaborator.
//!
//! The reporter never formats a histogram or report table itself; it hands an
//! [`OutputEvent`] to whatever implements [`OutputSink`]. The crate's binary wires a
//! minimal console sink so the demo is runnable end to end; real report layout is an
//! external concern per the purpose statement.

use crate::transfer::{ConnectionReport, SettingsReport, TransferInfo};
use crate::wire::ServerRelayReport;

/// A formatted line handed up from the reporter. `Data` carries the `TransferInfo` the
/// interval or final line was computed from so a sink can pull whichever fields it
/// wants to print; the core does not pre-render numbers into strings.
pub enum OutputEvent {
    Data(Box<TransferInfoSnapshot>),
    Connection(ConnectionReport),
    Settings(SettingsReport),
    ServerRelay(ServerRelayReport),
    Line(String),
    Error(String),
}

/// An immutable, cheap-to-clone snapshot of the `TransferInfo` fields a sink is
/// expected to print, taken at interval-close time (the live `TransferInfo` stays
/// reporter-owned and keeps mutating after the snapshot is handed off).
#[derive(Debug, Clone)]
pub struct TransferInfoSnapshot {
    pub transfer_id: u64,
    pub prefix: String,
    pub interval_start_us: i64,
    pub interval_end_us: i64,
    pub bytes_this_interval: i64,
    pub bytes_total: i64,
    pub datagrams: i64,
    pub lost: i64,
    pub out_of_order: i64,
    pub jitter_us: f64,
    pub transit_mean_us: f64,
    pub is_final: bool,
}

impl TransferInfoSnapshot {
    pub fn from_transfer_info(info: &TransferInfo, interval_start_us: i64, interval_end_us: i64) -> Self {
        Self {
            transfer_id: info.transfer_id,
            prefix: info.prefix.clone(),
            interval_start_us,
            interval_end_us,
            bytes_this_interval: info.totals.delta_bytes(),
            bytes_total: info.totals.bytes_current,
            datagrams: info.totals.datagrams,
            lost: info.totals.lost,
            out_of_order: info.totals.out_of_order,
            jitter_us: info.jitter_current.mean,
            transit_mean_us: info.transit_current.mean,
            is_final: info.is_final,
        }
    }
}

/// Implemented by whatever prints, serializes, or otherwise consumes reporter output.
/// The core ships no implementation beyond what the binary needs to be runnable.
pub trait OutputSink: Send {
    fn handle(&mut self, event: OutputEvent);
}

/// A minimal sink good enough to drive the demo binary: one line per event on
/// stdout/stderr, no column alignment or unit formatting. Real report layout is an
/// external collaborator's job.
#[derive(Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn handle(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::Data(snap) => {
                tracing::info!(
                    transfer_id = snap.transfer_id,
                    prefix = %snap.prefix,
                    interval = format!("{:.1}-{:.1}", snap.interval_start_us as f64 / 1e6, snap.interval_end_us as f64 / 1e6),
                    bytes = snap.bytes_this_interval,
                    jitter_us = snap.jitter_us,
                    "{} {:7} bytes  jitter {:.3} us",
                    snap.prefix,
                    snap.bytes_this_interval,
                    snap.jitter_us
                );
            }
            OutputEvent::Connection(c) => {
                println!(
                    "[{}] local {} connected to {} ({:.1} ms)",
                    c.transfer_id, c.local_addr, c.peer_addr, c.connect_time_ms
                );
            }
            OutputEvent::Settings(s) => println!("[{}] {}", s.transfer_id, s.description),
            OutputEvent::ServerRelay(r) => println!(
                "server summary: {} bytes, {} datagrams, {} lost",
                r.total_bytes, r.total_datagrams, r.total_lost
            ),
            OutputEvent::Line(line) => println!("{line}"),
            OutputEvent::Error(msg) => eprintln!("error: {msg}"),
        }
    }
}

/// A sink for `--json`: one `serde_json` object per line on stdout, machine-readable
/// instead of the human-formatted lines [`ConsoleSink`] prints. Errors and connection
/// reports still go to stderr through `tracing` so they interleave with the rest of the
/// process's logging.
#[derive(Default)]
pub struct JsonSink;

impl OutputSink for JsonSink {
    fn handle(&mut self, event: OutputEvent) {
        use serde_json::json;
        let value = match event {
            OutputEvent::Data(snap) => json!({
                "kind": "data",
                "transfer_id": snap.transfer_id,
                "prefix": snap.prefix,
                "interval_start_us": snap.interval_start_us,
                "interval_end_us": snap.interval_end_us,
                "bytes_this_interval": snap.bytes_this_interval,
                "bytes_total": snap.bytes_total,
                "datagrams": snap.datagrams,
                "lost": snap.lost,
                "out_of_order": snap.out_of_order,
                "jitter_us": snap.jitter_us,
                "transit_mean_us": snap.transit_mean_us,
                "is_final": snap.is_final,
            }),
            OutputEvent::Connection(c) => json!({
                "kind": "connection",
                "transfer_id": c.transfer_id,
                "local_addr": c.local_addr,
                "peer_addr": c.peer_addr,
                "connect_time_ms": c.connect_time_ms,
            }),
            OutputEvent::Settings(s) => json!({
                "kind": "settings",
                "transfer_id": s.transfer_id,
                "description": s.description,
            }),
            OutputEvent::ServerRelay(r) => json!({
                "kind": "server_relay",
                "total_bytes": r.total_bytes,
                "total_datagrams": r.total_datagrams,
                "total_lost": r.total_lost,
                "total_out_of_order": r.total_out_of_order,
                "jitter_us": r.jitter_us,
            }),
            OutputEvent::Line(line) => json!({"kind": "line", "text": line}),
            OutputEvent::Error(msg) => json!({"kind": "error", "message": msg}),
        };
        println!("{value}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::transfer::{Role, Transport};

    #[test]
    fn snapshot_captures_interval_delta() {
        let mut info = TransferInfo::new(
            1,
            "[ 1]",
            Role::Server,
            Transport::Udp,
            false,
            false,
            Timestamp::ZERO,
            1_000_000,
        );
        info.totals.bytes_current = 1000;
        info.totals.advance_interval();
        info.totals.bytes_current = 2500;
        let snap = TransferInfoSnapshot::from_transfer_info(&info, 0, 1_000_000);
        assert_eq!(snap.bytes_this_interval, 1500);
        assert_eq!(snap.bytes_total, 2500);
    }

    struct RecordingSink {
        lines: Vec<String>,
    }
    impl OutputSink for RecordingSink {
        fn handle(&mut self, event: OutputEvent) {
            if let OutputEvent::Line(s) = event {
                self.lines.push(s);
            }
        }
    }

    #[test]
    fn sink_trait_is_object_safe_and_usable() {
        let mut sink: Box<dyn OutputSink> = Box::new(RecordingSink { lines: vec![] });
        sink.handle(OutputEvent::Line("hello".into()));
    }

    #[test]
    fn json_sink_handles_every_event_variant_without_panicking() {
        let mut sink = JsonSink;
        sink.handle(OutputEvent::Line("hello".into()));
        sink.handle(OutputEvent::Error("boom".into()));
    }
}
