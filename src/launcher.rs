//! Builds worker descriptors from a [`Settings`] and spawns the traffic-worker
//! threads: a client dials out (optionally several parallel flows on consecutive
//! ports), a server listens (one `TcpListener`/`UdpSocket` per flow, same port
//! stagger). Every flow's `TransferInfo`/ring pair is published to the reporter
//! before its thread starts, and the launcher blocks on the reporter's [`ReadyGate`]
//! before spawning any worker so no flow's first event lands in a reporter not yet
//! listening.

use crate::barrier::{ConnectBarrier, ReadyGate};
use crate::clock::Timestamp;
use crate::config::Settings;
use crate::error::CoreResult;
use crate::markov::MarkovLengthGenerator;
use crate::reporter::{DataJobSpec, ReporterHandle};
use crate::ring::PacketRing;
use crate::transfer::{next_transfer_id, FullDuplexInfo, GroupSumInfo, Role, TransferInfo};
use crate::worker::client::{self, ClientConfig};
use crate::worker::server::{self, ServerConfig};
use crate::worker::{FlowContext, ShutdownFlag};
use std::cell::RefCell;
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Per-flow packet-ring depth. Large enough to absorb a full reporter cycle's worth of
/// backlog (`MINPACKETDEPTH` in `reporter.rs`) several times over without a worker
/// blocking on back-pressure under normal load.
const RING_CAPACITY: usize = 4096;
/// How long an accept-loop or bind-retry spins checking the shutdown flag between
/// non-blocking poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn build_markov(desc: &Option<String>) -> CoreResult<Option<RefCell<MarkovLengthGenerator>>> {
    match desc {
        Some(s) => Ok(Some(RefCell::new(MarkovLengthGenerator::parse(s)?))),
        None => Ok(None),
    }
}

/// Waits for the reporter to be ready, then spawns every configured flow for the
/// given role, and joins them all before returning. Returns the first flow error
/// encountered, if any — the rest still run to completion.
pub fn run(settings: &Settings, reporter: ReporterHandle, ready: &ReadyGate, shutdown: ShutdownFlag) -> CoreResult<()> {
    ready.wait_ready();
    match settings.role {
        Role::Client => run_client(settings, reporter, shutdown),
        Role::Server => run_server(settings, reporter, shutdown),
    }
}

fn run_client(settings: &Settings, reporter: ReporterHandle, shutdown: ShutdownFlag) -> CoreResult<()> {
    let group_sum = (settings.flows > 1).then(|| GroupSumInfo::new(settings.flows as usize));
    let full_duplex = settings.full_duplex.then(FullDuplexInfo::new);
    let connect_barrier = (settings.flows > 1).then(|| Arc::new(ConnectBarrier::new(settings.flows as usize)));

    let mut handles: Vec<JoinHandle<CoreResult<()>>> = Vec::with_capacity(settings.flows as usize);
    for i in 0..settings.flows {
        let port = settings.port.wrapping_add(i as u16);
        let addr = format!("{}:{}", settings.host, port);
        let prefix = format!("[{:3}]", i + 1);
        let transfer_id = next_transfer_id();
        let ring = Arc::new(PacketRing::new(RING_CAPACITY));

        let info = TransferInfo::new(
            transfer_id,
            prefix.clone(),
            Role::Client,
            settings.transport,
            false,
            settings.full_duplex,
            Timestamp::now(),
            settings.interval_us(),
        );
        reporter.publish_data(DataJobSpec {
            transfer_id,
            ring: Arc::clone(&ring),
            info,
            group_sum: group_sum.clone(),
            full_duplex: full_duplex.clone(),
        });
        reporter.thread_started();

        let ctx = FlowContext {
            transfer_id,
            prefix,
            buffer_len: settings.buffer_len,
            duration: settings.duration,
            ring,
            connect_barrier: connect_barrier.clone(),
            full_duplex: full_duplex.clone(),
            group_sum: group_sum.clone(),
            shutdown: Arc::clone(&shutdown),
        };
        let cfg = ClientConfig {
            buffer_len: settings.buffer_len,
            duration: settings.duration,
            discipline: settings.client_discipline(),
            markov_lengths: build_markov(&settings.markov_lengths)?,
        };
        let transport = settings.transport;
        let reporter_done = reporter.clone();

        handles.push(thread::spawn(move || {
            let result = match transport {
                crate::transfer::Transport::Tcp => client::run_tcp(&addr, &ctx, &cfg),
                crate::transfer::Transport::Udp => client::run_udp(&addr, &ctx, &cfg),
            };
            reporter_done.thread_stopped();
            result
        }));

        // Stagger flow starts slightly so a multi-flow connect burst doesn't all hit
        // the listener's accept backlog in the same instant.
        if settings.flows > 1 {
            thread::sleep(Duration::from_millis(5));
        }
    }

    join_all(handles)
}

fn run_server(settings: &Settings, reporter: ReporterHandle, shutdown: ShutdownFlag) -> CoreResult<()> {
    let group_sum = (settings.flows > 1).then(|| GroupSumInfo::new(settings.flows as usize));
    let full_duplex = settings.full_duplex.then(FullDuplexInfo::new);

    let mut handles: Vec<JoinHandle<CoreResult<()>>> = Vec::with_capacity(settings.flows as usize);
    for i in 0..settings.flows {
        let port = settings.port.wrapping_add(i as u16);
        let prefix = format!("[{:3}]", i + 1);
        let transfer_id = next_transfer_id();
        let ring = Arc::new(PacketRing::new(RING_CAPACITY));

        let info = TransferInfo::new(
            transfer_id,
            prefix.clone(),
            Role::Server,
            settings.transport,
            false,
            settings.full_duplex,
            Timestamp::now(),
            settings.interval_us(),
        );
        reporter.publish_data(DataJobSpec {
            transfer_id,
            ring: Arc::clone(&ring),
            info,
            group_sum: group_sum.clone(),
            full_duplex: full_duplex.clone(),
        });
        reporter.thread_started();

        let ctx = FlowContext {
            transfer_id,
            prefix,
            buffer_len: settings.buffer_len,
            duration: settings.duration,
            ring,
            connect_barrier: None,
            full_duplex: full_duplex.clone(),
            group_sum: group_sum.clone(),
            shutdown: Arc::clone(&shutdown),
        };
        let cfg = ServerConfig {
            buffer_len: settings.buffer_len,
            discipline: settings.server_discipline(),
        };
        let reporter_done = reporter.clone();

        let handle = match settings.transport {
            crate::transfer::Transport::Tcp => spawn_tcp_server_flow(port, ctx, cfg, reporter_done)?,
            crate::transfer::Transport::Udp => spawn_udp_server_flow(port, ctx, cfg, reporter_done)?,
        };
        handles.push(handle);
    }

    join_all(handles)
}

fn spawn_tcp_server_flow(
    port: u16,
    ctx: FlowContext,
    cfg: ServerConfig,
    reporter_done: ReporterHandle,
) -> CoreResult<JoinHandle<CoreResult<()>>> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    listener.set_nonblocking(true).ok();

    Ok(thread::spawn(move || {
        let stream = accept_with_shutdown(&listener, &ctx);
        let result = match stream {
            Some(stream) => server::run_tcp(stream, &ctx, &cfg),
            None => Ok(()),
        };
        reporter_done.thread_stopped();
        result
    }))
}

fn accept_with_shutdown(listener: &TcpListener, ctx: &FlowContext) -> Option<TcpStream> {
    loop {
        if ctx.is_shutting_down() {
            return None;
        }
        match listener.accept() {
            Ok((stream, _addr)) => return Some(stream),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(POLL_INTERVAL);
            }
            Err(_) => return None,
        }
    }
}

fn spawn_udp_server_flow(
    port: u16,
    ctx: FlowContext,
    cfg: ServerConfig,
    reporter_done: ReporterHandle,
) -> CoreResult<JoinHandle<CoreResult<()>>> {
    let socket = UdpSocket::bind(("0.0.0.0", port))?;
    Ok(thread::spawn(move || {
        let result = server::run_udp(socket, &ctx, &cfg);
        reporter_done.thread_stopped();
        result
    }))
}

fn join_all(handles: Vec<JoinHandle<CoreResult<()>>>) -> CoreResult<()> {
    let mut first_err = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "flow exited with an error");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
            Err(_) => tracing::error!("flow thread panicked"),
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_markov_parses_a_valid_description() {
        let desc = Some("<64|1.0".to_string());
        let gen = build_markov(&desc).unwrap();
        assert!(gen.is_some());
    }

    #[test]
    fn build_markov_rejects_a_malformed_description() {
        let desc = Some("garbage".to_string());
        assert!(build_markov(&desc).is_err());
    }

    #[test]
    fn build_markov_is_none_when_unset() {
        assert!(build_markov(&None).unwrap().is_none());
    }

    #[test]
    fn join_all_surfaces_the_first_flow_error() {
        let ok_handle: JoinHandle<CoreResult<()>> = thread::spawn(|| Ok(()));
        let err_handle: JoinHandle<CoreResult<()>> = thread::spawn(|| {
            Err(crate::error::CoreError::HeaderMismatch { expected: 1, got: 0 })
        });
        assert!(join_all(vec![ok_handle, err_handle]).is_err());
    }
}
