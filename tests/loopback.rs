//! End-to-end loopback scenarios: a real client worker against a real server worker
//! over `127.0.0.1`, driven directly (no CLI/launcher), checking that bytes and final
//! accounting make it across the wire for each transport.

use netprobe_core::ring::PacketRing;
use netprobe_core::worker::client::{self, ClientConfig, ClientDiscipline};
use netprobe_core::worker::server::{self, ServerConfig, ServerDiscipline};
use netprobe_core::worker::{FlowContext, ShutdownFlag};
use std::net::{TcpListener, UdpSocket};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn flow_ctx(shutdown: ShutdownFlag) -> FlowContext {
    FlowContext {
        transfer_id: 1,
        prefix: "[  1]".to_string(),
        buffer_len: 4096,
        duration: Duration::from_millis(200),
        ring: Arc::new(PacketRing::new(256)),
        connect_barrier: None,
        full_duplex: None,
        group_sum: None,
        shutdown,
    }
}

fn drain_ring(ring: &PacketRing) -> (i64, i64) {
    let mut bytes = 0i64;
    let mut packets = 0i64;
    loop {
        match ring.dequeue() {
            Some(ev) if ev.is_sentinel() => break,
            Some(ev) => {
                bytes += ev.len as i64;
                packets += 1;
            }
            None => thread::sleep(Duration::from_millis(5)),
        }
    }
    (bytes, packets)
}

#[test]
fn tcp_unconstrained_client_transfers_bytes_to_the_server() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown: ShutdownFlag = Arc::new(AtomicBool::new(false));

    let server_ctx = flow_ctx(Arc::clone(&shutdown));
    let server_ring = Arc::clone(&server_ctx.ring);
    let server_cfg = ServerConfig {
        buffer_len: 4096,
        discipline: ServerDiscipline::Tcp,
    };
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        server::run_tcp(stream, &server_ctx, &server_cfg)
    });

    let client_ctx = flow_ctx(Arc::clone(&shutdown));
    let client_cfg = ClientConfig {
        buffer_len: 4096,
        duration: Duration::from_millis(150),
        discipline: ClientDiscipline::TcpUnconstrained,
        markov_lengths: None,
    };
    let client_ring = Arc::clone(&client_ctx.ring);
    let client = thread::spawn(move || client::run_tcp(&addr.to_string(), &client_ctx, &client_cfg));

    client.join().unwrap().unwrap();
    server.join().unwrap().unwrap();

    // Drain the client's own ring just to unblock `await_consumer_done` callers; the
    // assertion that matters is what the server observed arriving on the wire.
    let _ = drain_ring(&client_ring);
    let (server_bytes, server_packets) = drain_ring(&server_ring);
    assert!(server_bytes > 0, "server should have received some bytes");
    assert!(server_packets > 0);
}

#[test]
fn udp_unconstrained_client_transfers_datagrams_to_the_server() {
    let server_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = server_socket.local_addr().unwrap();
    let shutdown: ShutdownFlag = Arc::new(AtomicBool::new(false));

    let server_ctx = flow_ctx(Arc::clone(&shutdown));
    let server_ring = Arc::clone(&server_ctx.ring);
    let server_cfg = ServerConfig {
        buffer_len: 1400,
        discipline: ServerDiscipline::Udp,
    };
    let server = thread::spawn(move || server::run_udp(server_socket, &server_ctx, &server_cfg));

    let client_ctx = flow_ctx(Arc::clone(&shutdown));
    let client_ring = Arc::clone(&client_ctx.ring);
    let client_cfg = ClientConfig {
        buffer_len: 1400,
        duration: Duration::from_millis(150),
        discipline: ClientDiscipline::UdpUnconstrained,
        markov_lengths: None,
    };
    let client = thread::spawn(move || client::run_udp(&addr.to_string(), &client_ctx, &client_cfg));

    client.join().unwrap().unwrap();
    server.join().unwrap().unwrap();

    let _ = drain_ring(&client_ring);
    let (server_bytes, server_packets) = drain_ring(&server_ring);
    assert!(server_bytes > 0, "server should have received some datagrams");
    assert!(server_packets > 0);
}

#[test]
fn shutdown_flag_stops_a_tcp_client_loop_before_its_duration_elapses() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown: ShutdownFlag = Arc::new(AtomicBool::new(false));

    let server_ctx = flow_ctx(Arc::clone(&shutdown));
    let server_ring = Arc::clone(&server_ctx.ring);
    let server_cfg = ServerConfig {
        buffer_len: 4096,
        discipline: ServerDiscipline::Tcp,
    };
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        server::run_tcp(stream, &server_ctx, &server_cfg)
    });

    let client_ctx = flow_ctx(Arc::clone(&shutdown));
    let client_ring = Arc::clone(&client_ctx.ring);
    let client_cfg = ClientConfig {
        buffer_len: 4096,
        duration: Duration::from_secs(60),
        discipline: ClientDiscipline::TcpUnconstrained,
        markov_lengths: None,
    };
    let client = thread::spawn(move || client::run_tcp(&addr.to_string(), &client_ctx, &client_cfg));

    thread::sleep(Duration::from_millis(50));
    shutdown.store(true, std::sync::atomic::Ordering::SeqCst);

    let start = std::time::Instant::now();
    client.join().unwrap().unwrap();
    server.join().unwrap().unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));

    let _ = drain_ring(&client_ring);
    let _ = drain_ring(&server_ring);
}
