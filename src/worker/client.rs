//! Client-side send loops: the nine shaping disciplines dispatched from `StartSynch`.

use super::{arm_full_duplex_start, arm_full_duplex_stop, my_connect_tcp, FlowContext};
use crate::clock::{self, Timestamp};
use crate::error::{CoreError, CoreResult};
use crate::event::{ErrKind, PacketEvent};
use crate::isoch::IsochFrameCounter;
use crate::markov::MarkovLengthGenerator;
use crate::wire::{
    BbFlags, BounceBackHeader, BounceBackParams, ClientHeaderAck, IsochParams, TcpBurstHeader,
    TestHdrFlags, TestHeader, UdpDatagramHeader,
};
use rand::Rng;
use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::UdpSocket;
use std::time::{Duration, Instant};

/// Which of the nine send loops a flow runs. Parameters are the subset of knobs each
/// discipline actually reads; the rest of the socket-option surface is out of scope.
pub enum ClientDiscipline {
    TcpUnconstrained,
    TcpRateLimited { rate_bps: u64 },
    TcpNearCongestion { max_in_flight_bursts: u32 },
    TcpWriteEvents,
    TcpBounceBack { request_size: u32, reply_size: u32, burst: u32 },
    UdpUnconstrained,
    UdpIsochronous { fps: f64, mean: f64, variance: f64 },
    UdpBurst { burst_size: u32, ipg: Duration },
    UdpL4s,
}

pub struct ClientConfig {
    pub buffer_len: usize,
    pub duration: Duration,
    pub discipline: ClientDiscipline,
    /// When set, overrides `buffer_len` with lengths drawn from the chain instead of a
    /// constant size — used by the unconstrained TCP/UDP disciplines.
    pub markov_lengths: Option<RefCell<MarkovLengthGenerator>>,
}

/// Draws a lognormal sample via Box-Muller, floored at zero. Used by the isochronous
/// discipline to size each frame's byte budget around `mean` with `variance`.
fn sample_lognormal<R: Rng + ?Sized>(mean: f64, variance: f64, rng: &mut R) -> f64 {
    if variance <= 0.0 {
        return mean;
    }
    let sigma2 = (1.0 + variance / (mean * mean)).ln();
    let mu = mean.ln() - sigma2 / 2.0;
    let sigma = sigma2.sqrt();
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    (mu + sigma * z).exp().max(0.0)
}

/// Builds the test header `StartSynch` publishes as the flow's first payload, sized
/// and flagged for whichever discipline this flow is about to run. `TRIP_TIME` is
/// always set so the server's `ClientHeaderAck.sent` has a client-clock timestamp to
/// measure RTT/half-RTT against.
fn build_test_header(cfg: &ClientConfig) -> TestHeader {
    let mut flags = TestHdrFlags::TRIP_TIME;
    let mut isoch = None;
    let mut bounce_back = None;

    match &cfg.discipline {
        ClientDiscipline::UdpIsochronous { fps, mean, variance } => {
            flags |= TestHdrFlags::ISOCH;
            isoch = Some(IsochParams {
                fps: *fps as f32,
                mean: *mean as u32,
                variance: *variance as u32,
                burst_ipg_us: 0,
            });
        }
        ClientDiscipline::TcpBounceBack { request_size, reply_size, .. } => {
            flags |= TestHdrFlags::BOUNCE_BACK;
            bounce_back = Some(BounceBackParams {
                request_size: *request_size,
                reply_size: *reply_size,
            });
        }
        _ => {}
    }

    TestHeader {
        flags,
        num_threads: 1,
        m_port: 0,
        buffer_len: cfg.buffer_len as u32,
        m_win_band: 0,
        m_amount: 0,
        isoch,
        trip_time_start: Some(Timestamp::now()),
        bounce_back,
    }
}

/// `StartSynch` (TCP): publishes the test header as the first payload, then reads
/// back the server's `ClientHeaderAck` before any discipline loop writes a byte.
fn send_test_header_tcp(stream: &mut (impl Read + Write), ctx: &FlowContext, cfg: &ClientConfig) -> CoreResult<()> {
    let hdr = build_test_header(cfg);
    let mut buf = Vec::new();
    hdr.encode(&mut buf);
    stream
        .write_all(&buf)
        .map_err(|e| CoreError::FatalWrite { flow_id: ctx.transfer_id, source: e })?;

    let mut ack_buf = vec![0u8; crate::wire::CLIENT_HDR_ACK_WIRE_LEN];
    stream
        .read_exact(&mut ack_buf)
        .map_err(|e| CoreError::FatalRead { flow_id: ctx.transfer_id, source: e })?;
    log_header_ack(ctx, &ack_buf)
}

/// `StartSynch` (UDP): same as [`send_test_header_tcp`], but over a connected datagram
/// socket, retrying the send since the first datagram can be dropped like any other.
fn send_test_header_udp(socket: &UdpSocket, ctx: &FlowContext, cfg: &ClientConfig) -> CoreResult<()> {
    let hdr = build_test_header(cfg);
    let mut buf = Vec::new();
    hdr.encode(&mut buf);

    socket.set_read_timeout(Some(Duration::from_millis(200))).ok();
    let mut ack_buf = [0u8; 256];
    for _ in 0..10 {
        socket
            .send(&buf)
            .map_err(|e| CoreError::FatalWrite { flow_id: ctx.transfer_id, source: e })?;
        match socket.recv(&mut ack_buf) {
            Ok(n) if n >= crate::wire::CLIENT_HDR_ACK_WIRE_LEN => {
                return log_header_ack(ctx, &ack_buf[..n]);
            }
            Ok(_) | Err(_) => continue,
        }
    }
    Ok(())
}

fn log_header_ack(ctx: &FlowContext, ack_buf: &[u8]) -> CoreResult<()> {
    let ack = ClientHeaderAck::decode(&mut &ack_buf[..])?;
    let now = Timestamp::now();
    tracing::debug!(
        transfer_id = ctx.transfer_id,
        rtt_us = ack.rtt_us(now),
        half_rtt_us = ack.half_rtt_us(now),
        "client header ack"
    );
    Ok(())
}

fn classify_write(result: std::io::Result<usize>, expected: usize) -> (u32, ErrKind) {
    match result {
        Ok(0) => (0, ErrKind::WriteErrFatal),
        Ok(n) if n == expected => (n as u32, ErrKind::WriteSuccess),
        Ok(n) => (n as u32, ErrKind::WriteErrAccount),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => (0, ErrKind::WriteSelectRetry),
        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => (0, ErrKind::WriteTimeo),
        Err(_) => (0, ErrKind::WriteErrFatal),
    }
}

/// TCP connect, honour `connects_done` barrier (via `ctx.connect_barrier`), start
/// synch, dispatch to the configured send loop, finish. The top-level sequence from
/// `mySockInit → ... → FinishTrafficActions`.
pub fn run_tcp(addr: &str, ctx: &FlowContext, cfg: &ClientConfig) -> CoreResult<()> {
    let (mut stream, connect_time) = my_connect_tcp(addr, Duration::from_secs(10))?;
    stream.set_nodelay(true).ok();
    tracing::info!(transfer_id = ctx.transfer_id, connect_ms = connect_time.as_millis() as u64, "tcp connect");

    if let Some(barrier) = &ctx.connect_barrier {
        barrier.arrive();
    }
    arm_full_duplex_start(ctx.full_duplex.as_ref())?;
    send_test_header_tcp(&mut stream, ctx, cfg)?;

    let result = match &cfg.discipline {
        ClientDiscipline::TcpUnconstrained => run_tcp_unconstrained(&mut stream, ctx, cfg),
        ClientDiscipline::TcpRateLimited { rate_bps } => {
            run_tcp_rate_limited(&mut stream, ctx, cfg, *rate_bps)
        }
        ClientDiscipline::TcpNearCongestion { max_in_flight_bursts } => {
            run_tcp_near_congestion(&mut stream, ctx, cfg, *max_in_flight_bursts)
        }
        ClientDiscipline::TcpWriteEvents => run_tcp_write_events(&mut stream, ctx, cfg),
        ClientDiscipline::TcpBounceBack { request_size, reply_size, burst } => {
            run_tcp_bounce_back(&mut stream, ctx, *request_size, *reply_size, *burst)
        }
        _ => return Err(CoreError::HeaderMismatch { expected: 0, got: 0 }),
    };

    stream.shutdown(std::net::Shutdown::Write).ok();
    finish(ctx)?;
    result
}

pub fn run_udp(addr: &str, ctx: &FlowContext, cfg: &ClientConfig) -> CoreResult<()> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(addr)?;
    socket.set_write_timeout(Some(Duration::from_millis(500))).ok();

    if let Some(barrier) = &ctx.connect_barrier {
        barrier.arrive();
    }
    arm_full_duplex_start(ctx.full_duplex.as_ref())?;
    send_test_header_udp(&socket, ctx, cfg)?;

    let result = match &cfg.discipline {
        ClientDiscipline::UdpUnconstrained => run_udp_unconstrained(&socket, ctx, cfg),
        ClientDiscipline::UdpIsochronous { fps, mean, variance } => {
            run_udp_isochronous(&socket, ctx, cfg, *fps, *mean, *variance)
        }
        ClientDiscipline::UdpBurst { burst_size, ipg } => {
            run_udp_burst(&socket, ctx, cfg, *burst_size, *ipg)
        }
        ClientDiscipline::UdpL4s => run_udp_l4s(&socket, ctx, cfg),
        _ => return Err(CoreError::HeaderMismatch { expected: 0, got: 0 }),
    };

    await_server_fin(&socket, ctx.transfer_id)?;
    finish(ctx)?;
    result
}

fn finish(ctx: &FlowContext) -> CoreResult<()> {
    ctx.ring.enqueue(PacketEvent::sentinel(Timestamp::now()));
    ctx.ring.await_consumer_done();
    arm_full_duplex_stop(ctx.full_duplex.as_ref())?;
    Ok(())
}

fn run_tcp_unconstrained(stream: &mut impl Write, ctx: &FlowContext, cfg: &ClientConfig) -> CoreResult<()> {
    let start = Instant::now();
    let buf = vec![0u8; cfg.buffer_len];
    let mut seq: i64 = 0;
    while start.elapsed() < cfg.duration && !ctx.is_shutting_down() {
        seq += 1;
        let hdr = TcpBurstHeader {
            flags: 0,
            burst_size: cfg.buffer_len as u32,
            burst_id: seq as u32,
            burst_period_us: 0,
            seqno: seq,
            start: Timestamp::now(),
            write: Timestamp::now(),
        };
        let mut hdr_buf = Vec::new();
        hdr.encode(&mut hdr_buf);
        let sent_time = Timestamp::now();
        let (written, kind) = classify_write(stream.write(&hdr_buf), hdr_buf.len());
        let _ = classify_write(stream.write(&buf), buf.len());

        let mut ev = PacketEvent::blank(seq, Timestamp::now());
        ev.len = written + buf.len() as u32;
        ev.write_len = ev.len;
        ev.sent_time = sent_time;
        ev.err_kind = kind;
        ev.transit_ready = true;
        ctx.ring.enqueue(ev);

        if kind.is_fatal() {
            return Err(CoreError::FatalWrite {
                flow_id: ctx.transfer_id,
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer closed"),
            });
        }
    }
    Ok(())
}

fn run_tcp_rate_limited(
    stream: &mut impl Write,
    ctx: &FlowContext,
    cfg: &ClientConfig,
    rate_bps: u64,
) -> CoreResult<()> {
    let start = Instant::now();
    let buf = vec![0u8; cfg.buffer_len];
    let mut tokens: f64 = 0.0;
    let mut last_refill = Instant::now();
    let mut seq: i64 = 0;

    while start.elapsed() < cfg.duration && !ctx.is_shutting_down() {
        let now = Instant::now();
        tokens += now.duration_since(last_refill).as_secs_f64() * (rate_bps as f64 / 8.0);
        last_refill = now;

        if tokens < buf.len() as f64 {
            clock::delay_loop(4);
            continue;
        }

        seq += 1;
        let sent_time = Timestamp::now();
        let (written, kind) = classify_write(stream.write(&buf), buf.len());
        tokens -= written as f64;

        let mut ev = PacketEvent::blank(seq, Timestamp::now());
        ev.len = written;
        ev.sent_time = sent_time;
        ev.err_kind = kind;
        ev.transit_ready = true;
        ctx.ring.enqueue(ev);

        if kind.is_fatal() {
            break;
        }
    }
    Ok(())
}

fn run_tcp_near_congestion(
    stream: &mut impl Write,
    ctx: &FlowContext,
    cfg: &ClientConfig,
    max_in_flight_bursts: u32,
) -> CoreResult<()> {
    let start = Instant::now();
    let buf = vec![0u8; cfg.buffer_len];
    let mut in_flight: u32 = 0;
    let mut seq: i64 = 0;

    while start.elapsed() < cfg.duration && !ctx.is_shutting_down() {
        if in_flight >= max_in_flight_bursts {
            // Approximate waiting for the peer to drain: a short sleep stands in for
            // polling TCP_INFO's packets-in-flight counter, which this crate does not
            // obtain directly (see `TcpStatsSnapshot`, populated out-of-band).
            clock::delay_loop(500);
            in_flight = in_flight.saturating_sub(1);
            continue;
        }

        seq += 1;
        let sent_time = Timestamp::now();
        let (written, kind) = classify_write(stream.write(&buf), buf.len());
        in_flight += 1;

        let mut ev = PacketEvent::blank(seq, Timestamp::now());
        ev.len = written;
        ev.sent_time = sent_time;
        ev.err_kind = kind;
        ev.transit_ready = true;
        ctx.ring.enqueue(ev);

        if kind.is_fatal() {
            break;
        }
    }
    Ok(())
}

fn run_tcp_write_events(stream: &mut impl Write, ctx: &FlowContext, cfg: &ClientConfig) -> CoreResult<()> {
    let start = Instant::now();
    let buf = vec![0u8; cfg.buffer_len];
    let mut seq: i64 = 0;
    let mut writecnt = 0u32;

    while start.elapsed() < cfg.duration && !ctx.is_shutting_down() {
        seq += 1;
        let sent_time = Timestamp::now();
        let (written, kind) = classify_write(stream.write(&buf), buf.len());
        writecnt += 1;

        if matches!(kind, ErrKind::WriteSelectRetry) {
            let mut ev = PacketEvent::blank(seq, Timestamp::now());
            ev.err_kind = ErrKind::WriteSelectRetry;
            ev.writecnt = writecnt;
            ctx.ring.enqueue(ev);
            clock::delay_loop(50);
            seq -= 1;
            continue;
        }

        let mut ev = PacketEvent::blank(seq, Timestamp::now());
        ev.len = written;
        ev.sent_time = sent_time;
        ev.err_kind = kind;
        ev.writecnt = writecnt;
        ev.transit_ready = true;
        ctx.ring.enqueue(ev);
        writecnt = 0;

        if kind.is_fatal() {
            break;
        }
    }
    Ok(())
}

fn run_tcp_bounce_back(
    stream: &mut (impl Read + Write),
    ctx: &FlowContext,
    request_size: u32,
    reply_size: u32,
    burst: u32,
) -> CoreResult<()> {
    let mut seq: i64 = 0;
    let mut req_buf = vec![0u8; request_size.max(crate::wire::BOUNCEBACK_WIRE_LEN as u32) as usize];
    let mut reply_buf = vec![0u8; reply_size.max(crate::wire::BOUNCEBACK_WIRE_LEN as u32) as usize];

    loop {
        if ctx.is_shutting_down() {
            break;
        }
        for i in 0..burst {
            seq += 1;
            let is_last = ctx.is_shutting_down() && i + 1 == burst;
            let hdr = BounceBackHeader {
                flags: 0,
                bbflags: if is_last { BbFlags::BBSTOP } else { 0 } | BbFlags::BBQUICKACK,
                bbsize: request_size,
                bbid: seq as u32,
                client_tx_ts: Timestamp::now(),
                server_rx_ts: Timestamp::ZERO,
                server_tx_ts: Timestamp::ZERO,
                bbhold: 0,
                bbreplysize: reply_size,
                tos: 0,
            };
            let mut hdr_bytes = Vec::new();
            hdr.encode(&mut hdr_bytes);
            req_buf[..hdr_bytes.len()].copy_from_slice(&hdr_bytes);

            let client_tx = Timestamp::now();
            if let Err(e) = stream.write_all(&req_buf) {
                return Err(CoreError::FatalWrite { flow_id: ctx.transfer_id, source: e });
            }
            if let Err(e) = stream.read_exact(&mut reply_buf) {
                return Err(CoreError::FatalRead { flow_id: ctx.transfer_id, source: e });
            }
            let reply = BounceBackHeader::decode(&mut &reply_buf[..])?;
            let now = Timestamp::now();

            let mut ev = PacketEvent::blank(seq, now);
            ev.len = req_buf.len() as u32;
            ev.read_len = reply_buf.len() as u32;
            ev.sent_time = client_tx;
            ev.bb_server_rx_ts = reply.server_rx_ts;
            ev.bb_server_tx_ts = reply.server_tx_ts;
            ev.err_kind = ErrKind::WriteSuccess;
            ev.transit_ready = true;
            ctx.ring.enqueue(ev);
        }
        if ctx.is_shutting_down() {
            break;
        }
    }
    Ok(())
}

fn run_udp_unconstrained(socket: &UdpSocket, ctx: &FlowContext, cfg: &ClientConfig) -> CoreResult<()> {
    let start = Instant::now();
    let mut seq: i64 = 0;
    let mut rng = rand::thread_rng();
    let max_len = cfg.buffer_len.max(crate::wire::UDP_DATAGRAM_WIRE_LEN);
    let mut buf = vec![0u8; max_len];

    while start.elapsed() < cfg.duration && !ctx.is_shutting_down() {
        seq += 1;
        let len = match &cfg.markov_lengths {
            Some(cell) => (cell.borrow_mut().next(&mut rng) as usize)
                .max(crate::wire::UDP_DATAGRAM_WIRE_LEN)
                .min(max_len),
            None => max_len,
        };
        let hdr = UdpDatagramHeader { seq, sent: Timestamp::now() };
        let mut hdr_bytes = Vec::new();
        hdr.encode(&mut hdr_bytes);
        buf[..hdr_bytes.len()].copy_from_slice(&hdr_bytes);

        let (written, kind) = classify_write(socket.send(&buf[..len]), len);
        let mut ev = PacketEvent::blank(seq, Timestamp::now());
        ev.len = written;
        ev.sent_time = hdr.sent;
        ev.err_kind = kind;
        ev.transit_ready = true;
        ctx.ring.enqueue(ev);
    }
    Ok(())
}

fn run_udp_isochronous(
    socket: &UdpSocket,
    ctx: &FlowContext,
    cfg: &ClientConfig,
    fps: f64,
    mean: f64,
    variance: f64,
) -> CoreResult<()> {
    let mut frames = IsochFrameCounter::new(fps, None);
    let mut rng = rand::thread_rng();
    let start = Instant::now();
    let mut seq: i64 = 0;
    let min_payload = 64usize;

    while start.elapsed() < cfg.duration && !ctx.is_shutting_down() {
        let (frame_id, sched_err) = frames.wait_tick(true);
        let mut remaining = sample_lognormal(mean, variance, &mut rng).max(min_payload as f64) as i64;
        let isoch_start = Timestamp::now();
        let mut prev_frame_id = frame_id.saturating_sub(1);

        while remaining > 0 && !ctx.is_shutting_down() {
            let this_len = (cfg.buffer_len as i64).min(remaining).max(min_payload as i64) as usize;
            seq += 1;
            let hdr = UdpDatagramHeader { seq, sent: Timestamp::now() };
            let mut buf = vec![0u8; this_len];
            let mut hdr_bytes = Vec::new();
            hdr.encode(&mut hdr_bytes);
            buf[..hdr_bytes.len().min(buf.len())].copy_from_slice(&hdr_bytes[..hdr_bytes.len().min(buf.len())]);

            let (written, kind) = classify_write(socket.send(&buf), buf.len());
            remaining -= written as i64;

            let mut ev = PacketEvent::blank(seq, Timestamp::now());
            ev.len = written;
            ev.sent_time = hdr.sent;
            ev.isoch_start_time = isoch_start;
            ev.frame_id = frame_id;
            ev.prev_frame_id = prev_frame_id;
            ev.remaining = remaining;
            ev.sched_err = sched_err;
            ev.scheduled = true;
            ev.err_kind = kind;
            ev.transit_ready = remaining <= 0;
            ctx.ring.enqueue(ev);
            prev_frame_id = frame_id;
        }
    }
    Ok(())
}

fn run_udp_burst(
    socket: &UdpSocket,
    ctx: &FlowContext,
    cfg: &ClientConfig,
    burst_size: u32,
    ipg: Duration,
) -> CoreResult<()> {
    let mut frames = IsochFrameCounter::new(1.0, None);
    let start = Instant::now();
    let mut seq: i64 = 0;

    while start.elapsed() < cfg.duration && !ctx.is_shutting_down() {
        let (frame_id, sched_err) = frames.wait_tick(true);
        let mut remaining = burst_size as i64;
        while remaining > 0 && !ctx.is_shutting_down() {
            let this_len = (cfg.buffer_len as i64).min(remaining) as usize;
            seq += 1;
            let buf = vec![0u8; this_len];
            let (written, kind) = classify_write(socket.send(&buf), buf.len());
            remaining -= written as i64;

            let mut ev = PacketEvent::blank(seq, Timestamp::now());
            ev.len = written;
            ev.frame_id = frame_id;
            ev.burst_size = burst_size;
            ev.remaining = remaining;
            ev.sched_err = sched_err;
            ev.err_kind = kind;
            ev.transit_ready = remaining <= 0;
            ctx.ring.enqueue(ev);

            if remaining > 0 {
                clock::delay_loop(ipg.as_micros() as u64);
            }
        }
    }
    Ok(())
}

/// A black-box stand-in for the L4S congestion-control oracle: the core only feeds it
/// ack feedback and asks it for a pacing decision, per the purpose statement's
/// "consumed as a black-box oracle" exclusion.
struct L4sOracle {
    pacing_rate_bps: f64,
    window: u32,
    burst: u32,
}

impl L4sOracle {
    fn new() -> Self {
        Self { pacing_rate_bps: 1_000_000.0, window: 8, burst: 2 }
    }

    fn on_ack(&mut self, ce_cnt: u32, lost_cnt: u32) {
        if ce_cnt > 0 || lost_cnt > 0 {
            self.pacing_rate_bps *= 0.85;
            self.window = self.window.saturating_sub(1).max(1);
        } else {
            self.pacing_rate_bps *= 1.02;
            self.window += 1;
        }
    }

    fn on_timeout(&mut self) {
        self.pacing_rate_bps *= 0.5;
        self.window = 1;
    }
}

fn run_udp_l4s(socket: &UdpSocket, ctx: &FlowContext, cfg: &ClientConfig) -> CoreResult<()> {
    socket.set_read_timeout(Some(Duration::from_millis(50))).ok();
    let mut oracle = L4sOracle::new();
    let start = Instant::now();
    let mut seq: i64 = 0;
    let mut inflight = 0u32;

    while start.elapsed() < cfg.duration && !ctx.is_shutting_down() {
        let to_send = oracle.window.saturating_sub(inflight).min(oracle.burst);
        for _ in 0..to_send {
            seq += 1;
            let dg = crate::wire::L4sForwardDatagram {
                udp: UdpDatagramHeader { seq, sent: Timestamp::now() },
                sender_seqno: seq as u32,
                sender_ts: Timestamp::now(),
                echoed_ts: Timestamp::ZERO,
            };
            let mut buf = Vec::new();
            dg.encode(&mut buf);
            let (written, kind) = classify_write(socket.send(&buf), buf.len());
            inflight += 1;

            let mut ev = PacketEvent::blank(seq, Timestamp::now());
            ev.len = written;
            ev.sent_time = dg.sender_ts;
            ev.err_kind = kind;
            ev.transit_ready = true;
            ctx.ring.enqueue(ev);
        }

        let mut ack_buf = vec![0u8; crate::wire::L4S_ACK_WIRE_LEN];
        match socket.recv(&mut ack_buf) {
            Ok(_) => {
                if let Ok(ack) = crate::wire::L4sAck::decode(&mut &ack_buf[..]) {
                    inflight = inflight.saturating_sub(ack.rx_cnt);
                    oracle.on_ack(ack.ce_cnt, ack.lost_cnt);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                if inflight >= oracle.window {
                    oracle.on_timeout();
                }
            }
            Err(_) => break,
        }
    }
    Ok(())
}

/// `AwaitServerFinPacket`: sends the negative-sequence FIN and retries every 10ms for
/// up to 200 attempts until a reply arrives. Any reply larger than a client-header-ack
/// is the server-relay report.
fn await_server_fin(socket: &UdpSocket, transfer_id: u64) -> CoreResult<()> {
    let fin = UdpDatagramHeader { seq: -1, sent: Timestamp::now() };
    let mut fin_bytes = Vec::new();
    fin.encode(&mut fin_bytes);

    socket.set_read_timeout(Some(Duration::from_millis(10))).ok();
    let mut reply = [0u8; 256];
    for _ in 0..200 {
        socket.send(&fin_bytes).ok();
        match socket.recv(&mut reply) {
            Ok(n) if crate::wire::ServerRelayReport::is_relay_report(n) => {
                if let Ok(report) = crate::wire::ServerRelayReport::decode(&mut &reply[..n]) {
                    tracing::info!(transfer_id, bytes = report.total_bytes, "server relay report");
                }
                return Ok(());
            }
            Ok(_) => return Ok(()),
            Err(_) => continue,
        }
    }
    Ok(())
}
