//! Server-side receive loops: TCP stream, UDP datagram, and TCP bounce-back
//! responder, plus the UDP per-flow state machine they drive.
//!
//! Mirrors `client.rs`'s shape: a top-level `run_*` per transport arms the full-duplex
//! start barrier, dispatches to the configured discipline, then tears down through
//! [`finish`] the same way the client side does.

use super::{arm_full_duplex_start, arm_full_duplex_stop, FlowContext};
use crate::clock::Timestamp;
use crate::error::{CoreError, CoreResult};
use crate::event::{ErrKind, LossTally, PacketEvent};
use crate::wire::{
    BbFlags, BounceBackHeader, ClientHeaderAck, ServerRelayReport, Settings_ClientTestHdrLen,
    TcpBurstHeader, TestHeader, UdpDatagramHeader,
};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::time::{Duration, Instant};

/// Mirrors the UDP per-flow server-side state machine: `ReadyToAccept →
/// FirstPayloadParsed → Running → LastPacketSeen → AckFinSent → Closed`. A fatal read
/// transitions straight to `Closed` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpFlowState {
    ReadyToAccept,
    FirstPayloadParsed,
    Running,
    LastPacketSeen,
    AckFinSent,
    Closed,
}

/// Which receive discipline a server-side flow runs. Selected by the same CLI mode the
/// client used to launch its matching flow. The test header exchanged in
/// [`read_test_header_tcp`]/[`read_test_header_udp`] carries buffer/isoch/bounce-back
/// *parameters*, not a discipline selector — the two ends still have to agree on
/// `--mode`/`--transport` out of band.
pub enum ServerDiscipline {
    Tcp,
    TcpBounceBack { reply_size: u32 },
    Udp,
    UdpL4s,
}

pub struct ServerConfig {
    pub buffer_len: usize,
    pub discipline: ServerDiscipline,
}

fn finish(ctx: &FlowContext) -> CoreResult<()> {
    ctx.ring.enqueue(PacketEvent::sentinel(Timestamp::now()));
    ctx.ring.await_consumer_done();
    arm_full_duplex_stop(ctx.full_duplex.as_ref())?;
    Ok(())
}

/// Replies to the client's published test header with a `ClientHeaderAck`, timestamped
/// `sent` (client tx, from the header's trip-time extension if present), `sent_rx`
/// (this read), and `ack` (just before the write). A truncated or malformed tail is a
/// [`CoreError::HeaderMismatch`] per the connection protocol.
fn header_ack_for(hdr: &TestHeader, server_rx: Timestamp) -> ClientHeaderAck {
    ClientHeaderAck {
        ack_type: 1,
        len: crate::wire::CLIENT_HDR_ACK_WIRE_LEN as u32,
        version_upper: 1,
        version_lower: 0,
        sent: hdr.trip_time_start.unwrap_or(server_rx),
        sent_rx: server_rx,
        ack: Timestamp::now(),
    }
}

/// `InitTrafficLoop`'s handshake step for a TCP flow: read the 4-byte flags word,
/// then `Settings_ClientTestHdrLen(flags)` more bytes, decode the full test header,
/// and reply with a `ClientHeaderAck` before the discipline loop reads its first
/// burst.
fn read_test_header_tcp(stream: &mut TcpStream, ctx: &FlowContext) -> CoreResult<()> {
    let mut flags_buf = [0u8; 4];
    stream
        .read_exact(&mut flags_buf)
        .map_err(|e| CoreError::FatalRead { flow_id: ctx.transfer_id, source: e })?;
    let flags = u32::from_be_bytes(flags_buf);

    let tail_len = Settings_ClientTestHdrLen(flags);
    let mut tail_buf = vec![0u8; tail_len];
    stream
        .read_exact(&mut tail_buf)
        .map_err(|e| CoreError::FatalRead { flow_id: ctx.transfer_id, source: e })?;
    let server_rx = Timestamp::now();

    let mut full = Vec::with_capacity(4 + tail_len);
    full.extend_from_slice(&flags_buf);
    full.extend_from_slice(&tail_buf);
    let hdr = TestHeader::decode(&mut &full[..])?;

    let mut ack_buf = Vec::new();
    header_ack_for(&hdr, server_rx).encode(&mut ack_buf);
    stream
        .write_all(&ack_buf)
        .map_err(|e| CoreError::FatalWrite { flow_id: ctx.transfer_id, source: e })?;
    Ok(())
}

/// As [`read_test_header_tcp`], but the whole header arrives in a single datagram, so
/// there is nothing to split across two reads — `TestHeader::decode` bounds-checks the
/// one packet directly.
fn read_test_header_udp(socket: &UdpSocket, ctx: &FlowContext) -> CoreResult<()> {
    let mut buf = vec![0u8; 256];
    loop {
        if ctx.is_shutting_down() {
            return Err(CoreError::FatalRead {
                flow_id: ctx.transfer_id,
                source: std::io::Error::new(ErrorKind::TimedOut, "shutdown before test header"),
            });
        }
        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => return Err(CoreError::FatalRead { flow_id: ctx.transfer_id, source: e }),
        };
        let server_rx = Timestamp::now();
        let hdr = TestHeader::decode(&mut &buf[..n])?;

        let mut ack_buf = Vec::new();
        header_ack_for(&hdr, server_rx).encode(&mut ack_buf);
        socket.send_to(&ack_buf, from).ok();
        return Ok(());
    }
}

/// Top-level TCP entry point: arms the start barrier, dispatches to plain-stream
/// receive or the bounce-back responder, tears down through [`finish`].
pub fn run_tcp(mut stream: TcpStream, ctx: &FlowContext, cfg: &ServerConfig) -> CoreResult<()> {
    stream.set_read_timeout(Some(Duration::from_millis(200))).ok();
    if let Some(barrier) = &ctx.connect_barrier {
        barrier.arrive();
    }
    arm_full_duplex_start(ctx.full_duplex.as_ref())?;
    read_test_header_tcp(&mut stream, ctx)?;

    let result = match cfg.discipline {
        ServerDiscipline::Tcp => receive_tcp_stream(&mut stream, ctx, cfg),
        ServerDiscipline::TcpBounceBack { reply_size } => {
            bounce_back_tcp(&mut stream, ctx, reply_size)
        }
        _ => Err(CoreError::HeaderMismatch { expected: 0, got: 0 }),
    };
    finish(ctx)?;
    result
}

/// Top-level UDP entry point: arms the start barrier, dispatches to the datagram loop
/// or its L4S variant, tears down through [`finish`].
pub fn run_udp(socket: UdpSocket, ctx: &FlowContext, cfg: &ServerConfig) -> CoreResult<()> {
    socket.set_read_timeout(Some(Duration::from_millis(200))).ok();
    if let Some(barrier) = &ctx.connect_barrier {
        barrier.arrive();
    }
    arm_full_duplex_start(ctx.full_duplex.as_ref())?;
    read_test_header_udp(&socket, ctx)?;

    let result = match cfg.discipline {
        ServerDiscipline::Udp => receive_udp(&socket, ctx, cfg),
        ServerDiscipline::UdpL4s => receive_udp_l4s(&socket, ctx),
        _ => Err(CoreError::HeaderMismatch { expected: 0, got: 0 }),
    };
    finish(ctx)?;
    result
}

/// `InitTrafficLoop`/`RunTCP` body: reads burst headers or body chunks, copies sender
/// timestamps into the event on `transit_ready`, exits on fatal read, peer close, or
/// the shutdown flag.
fn receive_tcp_stream(stream: &mut TcpStream, ctx: &FlowContext, cfg: &ServerConfig) -> CoreResult<()> {
    let mut body = vec![0u8; cfg.buffer_len];

    loop {
        if ctx.is_shutting_down() {
            break;
        }
        let mut hdr_buf = vec![0u8; crate::wire::TCP_BURST_WIRE_LEN];
        match stream.read_exact(&mut hdr_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(CoreError::FatalRead { flow_id: ctx.transfer_id, source: e }),
        };
        let hdr = TcpBurstHeader::decode(&mut &hdr_buf[..])?;

        let mut remaining = hdr.burst_size as usize;
        let mut received = hdr_buf.len();
        while remaining > 0 {
            let this_len = remaining.min(body.len());
            match stream.read(&mut body[..this_len]) {
                Ok(0) => break,
                Ok(n) => {
                    remaining = remaining.saturating_sub(n);
                    received += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => continue,
                Err(e) => return Err(CoreError::FatalRead { flow_id: ctx.transfer_id, source: e }),
            }
        }

        let mut ev = PacketEvent::blank(hdr.seqno, Timestamp::now());
        ev.len = received as u32;
        ev.read_len = ev.len;
        ev.sent_time = hdr.write;
        ev.prev_sent_time = hdr.start;
        ev.err_kind = ErrKind::ReadSuccess;
        ev.transit_ready = true;
        ctx.ring.enqueue(ev);
    }
    Ok(())
}

/// TCP bounce-back responder: stamps server-Rx on arrival, server-Tx just before the
/// reply, forces `TCP_NODELAY`, honours `BBQUICKACK`, and stops on `BBSTOP`.
fn bounce_back_tcp(stream: &mut TcpStream, ctx: &FlowContext, reply_size: u32) -> CoreResult<()> {
    stream.set_nodelay(true).ok();
    let mut req_buf = vec![0u8; crate::wire::BOUNCEBACK_WIRE_LEN.max(reply_size as usize)];

    loop {
        if ctx.is_shutting_down() {
            break;
        }
        match stream.read_exact(&mut req_buf[..crate::wire::BOUNCEBACK_WIRE_LEN]) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(CoreError::FatalRead { flow_id: ctx.transfer_id, source: e }),
        }
        let server_rx = Timestamp::now();
        let mut req = BounceBackHeader::decode(&mut &req_buf[..crate::wire::BOUNCEBACK_WIRE_LEN])?;
        req.server_rx_ts = server_rx;

        let reply_len = if req.bbflags & BbFlags::BBREPLYSIZE != 0 {
            req.bbreplysize.max(crate::wire::BOUNCEBACK_WIRE_LEN as u32) as usize
        } else {
            crate::wire::BOUNCEBACK_WIRE_LEN
        };
        let mut reply_buf = vec![0u8; reply_len];
        req.server_tx_ts = Timestamp::now();
        let mut hdr_bytes = Vec::new();
        req.encode(&mut hdr_bytes);
        let copy_len = hdr_bytes.len().min(reply_buf.len());
        reply_buf[..copy_len].copy_from_slice(&hdr_bytes[..copy_len]);

        if let Err(e) = stream.write_all(&reply_buf) {
            return Err(CoreError::FatalWrite { flow_id: ctx.transfer_id, source: e });
        }

        let mut ev = PacketEvent::blank(req.bbid as i64, Timestamp::now());
        ev.len = req_buf.len() as u32;
        ev.write_len = reply_buf.len() as u32;
        ev.bb_server_rx_ts = server_rx;
        ev.bb_server_tx_ts = req.server_tx_ts;
        ev.err_kind = ErrKind::ReadSuccess;
        ev.transit_ready = true;
        ctx.ring.enqueue(ev);

        if req.is_last() {
            break;
        }
    }
    Ok(())
}

/// `RunUDP`: loop on `recv`, fill `packet_time`, parse the datagram header, run
/// loss/out-of-order accounting against the highest sequence id seen, flag the last
/// packet on a negative sequence, and reply with the UDP ack-FIN (server-relay
/// report) before returning.
fn receive_udp(socket: &UdpSocket, ctx: &FlowContext, cfg: &ServerConfig) -> CoreResult<()> {
    let mut buf = vec![0u8; cfg.buffer_len.max(crate::wire::UDP_DATAGRAM_WIRE_LEN)];
    let mut state = UdpFlowState::ReadyToAccept;
    let mut highest_seq: i64 = -1;
    let mut total_bytes: i64 = 0;
    let mut total_datagrams: u32 = 0;
    let mut lost: u32 = 0;
    let mut out_of_order: u32 = 0;
    let mut peer = None;
    let start = Timestamp::now();

    loop {
        if ctx.is_shutting_down() && state != UdpFlowState::LastPacketSeen {
            state = UdpFlowState::Closed;
            break;
        }
        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => {
                return Err(CoreError::FatalRead { flow_id: ctx.transfer_id, source: e });
            }
        };
        peer = Some(from);
        let packet_time = Timestamp::now();
        let hdr = UdpDatagramHeader::decode(&mut &buf[..n])?;

        if state == UdpFlowState::ReadyToAccept {
            state = UdpFlowState::FirstPayloadParsed;
        }

        if hdr.is_fin() {
            state = UdpFlowState::LastPacketSeen;
        } else {
            state = UdpFlowState::Running;
            total_bytes += n as i64;
            total_datagrams += 1;
            if hdr.seq <= highest_seq {
                out_of_order += 1;
            } else {
                if hdr.seq > highest_seq + 1 {
                    lost += (hdr.seq - highest_seq - 1) as u32;
                }
                highest_seq = hdr.seq;
            }

            let mut ev = PacketEvent::blank(hdr.seq, packet_time);
            ev.len = n as u32;
            ev.read_len = ev.len;
            ev.sent_time = hdr.sent;
            ev.err_kind = ErrKind::ReadSuccess;
            ev.transit_ready = true;
            ev.loss_tally = Some(LossTally { lost, out_of_order });
            ctx.ring.enqueue(ev);
        }

        if state == UdpFlowState::LastPacketSeen {
            if let Some(peer_addr) = peer {
                let report = ServerRelayReport {
                    flags: 0,
                    total_bytes,
                    total_datagrams,
                    total_lost: lost,
                    total_out_of_order: out_of_order,
                    start,
                    end: packet_time,
                    jitter_us: 0,
                };
                let mut bytes = Vec::new();
                report.encode(&mut bytes);
                socket.send_to(&bytes, peer_addr).ok();
            }
            state = UdpFlowState::AckFinSent;
            break;
        }
    }
    let _ = state;
    Ok(())
}

/// `RunUDPL4S`: as [`receive_udp`], plus decoding `{sender_ts, echoed_ts, sender_seqno}`
/// and emitting an L4S ack each cycle.
fn receive_udp_l4s(socket: &UdpSocket, ctx: &FlowContext) -> CoreResult<()> {
    let mut buf = vec![0u8; crate::wire::L4S_FORWARD_WIRE_LEN.max(256)];
    let mut rx_cnt = 0u32;
    let ce_cnt = 0u32;
    let mut lost_cnt = 0u32;
    let mut highest_seq: i64 = -1;
    let cycle_start = Instant::now();

    loop {
        if ctx.is_shutting_down() {
            break;
        }
        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                if cycle_start.elapsed() > Duration::from_secs(5) {
                    break;
                }
                continue;
            }
            Err(e) => return Err(CoreError::FatalRead { flow_id: ctx.transfer_id, source: e }),
        };
        let packet_time = Timestamp::now();
        let dg = crate::wire::L4sForwardDatagram::decode(&mut &buf[..n])?;
        rx_cnt += 1;
        if dg.udp.seq > highest_seq {
            if dg.udp.seq > highest_seq + 1 {
                lost_cnt += (dg.udp.seq - highest_seq - 1) as u32;
            }
            highest_seq = dg.udp.seq;
        }

        let mut ev = PacketEvent::blank(dg.udp.seq, packet_time);
        ev.len = n as u32;
        ev.sent_time = dg.sender_ts;
        ev.err_kind = ErrKind::ReadSuccess;
        ev.transit_ready = true;
        ev.loss_tally = Some(LossTally { lost: lost_cnt, out_of_order: 0 });
        ctx.ring.enqueue(ev);

        let ack = crate::wire::L4sAck {
            rx_ts: packet_time,
            echoed_ts: dg.sender_ts,
            rx_cnt,
            ce_cnt,
            lost_cnt,
            flags: 0,
            reserved: 0,
        };
        let mut ack_bytes = Vec::new();
        ack.encode(&mut ack_bytes);
        socket.send_to(&ack_bytes, from).ok();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udp_flow_state_transitions_are_distinct() {
        assert_ne!(UdpFlowState::ReadyToAccept, UdpFlowState::Closed);
        assert_eq!(UdpFlowState::Running, UdpFlowState::Running);
    }
}
