//! Fixtures shared by `netprobe-core`'s integration tests: timestamps, blank packet
//! events, and encoded wire-header byte buffers, so each test builds scenarios instead
//! of re-deriving boilerplate.

use bytes::{Bytes, BytesMut};
use netprobe_core::clock::Timestamp;
use netprobe_core::event::{ErrKind, PacketEvent};
use netprobe_core::transfer::{Role, Transport};
use netprobe_core::wire::{TcpBurstHeader, UdpDatagramHeader};

pub fn ts(sec: i64, usec: i64) -> Timestamp {
    Timestamp::new(sec, usec)
}

/// A successfully-accounted read/write event of `len` bytes, `transit_us` microseconds
/// after it was sent.
pub fn accounted_event(seq: i64, len: u32, transit_us: i64) -> PacketEvent {
    let sent = ts(0, 0);
    let mut ev = PacketEvent::blank(seq, sent.add_usec(transit_us));
    ev.len = len;
    ev.err_kind = ErrKind::ReadSuccess;
    ev.sent_time = sent;
    ev.transit_ready = true;
    ev
}

pub fn encoded_udp_datagram(seq: i64, sent: Timestamp) -> Bytes {
    let hdr = UdpDatagramHeader { seq, sent };
    let mut buf = BytesMut::with_capacity(netprobe_core::wire::UDP_DATAGRAM_WIRE_LEN);
    hdr.encode(&mut buf);
    buf.freeze()
}

pub fn encoded_tcp_burst(burst_id: u32, seqno: i64) -> Bytes {
    let hdr = TcpBurstHeader {
        flags: 0,
        burst_size: 8,
        burst_id,
        burst_period_us: 16_666,
        seqno,
        start: ts(0, 0),
        write: ts(0, 0),
    };
    let mut buf = BytesMut::with_capacity(netprobe_core::wire::TCP_BURST_WIRE_LEN);
    hdr.encode(&mut buf);
    buf.freeze()
}

/// A default client-side `TransferInfo` over TCP, one-second reporting interval.
pub fn client_transfer_info(transfer_id: u64) -> netprobe_core::transfer::TransferInfo {
    netprobe_core::transfer::TransferInfo::new(
        transfer_id,
        "[  1]",
        Role::Client,
        Transport::Tcp,
        false,
        false,
        Timestamp::ZERO,
        1_000_000,
    )
}
