//! Server-relay report: the summary the server sends back in reply to a UDP client's
//! FIN, and which the client distinguishes from an ordinary client-header-ack purely
//! by size (anything larger than [`super::hdr_ack::WIRE_LEN`] is a relay report).

use super::{from_wire_ts, pack_seq, require, to_wire_ts, unpack_seq};
use crate::clock::Timestamp;
use crate::error::CoreError;
use bytes::{Buf, BufMut};

pub const WIRE_LEN: usize = 4 + 4 + 4 + 4 + 4 + 4 + 8 + 8 + 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerRelayReport {
    pub flags: u32,
    pub total_bytes: i64,
    pub total_datagrams: u32,
    pub total_lost: u32,
    pub total_out_of_order: u32,
    pub start: Timestamp,
    pub end: Timestamp,
    pub jitter_us: u32,
}

impl ServerRelayReport {
    pub fn encode(&self, buf: &mut impl BufMut) {
        let (bytes_lo, bytes_hi) = pack_seq(self.total_bytes);
        let (start_sec, start_usec) = to_wire_ts(&self.start);
        let (end_sec, end_usec) = to_wire_ts(&self.end);
        buf.put_u32(self.flags);
        buf.put_u32(bytes_lo);
        buf.put_u32(bytes_hi);
        buf.put_u32(self.total_datagrams);
        buf.put_u32(self.total_lost);
        buf.put_u32(self.total_out_of_order);
        buf.put_u32(start_sec);
        buf.put_u32(start_usec);
        buf.put_u32(end_sec);
        buf.put_u32(end_usec);
        buf.put_u32(self.jitter_us);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, CoreError> {
        require(buf, WIRE_LEN)?;
        let flags = buf.get_u32();
        let bytes_lo = buf.get_u32();
        let bytes_hi = buf.get_u32();
        let total_datagrams = buf.get_u32();
        let total_lost = buf.get_u32();
        let total_out_of_order = buf.get_u32();
        let start_sec = buf.get_u32();
        let start_usec = buf.get_u32();
        let end_sec = buf.get_u32();
        let end_usec = buf.get_u32();
        let jitter_us = buf.get_u32();
        Ok(Self {
            flags,
            total_bytes: unpack_seq(bytes_lo, bytes_hi),
            total_datagrams,
            total_lost,
            total_out_of_order,
            start: from_wire_ts(start_sec, start_usec),
            end: from_wire_ts(end_sec, end_usec),
            jitter_us,
        })
    }

    /// A reply is a relay report, not a client-header-ack, iff it is larger than the
    /// fixed client-header-ack size. Used by the UDP client's FIN retry loop to tell
    /// the two apart without a type tag.
    pub fn is_relay_report(reply_len: usize) -> bool {
        reply_len > super::hdr_ack::WIRE_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let report = ServerRelayReport {
            flags: 0,
            total_bytes: 125_000,
            total_datagrams: 85,
            total_lost: 0,
            total_out_of_order: 0,
            start: Timestamp::ZERO,
            end: Timestamp::new(1, 0),
            jitter_us: 42,
        };
        let mut buf = Vec::new();
        report.encode(&mut buf);
        assert_eq!(buf.len(), WIRE_LEN);
        assert_eq!(ServerRelayReport::decode(&mut &buf[..]).unwrap(), report);
    }

    #[test]
    fn size_distinguishes_from_hdr_ack() {
        assert!(ServerRelayReport::is_relay_report(WIRE_LEN));
        assert!(!ServerRelayReport::is_relay_report(
            super::super::hdr_ack::WIRE_LEN
        ));
    }
}
