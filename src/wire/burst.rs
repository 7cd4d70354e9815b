//! TCP burst payload prefix, written at the start of every burst in the TCP
//! disciplines that frame writes into bursts (unconstrained, rate-limited,
//! near-congestion, isochronous).

use super::{from_wire_ts, pack_seq, require, to_wire_ts, unpack_seq};
use crate::clock::Timestamp;
use crate::error::CoreError;
use bytes::{Buf, BufMut};

pub const WIRE_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TcpBurstHeader {
    pub flags: u32,
    pub burst_size: u32,
    pub burst_id: u32,
    pub burst_period_us: u32,
    pub seqno: i64,
    pub start: Timestamp,
    pub write: Timestamp,
}

impl TcpBurstHeader {
    pub fn encode(&self, buf: &mut impl BufMut) {
        let (seq_lo, seq_hi) = pack_seq(self.seqno);
        let (start_sec, start_usec) = to_wire_ts(&self.start);
        let (write_sec, write_usec) = to_wire_ts(&self.write);
        buf.put_u32(self.flags);
        buf.put_u32(self.burst_size);
        buf.put_u32(self.burst_id);
        buf.put_u32(self.burst_period_us);
        buf.put_u32(seq_lo);
        buf.put_u32(seq_hi);
        buf.put_u32(start_sec);
        buf.put_u32(start_usec);
        buf.put_u32(write_sec);
        buf.put_u32(write_usec);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, CoreError> {
        require(buf, WIRE_LEN)?;
        let flags = buf.get_u32();
        let burst_size = buf.get_u32();
        let burst_id = buf.get_u32();
        let burst_period_us = buf.get_u32();
        let seq_lo = buf.get_u32();
        let seq_hi = buf.get_u32();
        let start_sec = buf.get_u32();
        let start_usec = buf.get_u32();
        let write_sec = buf.get_u32();
        let write_usec = buf.get_u32();
        Ok(Self {
            flags,
            burst_size,
            burst_id,
            burst_period_us,
            seqno: unpack_seq(seq_lo, seq_hi),
            start: from_wire_ts(start_sec, start_usec),
            write: from_wire_ts(write_sec, write_usec),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let hdr = TcpBurstHeader {
            flags: 0,
            burst_size: 1_000_000,
            burst_id: 42,
            burst_period_us: 16_667,
            seqno: 123_456,
            start: Timestamp::new(1, 2),
            write: Timestamp::new(3, 4),
        };
        let mut buf = Vec::new();
        hdr.encode(&mut buf);
        assert_eq!(buf.len(), WIRE_LEN);
        assert_eq!(TcpBurstHeader::decode(&mut &buf[..]).unwrap(), hdr);
    }
}
