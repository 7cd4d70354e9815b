//! UDP datagram header: `{ id_low, id_high, tv_sec, tv_usec }`, 16 bytes.

use super::{from_wire_ts, pack_seq, require, to_wire_ts, unpack_seq};
use crate::clock::Timestamp;
use crate::error::CoreError;
use bytes::{Buf, BufMut};

pub const WIRE_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UdpDatagramHeader {
    pub seq: i64,
    pub sent: Timestamp,
}

impl UdpDatagramHeader {
    /// A negative `seq` is a client FIN signal, not an error.
    pub fn is_fin(&self) -> bool {
        self.seq < 0
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        let (lo, hi) = pack_seq(self.seq);
        let (sec, usec) = to_wire_ts(&self.sent);
        buf.put_u32(lo);
        buf.put_u32(hi);
        buf.put_u32(sec);
        buf.put_u32(usec);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, CoreError> {
        require(buf, WIRE_LEN)?;
        let lo = buf.get_u32();
        let hi = buf.get_u32();
        let sec = buf.get_u32();
        let usec = buf.get_u32();
        Ok(Self {
            seq: unpack_seq(lo, hi),
            sent: from_wire_ts(sec, usec),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let hdr = UdpDatagramHeader {
            seq: 9001,
            sent: Timestamp::new(100, 250),
        };
        let mut buf = Vec::new();
        hdr.encode(&mut buf);
        assert_eq!(buf.len(), WIRE_LEN);
        let decoded = UdpDatagramHeader::decode(&mut &buf[..]).unwrap();
        assert_eq!(decoded, hdr);
        assert!(!decoded.is_fin());
    }

    #[test]
    fn negative_seq_is_fin() {
        let hdr = UdpDatagramHeader {
            seq: -9001,
            sent: Timestamp::ZERO,
        };
        let mut buf = Vec::new();
        hdr.encode(&mut buf);
        let decoded = UdpDatagramHeader::decode(&mut &buf[..]).unwrap();
        assert!(decoded.is_fin());
        assert_eq!(decoded.seq, -9001);
    }

    #[test]
    fn short_buffer_is_header_mismatch() {
        let short = [0u8; 10];
        let err = UdpDatagramHeader::decode(&mut &short[..]).unwrap_err();
        assert!(matches!(err, CoreError::HeaderMismatch { .. }));
    }
}
