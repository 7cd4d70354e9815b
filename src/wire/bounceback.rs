//! Bounce-back request/reply header carried on both legs of a bounce-back pair.

use super::{from_wire_ts, require, to_wire_ts};
use crate::clock::Timestamp;
use crate::error::CoreError;
use bytes::{Buf, BufMut};

pub const WIRE_LEN: usize = 4 + 4 + 4 + 4 + 8 + 8 + 8 + 4 + 4 + 4;

/// Bits of the `bbflags` word.
#[allow(non_snake_case)]
pub mod BbFlags {
    /// Set on the last write of a bounce-back exchange.
    pub const BBSTOP: u32 = 1 << 0;
    /// Request and reply sizes differ; `bbreplysize` is meaningful.
    pub const BBREPLYSIZE: u32 = 1 << 1;
    pub const BBQUICKACK: u32 = 1 << 2;
    pub const BBTOS: u32 = 1 << 3;
    pub const BBCLOCKSYNCED: u32 = 1 << 4;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BounceBackHeader {
    pub flags: u32,
    pub bbflags: u32,
    pub bbsize: u32,
    pub bbid: u32,
    pub client_tx_ts: Timestamp,
    pub server_rx_ts: Timestamp,
    pub server_tx_ts: Timestamp,
    pub bbhold: u32,
    pub bbreplysize: u32,
    /// Differentiated-services byte; only meaningful when `bbflags & BBTOS` is set.
    /// Carried as a full word on the wire to keep every field 4-byte aligned.
    pub tos: u32,
}

impl BounceBackHeader {
    pub fn encode(&self, buf: &mut impl BufMut) {
        let (ctx_sec, ctx_usec) = to_wire_ts(&self.client_tx_ts);
        let (srx_sec, srx_usec) = to_wire_ts(&self.server_rx_ts);
        let (stx_sec, stx_usec) = to_wire_ts(&self.server_tx_ts);
        buf.put_u32(self.flags);
        buf.put_u32(self.bbflags);
        buf.put_u32(self.bbsize);
        buf.put_u32(self.bbid);
        buf.put_u32(ctx_sec);
        buf.put_u32(ctx_usec);
        buf.put_u32(srx_sec);
        buf.put_u32(srx_usec);
        buf.put_u32(stx_sec);
        buf.put_u32(stx_usec);
        buf.put_u32(self.bbhold);
        buf.put_u32(self.bbreplysize);
        buf.put_u32(self.tos);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, CoreError> {
        require(buf, WIRE_LEN)?;
        let flags = buf.get_u32();
        let bbflags = buf.get_u32();
        let bbsize = buf.get_u32();
        let bbid = buf.get_u32();
        let ctx_sec = buf.get_u32();
        let ctx_usec = buf.get_u32();
        let srx_sec = buf.get_u32();
        let srx_usec = buf.get_u32();
        let stx_sec = buf.get_u32();
        let stx_usec = buf.get_u32();
        let bbhold = buf.get_u32();
        let bbreplysize = buf.get_u32();
        let tos = buf.get_u32();
        Ok(Self {
            flags,
            bbflags,
            bbsize,
            bbid,
            client_tx_ts: from_wire_ts(ctx_sec, ctx_usec),
            server_rx_ts: from_wire_ts(srx_sec, srx_usec),
            server_tx_ts: from_wire_ts(stx_sec, stx_usec),
            bbhold,
            bbreplysize,
            tos,
        })
    }

    pub fn is_last(&self) -> bool {
        self.bbflags & BbFlags::BBSTOP != 0
    }

    pub fn quickack_requested(&self) -> bool {
        self.bbflags & BbFlags::BBQUICKACK != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BounceBackHeader {
        BounceBackHeader {
            flags: 0,
            bbflags: BbFlags::BBQUICKACK | BbFlags::BBTOS,
            bbsize: 64,
            bbid: 7,
            client_tx_ts: Timestamp::new(1, 100),
            server_rx_ts: Timestamp::new(1, 200),
            server_tx_ts: Timestamp::new(1, 300),
            bbhold: 0,
            bbreplysize: 1024,
            tos: 0x2, // ECT(0)
        }
    }

    #[test]
    fn roundtrips() {
        let hdr = sample();
        let mut buf = Vec::new();
        hdr.encode(&mut buf);
        assert_eq!(buf.len(), WIRE_LEN);
        assert_eq!(BounceBackHeader::decode(&mut &buf[..]).unwrap(), hdr);
    }

    #[test]
    fn flag_helpers() {
        let mut hdr = sample();
        assert!(!hdr.is_last());
        assert!(hdr.quickack_requested());
        hdr.bbflags |= BbFlags::BBSTOP;
        assert!(hdr.is_last());
    }
}
