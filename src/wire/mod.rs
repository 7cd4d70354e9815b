//! Big-endian wire codecs for every record the client and server exchange.
//!
//! All multi-byte fields are big-endian. Each record type here is a plain struct with
//! `encode`/`decode` methods operating on [`bytes::BufMut`]/[`bytes::Buf`] (the same
//! network-byte-order parsing idiom `bbaldino-rtp-parse` uses for RTP headers), rather
//! than hand-rolled shift-and-mask code. `decode` never panics on short input: every
//! record checks `buf.remaining()` first and returns [`CoreError::HeaderMismatch`]
//! instead of letting `bytes` abort the process.

mod bounceback;
mod burst;
mod datagram;
mod hdr_ack;
mod l4s;
mod relay;
mod test_header;

pub use bounceback::{BbFlags, BounceBackHeader, WIRE_LEN as BOUNCEBACK_WIRE_LEN};
pub use burst::{TcpBurstHeader, WIRE_LEN as TCP_BURST_WIRE_LEN};
pub use datagram::{UdpDatagramHeader, WIRE_LEN as UDP_DATAGRAM_WIRE_LEN};
pub use hdr_ack::{ClientHeaderAck, WIRE_LEN as CLIENT_HDR_ACK_WIRE_LEN};
pub use l4s::{L4sAck, L4sForwardDatagram, ACK_WIRE_LEN as L4S_ACK_WIRE_LEN, FORWARD_WIRE_LEN as L4S_FORWARD_WIRE_LEN};
pub use relay::{ServerRelayReport, WIRE_LEN as SERVER_RELAY_WIRE_LEN};
pub use test_header::{
    BounceBackParams, IsochParams, Settings_ClientTestHdrLen, TestHdrFlags, TestHeader,
    BASE_LEN as TEST_HEADER_BASE_LEN,
};

use crate::clock::Timestamp;
use crate::error::CoreError;
use bytes::Buf;

/// Packs a signed 64-bit sequence id into the `(low, high)` 32-bit words the wire
/// format uses, so that a legacy peer reading only `low` still sees a correct signed
/// value for sequences within `i32` range.
pub fn pack_seq(seq: i64) -> (u32, u32) {
    let bits = seq as u64;
    (bits as u32, (bits >> 32) as u32)
}

pub fn unpack_seq(low: u32, high: u32) -> i64 {
    (((high as u64) << 32) | low as u64) as i64
}

pub(crate) fn to_wire_ts(ts: &Timestamp) -> (u32, u32) {
    (ts.sec as u32, ts.usec as u32)
}

pub(crate) fn from_wire_ts(sec: u32, usec: u32) -> Timestamp {
    Timestamp::new(sec as i64, usec as i64)
}

pub(crate) fn require(buf: &impl Buf, needed: usize) -> Result<(), CoreError> {
    if buf.remaining() < needed {
        Err(CoreError::HeaderMismatch {
            expected: needed,
            got: buf.remaining(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_roundtrips_positive_and_negative() {
        for seq in [0i64, 1, -1, i32::MAX as i64, i32::MIN as i64, -12345] {
            let (lo, hi) = pack_seq(seq);
            assert_eq!(unpack_seq(lo, hi), seq);
        }
    }

    #[test]
    fn legacy_low_word_matches_small_positive_sequences() {
        let (lo, _hi) = pack_seq(42);
        assert_eq!(lo, 42);
    }
}
