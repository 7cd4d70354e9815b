//! Client-header-ack: the server's reply to the client's first payload, carrying
//! three timestamps so the client can estimate RTT and half-RTT without a separate
//! bounce-back pass.

use super::{from_wire_ts, require, to_wire_ts};
use crate::clock::Timestamp;
use crate::error::CoreError;
use bytes::{Buf, BufMut};

pub const WIRE_LEN: usize = 4 + 4 + 4 + 4 + 8 + 8 + 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientHeaderAck {
    pub ack_type: u32,
    pub len: u32,
    pub version_upper: u32,
    pub version_lower: u32,
    pub sent: Timestamp,
    pub sent_rx: Timestamp,
    pub ack: Timestamp,
}

impl ClientHeaderAck {
    pub fn encode(&self, buf: &mut impl BufMut) {
        let (sent_sec, sent_usec) = to_wire_ts(&self.sent);
        let (rx_sec, rx_usec) = to_wire_ts(&self.sent_rx);
        let (ack_sec, ack_usec) = to_wire_ts(&self.ack);
        buf.put_u32(self.ack_type);
        buf.put_u32(self.len);
        buf.put_u32(self.version_upper);
        buf.put_u32(self.version_lower);
        buf.put_u32(sent_sec);
        buf.put_u32(sent_usec);
        buf.put_u32(rx_sec);
        buf.put_u32(rx_usec);
        buf.put_u32(ack_sec);
        buf.put_u32(ack_usec);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, CoreError> {
        require(buf, WIRE_LEN)?;
        let ack_type = buf.get_u32();
        let len = buf.get_u32();
        let version_upper = buf.get_u32();
        let version_lower = buf.get_u32();
        let sent_sec = buf.get_u32();
        let sent_usec = buf.get_u32();
        let rx_sec = buf.get_u32();
        let rx_usec = buf.get_u32();
        let ack_sec = buf.get_u32();
        let ack_usec = buf.get_u32();
        Ok(Self {
            ack_type,
            len,
            version_upper,
            version_lower,
            sent: from_wire_ts(sent_sec, sent_usec),
            sent_rx: from_wire_ts(rx_sec, rx_usec),
            ack: from_wire_ts(ack_sec, ack_usec),
        })
    }

    /// Client-observed RTT: time from sending the first payload to receiving this
    /// ack, in microseconds. Negative only if clocks disagree (see `ClockSyncError`).
    pub fn rtt_us(&self, now: Timestamp) -> i64 {
        now.sub_usec(&self.sent)
    }

    /// Half-RTT estimated from the server's own rx/tx gap subtracted out.
    pub fn half_rtt_us(&self, now: Timestamp) -> i64 {
        let full = self.rtt_us(now);
        let server_hold = self.ack.sub_usec(&self.sent_rx);
        (full - server_hold) / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let ack = ClientHeaderAck {
            ack_type: 1,
            len: WIRE_LEN as u32,
            version_upper: 2,
            version_lower: 1,
            sent: Timestamp::new(10, 0),
            sent_rx: Timestamp::new(10, 50_000),
            ack: Timestamp::new(10, 60_000),
        };
        let mut buf = Vec::new();
        ack.encode(&mut buf);
        assert_eq!(buf.len(), WIRE_LEN);
        assert_eq!(ClientHeaderAck::decode(&mut &buf[..]).unwrap(), ack);
    }

    #[test]
    fn rtt_and_half_rtt() {
        let ack = ClientHeaderAck {
            ack_type: 1,
            len: WIRE_LEN as u32,
            version_upper: 0,
            version_lower: 0,
            sent: Timestamp::new(10, 0),
            sent_rx: Timestamp::new(10, 40_000),
            ack: Timestamp::new(10, 50_000),
        };
        let now = Timestamp::new(10, 100_000);
        assert_eq!(ack.rtt_us(now), 100_000);
        // server held the request for 10ms; half of the remaining 90ms is 45ms.
        assert_eq!(ack.half_rtt_us(now), 45_000);
    }
}
