//! L4S forward datagram and ack. The forward datagram rides on top of the standard
//! UDP header so a non-L4S-aware decoder can still recover sequencing and timing.

use super::{datagram::UdpDatagramHeader, from_wire_ts, require, to_wire_ts};
use crate::clock::Timestamp;
use crate::error::CoreError;
use bytes::{Buf, BufMut};

pub mod l4s_ack_flags {
    /// The peer reported an ECN error (CE seen without a congestion response, or a
    /// malformed ECN field).
    pub const L4S_ECN_ERR: u32 = 1 << 0;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct L4sForwardDatagram {
    pub udp: UdpDatagramHeader,
    pub sender_seqno: u32,
    pub sender_ts: Timestamp,
    pub echoed_ts: Timestamp,
}

pub const FORWARD_WIRE_LEN: usize = super::datagram::WIRE_LEN + 4 + 8 + 8;

impl L4sForwardDatagram {
    pub fn encode(&self, buf: &mut impl BufMut) {
        self.udp.encode(buf);
        let (sender_sec, sender_usec) = to_wire_ts(&self.sender_ts);
        let (echo_sec, echo_usec) = to_wire_ts(&self.echoed_ts);
        buf.put_u32(self.sender_seqno);
        buf.put_u32(sender_sec);
        buf.put_u32(sender_usec);
        buf.put_u32(echo_sec);
        buf.put_u32(echo_usec);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, CoreError> {
        let udp = UdpDatagramHeader::decode(buf)?;
        require(buf, FORWARD_WIRE_LEN - super::datagram::WIRE_LEN)?;
        let sender_seqno = buf.get_u32();
        let sender_sec = buf.get_u32();
        let sender_usec = buf.get_u32();
        let echo_sec = buf.get_u32();
        let echo_usec = buf.get_u32();
        Ok(Self {
            udp,
            sender_seqno,
            sender_ts: from_wire_ts(sender_sec, sender_usec),
            echoed_ts: from_wire_ts(echo_sec, echo_usec),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct L4sAck {
    pub rx_ts: Timestamp,
    pub echoed_ts: Timestamp,
    pub rx_cnt: u32,
    pub ce_cnt: u32,
    pub lost_cnt: u32,
    pub flags: u32,
    pub reserved: u32,
}

pub const ACK_WIRE_LEN: usize = 8 + 8 + 4 + 4 + 4 + 4 + 4;

impl L4sAck {
    pub fn encode(&self, buf: &mut impl BufMut) {
        let (rx_sec, rx_usec) = to_wire_ts(&self.rx_ts);
        let (echo_sec, echo_usec) = to_wire_ts(&self.echoed_ts);
        buf.put_u32(rx_sec);
        buf.put_u32(rx_usec);
        buf.put_u32(echo_sec);
        buf.put_u32(echo_usec);
        buf.put_u32(self.rx_cnt);
        buf.put_u32(self.ce_cnt);
        buf.put_u32(self.lost_cnt);
        buf.put_u32(self.flags);
        buf.put_u32(self.reserved);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, CoreError> {
        require(buf, ACK_WIRE_LEN)?;
        let rx_sec = buf.get_u32();
        let rx_usec = buf.get_u32();
        let echo_sec = buf.get_u32();
        let echo_usec = buf.get_u32();
        let rx_cnt = buf.get_u32();
        let ce_cnt = buf.get_u32();
        let lost_cnt = buf.get_u32();
        let flags = buf.get_u32();
        let reserved = buf.get_u32();
        Ok(Self {
            rx_ts: from_wire_ts(rx_sec, rx_usec),
            echoed_ts: from_wire_ts(echo_sec, echo_usec),
            rx_cnt,
            ce_cnt,
            lost_cnt,
            flags,
            reserved,
        })
    }

    pub fn has_ecn_error(&self) -> bool {
        self.flags & l4s_ack_flags::L4S_ECN_ERR != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_datagram_roundtrips() {
        let dg = L4sForwardDatagram {
            udp: UdpDatagramHeader {
                seq: 77,
                sent: Timestamp::new(1, 2),
            },
            sender_seqno: 77,
            sender_ts: Timestamp::new(1, 2),
            echoed_ts: Timestamp::new(0, 0),
        };
        let mut buf = Vec::new();
        dg.encode(&mut buf);
        assert_eq!(buf.len(), FORWARD_WIRE_LEN);
        assert_eq!(L4sForwardDatagram::decode(&mut &buf[..]).unwrap(), dg);
    }

    #[test]
    fn ack_roundtrips_and_flags() {
        let ack = L4sAck {
            rx_ts: Timestamp::new(1, 0),
            echoed_ts: Timestamp::new(1, 0),
            rx_cnt: 10,
            ce_cnt: 2,
            lost_cnt: 0,
            flags: l4s_ack_flags::L4S_ECN_ERR,
            reserved: 0,
        };
        let mut buf = Vec::new();
        ack.encode(&mut buf);
        assert_eq!(buf.len(), ACK_WIRE_LEN);
        let decoded = L4sAck::decode(&mut &buf[..]).unwrap();
        assert_eq!(decoded, ack);
        assert!(decoded.has_ecn_error());
    }
}
