//! Client→server test-parameter header.
//!
//! The base record is a fixed 24 bytes: `{ flags, num_threads, m_port, buffer_len,
//! m_win_band, m_amount }`. `flags` is a bitset selecting which extensions follow;
//! [`Settings_ClientTestHdrLen`] tells the reader exactly how many more bytes to pull
//! off the wire before the header is complete, so a peer never has to guess.

use super::{from_wire_ts, require, to_wire_ts};
use crate::clock::Timestamp;
use crate::error::CoreError;
use bytes::{Buf, BufMut};

pub const BASE_LEN: usize = 24;
const ISOCH_EXT_LEN: usize = 16;
const TRIP_TIME_EXT_LEN: usize = 8;
const BOUNCE_BACK_EXT_LEN: usize = 8;

/// Bits of the `flags` word selecting which optional extensions follow the base
/// record.
#[allow(non_snake_case)]
pub mod TestHdrFlags {
    pub const ISOCH: u32 = 1 << 0;
    pub const TRIP_TIME: u32 = 1 << 1;
    pub const BOUNCE_BACK: u32 = 1 << 2;
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IsochParams {
    pub fps: f32,
    pub mean: u32,
    pub variance: u32,
    pub burst_ipg_us: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BounceBackParams {
    pub request_size: u32,
    pub reply_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestHeader {
    pub flags: u32,
    pub num_threads: u32,
    pub m_port: u32,
    pub buffer_len: u32,
    pub m_win_band: u32,
    pub m_amount: u32,
    pub isoch: Option<IsochParams>,
    pub trip_time_start: Option<Timestamp>,
    pub bounce_back: Option<BounceBackParams>,
}

/// Returns the number of bytes that must follow the first 4-byte (`flags`) read for a
/// complete header: the remainder of the base record plus whichever extensions
/// `flags` selects. Callers MUST consult this before attempting to read the tail.
#[allow(non_snake_case)]
pub fn Settings_ClientTestHdrLen(flags: u32) -> usize {
    let mut len = BASE_LEN - 4;
    if flags & TestHdrFlags::ISOCH != 0 {
        len += ISOCH_EXT_LEN;
    }
    if flags & TestHdrFlags::TRIP_TIME != 0 {
        len += TRIP_TIME_EXT_LEN;
    }
    if flags & TestHdrFlags::BOUNCE_BACK != 0 {
        len += BOUNCE_BACK_EXT_LEN;
    }
    len
}

impl TestHeader {
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.flags);
        buf.put_u32(self.num_threads);
        buf.put_u32(self.m_port);
        buf.put_u32(self.buffer_len);
        buf.put_u32(self.m_win_band);
        buf.put_u32(self.m_amount);
        if let Some(isoch) = self.isoch {
            buf.put_f32(isoch.fps);
            buf.put_u32(isoch.mean);
            buf.put_u32(isoch.variance);
            buf.put_u32(isoch.burst_ipg_us);
        }
        if let Some(start) = self.trip_time_start {
            let (sec, usec) = to_wire_ts(&start);
            buf.put_u32(sec);
            buf.put_u32(usec);
        }
        if let Some(bb) = self.bounce_back {
            buf.put_u32(bb.request_size);
            buf.put_u32(bb.reply_size);
        }
    }

    /// Decodes `flags` first, then consumes exactly `Settings_ClientTestHdrLen(flags)`
    /// more bytes. A truncated tail is a [`CoreError::HeaderMismatch`], fatal to the
    /// flow per the connection protocol.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, CoreError> {
        require(buf, 4)?;
        let flags = buf.get_u32();
        let tail_len = Settings_ClientTestHdrLen(flags);
        require(buf, tail_len)?;

        let num_threads = buf.get_u32();
        let m_port = buf.get_u32();
        let buffer_len = buf.get_u32();
        let m_win_band = buf.get_u32();
        let m_amount = buf.get_u32();

        let isoch = if flags & TestHdrFlags::ISOCH != 0 {
            Some(IsochParams {
                fps: buf.get_f32(),
                mean: buf.get_u32(),
                variance: buf.get_u32(),
                burst_ipg_us: buf.get_u32(),
            })
        } else {
            None
        };

        let trip_time_start = if flags & TestHdrFlags::TRIP_TIME != 0 {
            let sec = buf.get_u32();
            let usec = buf.get_u32();
            Some(from_wire_ts(sec, usec))
        } else {
            None
        };

        let bounce_back = if flags & TestHdrFlags::BOUNCE_BACK != 0 {
            Some(BounceBackParams {
                request_size: buf.get_u32(),
                reply_size: buf.get_u32(),
            })
        } else {
            None
        };

        Ok(Self {
            flags,
            num_threads,
            m_port,
            buffer_len,
            m_win_band,
            m_amount,
            isoch,
            trip_time_start,
            bounce_back,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hdr_len_grows_with_each_extension() {
        assert_eq!(Settings_ClientTestHdrLen(0), BASE_LEN - 4);
        assert_eq!(
            Settings_ClientTestHdrLen(TestHdrFlags::ISOCH),
            BASE_LEN - 4 + ISOCH_EXT_LEN
        );
        assert_eq!(
            Settings_ClientTestHdrLen(TestHdrFlags::ISOCH | TestHdrFlags::TRIP_TIME),
            BASE_LEN - 4 + ISOCH_EXT_LEN + TRIP_TIME_EXT_LEN
        );
    }

    #[test]
    fn roundtrips_with_all_extensions() {
        let hdr = TestHeader {
            flags: TestHdrFlags::ISOCH | TestHdrFlags::TRIP_TIME | TestHdrFlags::BOUNCE_BACK,
            num_threads: 1,
            m_port: 5001,
            buffer_len: 1470,
            m_win_band: 0,
            m_amount: 0,
            isoch: Some(IsochParams {
                fps: 60.0,
                mean: 1_000_000,
                variance: 0,
                burst_ipg_us: 0,
            }),
            trip_time_start: Some(Timestamp::new(10, 20)),
            bounce_back: Some(BounceBackParams {
                request_size: 64,
                reply_size: 1024,
            }),
        };
        let mut buf = Vec::new();
        hdr.encode(&mut buf);
        let decoded = TestHeader::decode(&mut &buf[..]).unwrap();
        assert_eq!(decoded, hdr);
    }

    #[test]
    fn roundtrips_with_no_extensions() {
        let hdr = TestHeader {
            flags: 0,
            num_threads: 4,
            m_port: 0,
            buffer_len: 8192,
            m_win_band: 0,
            m_amount: 0,
            isoch: None,
            trip_time_start: None,
            bounce_back: None,
        };
        let mut buf = Vec::new();
        hdr.encode(&mut buf);
        assert_eq!(buf.len(), BASE_LEN);
        let decoded = TestHeader::decode(&mut &buf[..]).unwrap();
        assert_eq!(decoded, hdr);
    }

    #[test]
    fn truncated_extension_tail_is_header_mismatch() {
        let flags = TestHdrFlags::ISOCH;
        let mut buf = Vec::new();
        buf.put_u32(flags);
        buf.put_u32(1); // num_threads only, extension tail missing
        let err = TestHeader::decode(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, CoreError::HeaderMismatch { .. }));
    }
}
