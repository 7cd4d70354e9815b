//! `PacketEvent`: the single record type a traffic worker hands to the reporter
//! through its [`crate::ring::PacketRing`].

use crate::clock::Timestamp;

/// Disposition of the I/O that produced a [`PacketEvent`], mirroring the
/// fatal/accountable/non-accountable/timeout taxonomy from the error-handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrKind {
    WriteSuccess,
    WriteErrAccount,
    WriteNoAccount,
    WriteTimeo,
    WriteErrFatal,
    WriteSelectRetry,
    ReadSuccess,
    ReadErrLen,
    ReadTimeo,
    ReadNoAccount,
    NullEvent,
}

impl ErrKind {
    /// Whether bytes should be counted toward the flow's totals for this event.
    pub fn is_accountable(&self) -> bool {
        matches!(
            self,
            ErrKind::WriteSuccess
                | ErrKind::WriteErrAccount
                | ErrKind::ReadSuccess
                | ErrKind::ReadErrLen
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrKind::WriteErrFatal)
    }
}

/// A point-in-time snapshot of kernel TCP statistics, carried on a `PacketEvent` when
/// the platform exposes them (`TCP_INFO`-style). Socket-option plumbing to obtain
/// these values is out of scope; the core only consumes the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TcpStatsSnapshot {
    pub retransmits_total: u64,
    pub cwnd: u32,
    pub rtt_us: u32,
    pub rttvar_us: u32,
    pub packets_in_flight: u32,
    pub bytes_in_flight: u64,
}

/// The unit of work a traffic worker publishes to its ring for every write/read (or
/// burst, in TCP-burst modes). `seq < 0` is a terminal sentinel: no further events are
/// enqueued on that ring after one is observed.
#[derive(Debug, Clone, Copy)]
pub struct PacketEvent {
    pub seq: i64,
    pub len: u32,
    pub write_len: u32,
    pub read_len: u32,

    pub packet_time: Timestamp,
    pub sent_time: Timestamp,
    pub prev_sent_time: Timestamp,

    pub isoch_start_time: Timestamp,
    pub frame_id: u64,
    pub prev_frame_id: u64,
    pub burst_size: u32,
    pub burst_period_us: u32,
    pub remaining: i64,

    pub err_kind: ErrKind,
    pub writecnt: u32,

    pub sched_err: i64,
    pub scheduled: bool,

    pub transit_ready: bool,

    pub tcpstats: Option<TcpStatsSnapshot>,

    pub l2_errors: u32,
    pub l2_len: u32,
    pub expected_l2len: u32,

    pub bb_server_rx_ts: Timestamp,
    pub bb_server_tx_ts: Timestamp,

    pub tos: u8,

    /// Cumulative loss/out-of-order counts as tallied by a UDP receiver up to and
    /// including this datagram. `None` for roles/transports that don't track loss
    /// (TCP, and any client-side event) — the reporter leaves `info.totals` alone
    /// for those rather than stomping it with a bogus zero.
    pub loss_tally: Option<LossTally>,
}

/// Running loss/out-of-order counters as seen by a UDP receive loop, attached to the
/// event for the datagram that produced this snapshot of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LossTally {
    pub lost: u32,
    pub out_of_order: u32,
}

impl PacketEvent {
    /// A mostly-zeroed template; callers fill in the fields relevant to their
    /// discipline rather than naming all twenty-odd fields at every call site.
    pub fn blank(seq: i64, packet_time: Timestamp) -> Self {
        Self {
            seq,
            len: 0,
            write_len: 0,
            read_len: 0,
            packet_time,
            sent_time: Timestamp::ZERO,
            prev_sent_time: Timestamp::ZERO,
            isoch_start_time: Timestamp::ZERO,
            frame_id: 0,
            prev_frame_id: 0,
            burst_size: 0,
            burst_period_us: 0,
            remaining: 0,
            err_kind: ErrKind::NullEvent,
            writecnt: 0,
            sched_err: 0,
            scheduled: false,
            transit_ready: false,
            tcpstats: None,
            l2_errors: 0,
            l2_len: 0,
            expected_l2len: 0,
            bb_server_rx_ts: Timestamp::ZERO,
            bb_server_tx_ts: Timestamp::ZERO,
            tos: 0,
            loss_tally: None,
        }
    }

    /// The sentinel that closes out a flow's reporter job. `remaining == -1` mirrors
    /// the original negative-sequence convention used for UDP FIN signalling, reused
    /// here purely as an internal ring marker (it never goes on the wire).
    pub fn sentinel(packet_time: Timestamp) -> Self {
        Self::blank(-1, packet_time)
    }

    pub fn is_sentinel(&self) -> bool {
        self.seq < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_has_negative_seq() {
        let ev = PacketEvent::sentinel(Timestamp::now());
        assert!(ev.is_sentinel());
        assert_eq!(ev.seq, -1);
    }

    #[test]
    fn accountable_err_kinds() {
        assert!(ErrKind::WriteSuccess.is_accountable());
        assert!(ErrKind::ReadErrLen.is_accountable());
        assert!(!ErrKind::WriteNoAccount.is_accountable());
        assert!(!ErrKind::NullEvent.is_accountable());
    }
}
